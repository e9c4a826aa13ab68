//! Key casing helpers for envelope output

use serde_json::{Map, Value};

/// Convert `snake_case`, `kebab-case` or spaced words to `camelCase`
///
/// Only the first letter of each following word is upper-cased; the rest of
/// the word is kept as written, so already camel-cased input is unchanged.
pub fn camel_case(s: &str) -> String {
    let studly: String = s
        .split(['_', '-', ' '])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect();

    let mut chars = studly.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Convert `PascalCase` or `camelCase` to `snake_case`
pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().filter(|c| !c.is_whitespace()).enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Last path segment of a type name, without generic arguments
///
/// `my_app::models::BlogPost` becomes `BlogPost`.
pub fn class_basename(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Rewrite every object key in `value` with `transform`, recursively
///
/// Arrays are walked so objects nested in lists are rewritten too; scalar
/// values are left untouched.
pub fn transform_keys(value: Value, transform: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (transform(&key), transform_keys(value, transform)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| transform_keys(item, transform))
                .collect(),
        ),
        scalar => scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("page_count"), "pageCount");
        assert_eq!(camel_case("per_page"), "perPage");
        assert_eq!(camel_case("user-name"), "userName");
        assert_eq!(camel_case("status"), "status");
        assert_eq!(camel_case("pageCount"), "pageCount");
        assert_eq!(camel_case("Name"), "name");
        assert_eq!(camel_case(""), "");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("BlogPost"), "blog_post");
        assert_eq!(snake_case("User"), "user");
        assert_eq!(snake_case("orderLine"), "order_line");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_class_basename() {
        assert_eq!(class_basename("my_app::models::BlogPost"), "BlogPost");
        assert_eq!(class_basename("User"), "User");
        assert_eq!(class_basename("my_app::Wrapper<my_app::Inner>"), "Wrapper");
    }

    #[test]
    fn test_transform_keys_recurses_into_objects_and_lists() {
        let value = json!({
            "page_count": 3,
            "user_list": [{"first_name": "Ada", "tags": ["snake_value"]}],
            "nested": {"per_page": 10}
        });

        let transformed = transform_keys(value, &camel_case);
        assert_eq!(
            transformed,
            json!({
                "pageCount": 3,
                "userList": [{"firstName": "Ada", "tags": ["snake_value"]}],
                "nested": {"perPage": 10}
            })
        );
    }
}
