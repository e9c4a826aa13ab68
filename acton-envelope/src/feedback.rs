//! Typed, dual-audience messages
//!
//! A [`Feedback`] pairs an internal `message` (meant for logs and API
//! consumers' code) with a user-facing `description`, tagged with a
//! [`FeedbackType`]. When feedback is disabled in the configuration, the same
//! slots carry plain strings instead; [`Message`] models both shapes and
//! [`FeedbackMode`] decides which one a collection must hold.
//!
//! ## Example
//!
//! ```rust
//! use acton_envelope::feedback::{Feedback, FeedbackMode, Message, Messages};
//!
//! let saved = Feedback::success("user saved", "Your profile was updated.").unwrap();
//! assert_eq!(saved.message(), "user saved");
//!
//! let mut messages = Messages::new();
//! messages.push("profile", saved);
//!
//! // Plain mode keeps only the internal message
//! let plain = messages.normalize(FeedbackMode::Plain).unwrap().unwrap();
//! assert_eq!(plain.get("profile").unwrap()[0], Message::from("user saved"));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{
    ser::{SerializeMap, Serializer},
    Deserialize, Serialize,
};

use crate::error::{Error, Result};

/// Kind of a [`Feedback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    /// Operation succeeded
    Success,
    /// Informational notice
    Info,
    /// Something the user should look at
    Warning,
    /// Operation failed
    Error,
}

impl FeedbackType {
    /// All accepted feedback types, in declaration order
    pub const ALL: [FeedbackType; 4] = [
        FeedbackType::Success,
        FeedbackType::Info,
        FeedbackType::Warning,
        FeedbackType::Error,
    ];

    /// Wire name of the type
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                Error::invalid(format!(
                    "type must be one of {}",
                    Self::ALL.map(|kind| kind.as_str()).join(", ")
                ))
            })
    }
}

/// Immutable feedback value: a type, an internal message and a user-facing description
///
/// Both strings are guaranteed non-empty. Deserialization runs the same checks
/// as [`Feedback::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawFeedback")]
pub struct Feedback {
    #[serde(rename = "type")]
    kind: FeedbackType,
    message: String,
    description: String,
}

#[derive(Deserialize)]
struct RawFeedback {
    #[serde(rename = "type")]
    kind: String,
    message: String,
    description: String,
}

impl TryFrom<RawFeedback> for Feedback {
    type Error = Error;

    fn try_from(raw: RawFeedback) -> Result<Self> {
        Feedback::new(raw.kind.parse()?, raw.message, raw.description)
    }
}

impl Feedback {
    /// Create a new feedback
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `message` or `description` is empty.
    pub fn new(
        kind: FeedbackType,
        message: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let message = message.into();
        if message.is_empty() {
            return Err(Error::invalid("message cannot be empty"));
        }

        let description = description.into();
        if description.is_empty() {
            return Err(Error::invalid("description cannot be empty"));
        }

        Ok(Self {
            kind,
            message,
            description,
        })
    }

    /// Create a new feedback from a type name
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `kind` is not one of
    /// `success`, `info`, `warning`, `error`, or if a string is empty.
    pub fn parse(
        kind: &str,
        message: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        Self::new(kind.parse()?, message, description)
    }

    /// Shorthand for a success feedback
    pub fn success(message: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        Self::new(FeedbackType::Success, message, description)
    }

    /// Shorthand for an info feedback
    pub fn info(message: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        Self::new(FeedbackType::Info, message, description)
    }

    /// Shorthand for a warning feedback
    pub fn warning(message: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        Self::new(FeedbackType::Warning, message, description)
    }

    /// Shorthand for an error feedback
    pub fn error(message: impl Into<String>, description: impl Into<String>) -> Result<Self> {
        Self::new(FeedbackType::Error, message, description)
    }

    /// Error feedback for an internal failure; never fails
    pub(crate) fn internal(description: &str) -> Self {
        let description = match description.trim() {
            "" => "An error occurred.",
            _ => description,
        };

        Self {
            kind: FeedbackType::Error,
            message: "internal server error".to_string(),
            description: description.to_string(),
        }
    }

    pub fn kind(&self) -> FeedbackType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// `{type, message, description}` as a JSON map
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("type".to_string(), self.kind.as_str().into());
        map.insert("message".to_string(), self.message.clone().into());
        map.insert("description".to_string(), self.description.clone().into());
        map
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.to_map())
    }

    /// JSON representation of the feedback
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Whether message slots carry [`Feedback`] values or plain strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedbackMode {
    /// Every message must be a [`Feedback`]
    #[default]
    Feedback,
    /// Every message is reduced to a plain string
    Plain,
}

impl From<bool> for FeedbackMode {
    fn from(use_feedback: bool) -> Self {
        if use_feedback {
            Self::Feedback
        } else {
            Self::Plain
        }
    }
}

impl FeedbackMode {
    /// Coerce a message into the shape this mode requires
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a plain string is given in
    /// [`FeedbackMode::Feedback`].
    pub fn coerce(self, message: Message) -> Result<Message> {
        match (self, message) {
            (Self::Feedback, Message::Feedback(feedback)) => Ok(Message::Feedback(feedback)),
            (Self::Feedback, Message::Text(_)) => Err(Error::invalid(
                "feedback contents must be instances of Feedback",
            )),
            (Self::Plain, Message::Feedback(feedback)) => Ok(Message::Text(feedback.message)),
            (Self::Plain, Message::Text(text)) => Ok(Message::Text(text)),
        }
    }
}

/// A message slot: a full [`Feedback`] or a plain string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Feedback(Feedback),
    Text(String),
}

impl Message {
    /// Internal message text, whichever shape this is
    pub fn text(&self) -> &str {
        match self {
            Self::Feedback(feedback) => feedback.message(),
            Self::Text(text) => text,
        }
    }

    pub fn as_feedback(&self) -> Option<&Feedback> {
        match self {
            Self::Feedback(feedback) => Some(feedback),
            Self::Text(_) => None,
        }
    }
}

impl From<Feedback> for Message {
    fn from(feedback: Feedback) -> Self {
        Self::Feedback(feedback)
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Ordered mapping from a key (field name, topic) to a list of messages
///
/// Insertion order is kept and serialized as-is, so validation errors appear
/// in the order fields were evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Messages {
    entries: Vec<(String, Vec<Message>)>,
}

impl Messages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the list for `key`, replacing an existing list in place
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<Message>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = values,
            None => self.entries.push((key, values)),
        }
    }

    /// Append one message to the list for `key`
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Message>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => slot.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// Builder-style [`Messages::push`]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Message>) -> Self {
        self.push(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[Message]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, values)| values.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Message])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop empty lists and coerce every message to `mode`
    ///
    /// Returns `None` when nothing is left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a message does not fit `mode`.
    pub fn normalize(self, mode: FeedbackMode) -> Result<Option<Self>> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, values) in self.entries {
            if values.is_empty() {
                continue;
            }
            let values = values
                .into_iter()
                .map(|value| mode.coerce(value))
                .collect::<Result<Vec<_>>>()?;
            entries.push((key, values));
        }

        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self { entries }))
        }
    }
}

impl<K, V> FromIterator<(K, Vec<V>)> for Messages
where
    K: Into<String>,
    V: Into<Message>,
{
    fn from_iter<I: IntoIterator<Item = (K, Vec<V>)>>(iter: I) -> Self {
        let mut messages = Self::new();
        for (key, values) in iter {
            messages.insert(key, values.into_iter().map(Into::into).collect());
        }
        messages
    }
}

impl Serialize for Messages {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feedback_factories() {
        assert_eq!(Feedback::success("m", "d").unwrap().kind(), FeedbackType::Success);
        assert_eq!(Feedback::info("m", "d").unwrap().kind(), FeedbackType::Info);
        assert_eq!(Feedback::warning("m", "d").unwrap().kind(), FeedbackType::Warning);
        assert_eq!(Feedback::error("m", "d").unwrap().kind(), FeedbackType::Error);
    }

    #[test]
    fn test_feedback_rejects_unknown_type() {
        let err = Feedback::parse("fatal", "m", "d").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("success, info, warning, error"));
    }

    #[test]
    fn test_feedback_rejects_empty_strings() {
        assert!(matches!(
            Feedback::error("", "d"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            Feedback::error("m", ""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_feedback_to_map_round_trip() {
        let original = Feedback::warning("quota low", "You are close to your quota.").unwrap();
        let rebuilt = Feedback::parse(
            original.kind().as_str(),
            original.message(),
            original.description(),
        )
        .unwrap();

        assert_eq!(
            rebuilt.to_value(),
            json!({
                "type": "warning",
                "message": "quota low",
                "description": "You are close to your quota."
            })
        );
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_feedback_deserialize_validates() {
        let ok: Feedback =
            serde_json::from_value(json!({"type": "info", "message": "m", "description": "d"}))
                .unwrap();
        assert_eq!(ok.kind(), FeedbackType::Info);

        let bad = serde_json::from_value::<Feedback>(
            json!({"type": "info", "message": "", "description": "d"}),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_mode_coercion() {
        let feedback = Feedback::error("boom", "Something broke.").unwrap();

        let plain = FeedbackMode::Plain.coerce(feedback.clone().into()).unwrap();
        assert_eq!(plain, Message::Text("boom".to_string()));

        let kept = FeedbackMode::Feedback.coerce(feedback.into()).unwrap();
        assert!(kept.as_feedback().is_some());

        assert!(FeedbackMode::Feedback.coerce("text".into()).is_err());
    }

    #[test]
    fn test_messages_normalize_drops_empty_lists() {
        let mut messages = Messages::new();
        messages.insert("empty", Vec::new());
        messages.push("name", Feedback::error("name missing", "Name is required.").unwrap());

        let normalized = messages.normalize(FeedbackMode::Feedback).unwrap().unwrap();
        assert_eq!(normalized.len(), 1);
        assert!(normalized.get("empty").is_none());

        let nothing = Messages::new()
            .normalize(FeedbackMode::Feedback)
            .unwrap();
        assert!(nothing.is_none());
    }

    #[test]
    fn test_messages_rejects_mixed_in_feedback_mode() {
        let messages = Messages::new()
            .with("a", Feedback::info("m", "d").unwrap())
            .with("a", "plain");
        assert!(matches!(
            messages.normalize(FeedbackMode::Feedback),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_messages_serialize_in_insertion_order() {
        let messages = Messages::new().with("zeta", "z").with("alpha", "a").with("zeta", "z2");
        let json = serde_json::to_string(&messages).unwrap();
        assert_eq!(json, r#"{"zeta":["z","z2"],"alpha":["a"]}"#);
    }
}
