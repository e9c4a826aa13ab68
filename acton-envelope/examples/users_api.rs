//! Users API Example - Envelopes, Exceptions and Pagination
//!
//! This example shows a small in-memory users API built on acton-envelope:
//!
//! - Success envelopes with feedback and metadata
//! - Paginated lists backed by a lazy `ListSource`
//! - Not-found, validation and malformed-body errors rendered as failure envelopes
//! - Plain-text errors for non-API paths
//!
//! Run with: cargo run --example users_api
//!
//! Test with:
//!   curl http://localhost:8080/api/users
//!   curl "http://localhost:8080/api/users?page=2&per_page=10"
//!   curl "http://localhost:8080/api/users?page=99"            # 416
//!   curl http://localhost:8080/api/users/1
//!   curl http://localhost:8080/api/users/999                  # 404
//!   curl -X POST http://localhost:8080/api/users -H 'content-type: application/json' -d '{"name":""}'
//!   curl http://localhost:8080/nowhere                        # plain text 404

use std::sync::{Arc, RwLock};

use acton_envelope::prelude::*;
use axum::{
    extract::{rejection::JsonRejection, FromRef, Path, State},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u64,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    email: String,
}

#[derive(Clone, Default)]
struct UserStore(Arc<RwLock<Vec<User>>>);

impl UserStore {
    fn seeded(count: u64) -> Self {
        let users = (1..=count)
            .map(|id| User {
                id,
                name: format!("user{id}"),
                email: format!("user{id}@example.com"),
            })
            .collect();
        Self(Arc::new(RwLock::new(users)))
    }

    fn find(&self, id: u64) -> Option<User> {
        self.0.read().ok()?.iter().find(|user| user.id == id).cloned()
    }

    fn insert(&self, new: NewUser) -> std::result::Result<User, BoxError> {
        let mut users = self.0.write().map_err(|_| "user store poisoned")?;
        let user = User {
            id: users.len() as u64 + 1,
            name: new.name,
            email: new.email,
        };
        users.push(user.clone());
        Ok(user)
    }
}

impl ListSource for UserStore {
    fn count(&self) -> std::result::Result<u64, BoxError> {
        Ok(self.0.read().map_err(|_| "user store poisoned")?.len() as u64)
    }

    fn slice(&self, offset: u64, limit: u64) -> std::result::Result<Vec<Value>, BoxError> {
        let users = self.0.read().map_err(|_| "user store poisoned")?;
        users
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|user| serde_json::to_value(user).map_err(Into::into))
            .collect()
    }

    fn all(&self) -> std::result::Result<Vec<Value>, BoxError> {
        self.slice(0, u64::MAX)
    }
}

#[derive(Clone, FromRef)]
struct AppState {
    envelope: Envelope,
    users: UserStore,
}

async fn list_users(
    State(state): State<AppState>,
    page: PageRequest,
) -> std::result::Result<ApiResponse, Caught> {
    Ok(state.envelope.success_paginated(
        200,
        "users",
        Payload::source(state.users),
        None,
        Map::new(),
        page,
    )?)
}

async fn show_user(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> std::result::Result<ApiResponse, Caught> {
    let user = state
        .users
        .find(id)
        .ok_or_else(|| ModelNotFoundException::of::<User>().with_ids([id]))?;

    Ok(state
        .envelope
        .success(200, "user", Payload::from_serialize(&user)?, None, Map::new())?)
}

async fn create_user(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewUser>, JsonRejection>,
) -> std::result::Result<ApiResponse, Caught> {
    let Json(new) = body?;

    let mut violations = Violations::new();
    if new.name.trim().is_empty() {
        violations.add("name", RuleFailure::new("required", "The name field is required."));
    }
    if !new.email.contains('@') {
        violations.add("email", RuleFailure::new("email", "The email must be a valid email address."));
    }
    if !violations.is_empty() {
        return Err(ValidationException::new(violations).into());
    }

    let user = state.users.insert(new).map_err(Caught::from_error)?;
    let feedback = Messages::new().with(
        "user",
        Feedback::success("user created", format!("Welcome, {}!", user.name))?,
    );

    Ok(state
        .envelope
        .success(201, "user", Payload::from_serialize(&user)?, Some(feedback), Map::new())?)
}

async fn route_missing() -> Caught {
    NotFoundHttpException::new().into()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EnvelopeConfig::load()?;
    init_tracing(&config)?;

    let envelope = Envelope::new(config);
    let handler = ExceptionHandler::new(envelope.clone());
    let state = AppState {
        envelope,
        users: UserStore::seeded(42),
    };

    let app = Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(show_user))
        .fallback(route_missing)
        .layer(from_fn_with_state(handler, catch_exceptions))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Listening on http://0.0.0.0:8080");
    axum::serve(listener, app).await?;

    Ok(())
}
