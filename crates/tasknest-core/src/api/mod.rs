//! Typed access to the remote TaskNest API.
//!
//! Every request goes through [`ApiClient`], which consults its
//! [`SessionStore`](crate::session::SessionStore) and attaches a bearer
//! credential when a session is active. Response bodies are normalized in
//! [`schema`] so callers only ever see typed values.

pub mod auth;
pub mod client;
pub mod schema;
pub mod tasks;
pub mod user;

pub use auth::{LoginRequest, RegisterRequest};
pub use client::{ApiClient, ApiConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
pub use user::{PasswordChange, ProfileUpdate};
