use std::fmt;

use reqwest::Method;
use serde::Serialize;
use tracing::{info, instrument};

use super::client::ApiClient;
use super::schema::{normalize_login, response_message};
use crate::error::{ApiError, ApiResult};
use crate::session::Session;

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    /// Authenticates and installs the resulting session on this client.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<Session> {
        if request.email.trim().is_empty() || request.password.is_empty() {
            return Err(ApiError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }

        let http = self.request(Method::POST, &["user", "login"])?.json(request);
        let body = self.send_json(http, "login response").await?;
        let session = normalize_login(body)?;
        self.session().begin(session.clone());
        Ok(session)
    }

    /// Creates an account and returns the server's message. A response that
    /// carries a token also starts a session.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<String> {
        if request.name.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(ApiError::InvalidInput(
                "name, email and password are required".to_string(),
            ));
        }

        let http = self.request(Method::POST, &["user", "register"])?.json(request);
        let body = self.send_json(http, "register response").await?;
        let message =
            response_message(&body).unwrap_or_else(|| "Registered successfully".to_string());
        info!(message = %message, "account registered");

        // Some deployments sign the new account in straight away.
        if body.get("token").and_then(|t| t.as_str()).is_some_and(|t| !t.trim().is_empty()) {
            let session = normalize_login(body)?;
            self.session().begin(session);
        }
        Ok(message)
    }

    /// Clears the session. Requests issued afterwards carry no credential.
    pub fn logout(&self) -> Option<Session> {
        self.session().end()
    }
}
