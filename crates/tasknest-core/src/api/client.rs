use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::datetime::project_timezone;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

pub const DEFAULT_BASE_URL: &str = "https://tasknest-backend-py22.onrender.com/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
    /// Zone for response dates that carry no offset.
    pub timezone: Tz,
}

impl ApiConfig {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidInput(format!(
                "base URL cannot carry paths: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            timeout,
            timezone: *project_timezone(),
        })
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_defaults() -> ApiResult<Self> {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

/// Single point of contact with the remote API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    timezone: Tz,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        Self::with_session(config, Arc::new(SessionStore::new()))
    }

    pub fn with_session(config: &ApiConfig, session: Arc<SessionStore>) -> ApiResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        debug!(base_url = %config.base_url, timeout = ?config.timeout, "built API client");
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            timezone: config.timezone,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    pub fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::InvalidInput(format!("base URL cannot carry paths: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Builds a request with whatever credential the session gate yields.
    pub(crate) fn request(&self, method: Method, segments: &[&str]) -> ApiResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        let request = self
            .http
            .request(method, url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        Ok(self.session.credential().apply(request))
    }

    /// Sends the request and returns the decoded JSON body.
    #[instrument(skip(self, request), fields(context = context))]
    pub(crate) async fn send_json(
        &self,
        request: RequestBuilder,
        context: &'static str,
    ) -> ApiResult<Value> {
        let (status, body) = self.send_raw(request).await?;
        if body.trim().is_empty() {
            return Err(ApiError::InvalidResponse(format!(
                "empty body for {context} (HTTP {status})"
            )));
        }
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { context, source })
    }

    /// Sends the request and ignores any success body.
    #[instrument(skip(self, request), fields(context = context))]
    pub(crate) async fn send_unit(
        &self,
        request: RequestBuilder,
        context: &'static str,
    ) -> ApiResult<()> {
        self.send_raw(request).await.map(|_| ())
    }

    async fn send_raw(&self, request: RequestBuilder) -> ApiResult<(StatusCode, String)> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!(%status, url = %url, body_len = body.len(), "API response");

        if status.is_success() {
            return Ok((status, body));
        }

        let message = error_message(status, &body);
        warn!(%status, url = %url, message = %message, "API request failed");
        Err(ApiError::from_status(status, message))
    }
}

/// Pulls the human-readable message out of a failure body.
pub fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["message", "error", "msg"] {
            if let Some(text) = value.get(key).and_then(Value::as_str)
                && !text.trim().is_empty()
            {
                return text.trim().to_string();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::StatusCode;

    use super::{ApiClient, ApiConfig, error_message};

    #[test]
    fn endpoint_appends_encoded_segments() {
        let config =
            ApiConfig::new("https://example.com/api", Duration::from_secs(5)).unwrap();
        let client = ApiClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(&["task", "a b", "gp"]).unwrap().as_str(),
            "https://example.com/api/task/a%20b/gp"
        );

        let trailing =
            ApiConfig::new("https://example.com/api/", Duration::from_secs(5)).unwrap();
        let client = ApiClient::new(&trailing).unwrap();
        assert_eq!(
            client.endpoint(&["user", "me"]).unwrap().as_str(),
            "https://example.com/api/user/me"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(ApiConfig::new("not a url", Duration::from_secs(5)).is_err());
        assert!(ApiConfig::new("mailto:someone@example.com", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":"Invalid credentials"}"#),
            "Invalid credentials"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"Email taken"}"#),
            "Email taken"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, "<html>nope</html>"),
            "Not Found"
        );
    }
}
