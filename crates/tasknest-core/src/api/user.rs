use std::fmt;

use reqwest::Method;
use serde::Serialize;
use tracing::instrument;

use super::client::ApiClient;
use super::schema::normalize_user;
use crate::error::{ApiError, ApiResult};
use crate::task::User;

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

impl ApiClient {
    #[instrument(skip(self))]
    pub async fn current_user(&self) -> ApiResult<User> {
        let request = self.request(Method::GET, &["user", "me"])?;
        let body = self.send_json(request, "current user").await?;
        let user = normalize_user(body)?;
        self.session().update_user(user.clone());
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> ApiResult<User> {
        if update.is_empty() {
            return Err(ApiError::InvalidInput("profile update carries no changes".to_string()));
        }

        let request = self.request(Method::PUT, &["user", "profile"])?.json(update);
        let body = self.send_json(request, "updated profile").await?;
        let user = normalize_user(body)?;
        self.session().update_user(user.clone());
        Ok(user)
    }

    #[instrument(skip(self, change))]
    pub async fn update_password(&self, change: &PasswordChange) -> ApiResult<()> {
        if change.current_password.is_empty() || change.new_password.is_empty() {
            return Err(ApiError::InvalidInput(
                "current and new password are required".to_string(),
            ));
        }

        let request = self.request(Method::PUT, &["user", "password"])?.json(change);
        self.send_unit(request, "password change").await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PasswordChange, ProfileUpdate};

    #[test]
    fn password_change_uses_backend_field_names() {
        let change = PasswordChange {
            current_password: "old".to_string(),
            new_password: "new".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({ "currentPassword": "old", "newPassword": "new" })
        );
        assert!(!format!("{change:?}").contains("old"));
    }

    #[test]
    fn profile_update_skips_absent_fields() {
        let update = ProfileUpdate {
            name: Some("Ada".to_string()),
            email: None,
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "name": "Ada" }));
        assert!(ProfileUpdate::default().is_empty());
    }
}
