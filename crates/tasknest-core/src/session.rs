use std::fmt;

use parking_lot::RwLock;
use reqwest::RequestBuilder;
use tracing::{
  debug,
  info
};

use crate::task::User;

/// Authenticated user plus the bearer
/// token the API issued for them.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
  token: String,
  user:  User
}

impl Session {
  pub fn new(
    token: impl Into<String>,
    user: User
  ) -> Self {
    Self {
      token: token.into(),
      user
    }
  }

  pub fn token(&self) -> &str {
    &self.token
  }

  pub fn user(&self) -> &User {
    &self.user
  }
}

impl fmt::Debug for Session {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.debug_struct("Session")
      .field("token", &"<redacted>")
      .field("user", &self.user)
      .finish()
  }
}

/// What to attach to one outgoing
/// request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
  Bearer(String),
  Anonymous
}

impl Credential {
  pub fn is_bearer(&self) -> bool {
    matches!(self, Credential::Bearer(_))
  }

  pub fn apply(
    &self,
    request: RequestBuilder
  ) -> RequestBuilder {
    match self {
      | Credential::Bearer(token) => {
        request.bearer_auth(token)
      }
      | Credential::Anonymous => request
    }
  }
}

impl fmt::Debug for Credential {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Credential::Bearer(_) => {
        f.write_str("Bearer(<redacted>)")
      }
      | Credential::Anonymous => {
        f.write_str("Anonymous")
      }
    }
  }
}

/// Holds at most one session for the
/// lifetime of the process.
#[derive(Debug, Default)]
pub struct SessionStore {
  inner: RwLock<Option<Session>>
}

impl SessionStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_session(
    session: Session
  ) -> Self {
    Self {
      inner: RwLock::new(Some(session))
    }
  }

  #[tracing::instrument(skip(self, session), fields(email = %session.user.email))]
  pub fn begin(&self, session: Session) {
    info!("session started");
    *self.inner.write() = Some(session);
  }

  /// Drops the session unconditionally.
  pub fn end(&self) -> Option<Session> {
    let previous =
      self.inner.write().take();
    info!(
      had_session = previous.is_some(),
      "session ended"
    );
    previous
  }

  pub fn is_active(&self) -> bool {
    self.inner.read().is_some()
  }

  pub fn current(
    &self
  ) -> Option<Session> {
    self.inner.read().clone()
  }

  pub fn user(&self) -> Option<User> {
    self
      .inner
      .read()
      .as_ref()
      .map(|s| s.user.clone())
  }

  pub fn update_user(&self, user: User) {
    if let Some(session) =
      self.inner.write().as_mut()
    {
      session.user = user;
    }
  }

  pub fn credential(&self) -> Credential {
    let credential = match self
      .inner
      .read()
      .as_ref()
    {
      | Some(session)
        if !session
          .token
          .trim()
          .is_empty() =>
      {
        Credential::Bearer(
          session.token.clone()
        )
      }
      | _ => Credential::Anonymous
    };
    debug!(
      credentialed =
        credential.is_bearer(),
      "resolved request credential"
    );
    credential
  }
}
