//! The acting user's identity, passed explicitly into every gated operation.

use crate::errors::{Error, Result};
use crate::models::users::{User, UserSummary};
use crate::types::{Action, Role, UserId};
use tracing::info;

#[derive(Clone)]
pub struct Session {
    pub user: User,
    /// Bearer token presented to the booking service
    pub token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Session {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self { user, token: token.into() }
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary::from(&self.user)
    }

    /// Fail with `AuthorizationDenied` unless the session's role permits `action`.
    pub fn authorize(&self, action: Action) -> Result<()> {
        if self.role().permits(self.user_id(), action) {
            return Ok(());
        }
        info!(user_id = self.user_id(), role = %self.role(), %action, "Authorization denied");
        Err(Error::AuthorizationDenied {
            action: action.to_string(),
        })
    }
}
