//! Read-only accessor for the identity behind the current request.

/// Actor recorded in audit columns when nobody is signed in.
pub const SYSTEM_ACTOR: &str = "system";

/// Identity of the caller, as seen by the unit of work.
pub trait CurrentUser: Send + Sync {
    fn user_id(&self) -> Option<&str>;

    fn name(&self) -> Option<&str>;

    fn is_authenticated(&self) -> bool;

    /// Returns the value stamped into `created_by` / `updated_by`.
    ///
    /// Prefers the user id, then the name, and falls back to
    /// [`SYSTEM_ACTOR`] for unauthenticated callers.
    fn actor(&self) -> String {
        if !self.is_authenticated() {
            return SYSTEM_ACTOR.to_string();
        }
        self.user_id()
            .or_else(|| self.name())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(SYSTEM_ACTOR)
            .to_string()
    }
}

/// No signed-in user. Background jobs and unauthenticated calls run as this.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CurrentUser for Anonymous {
    fn user_id(&self) -> Option<&str> {
        None
    }

    fn name(&self) -> Option<&str> {
        None
    }

    fn is_authenticated(&self) -> bool {
        false
    }
}

/// A user resolved by the (external) authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    user_id: String,
    name: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl CurrentUser for AuthenticatedUser {
    fn user_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}
