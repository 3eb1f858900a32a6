use shopfront_core::UserId;

/// Authenticated caller of a request.
///
/// Inserted by the auth middleware; every protected handler can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
    email: Option<String>,
}

impl UserContext {
    pub fn new(user_id: UserId, email: Option<String>) -> Self {
        Self { user_id, email }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}
