//! Registered user record.
//!
//! Users are created inactive at registration; activation happens out of band
//! (the activation mail carries the link) and is not handled by this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::{DomainError, DomainResult, Entity, UserId};

/// A shop user.
///
/// # Invariants
/// - `email` is trimmed, lower-cased and contains a single `@` with non-empty
///   local and domain parts.
/// - A freshly registered user is never active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Validate input and build a new, inactive user.
    pub fn register(email: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: UserId::new(),
            email: normalize_email(email)?,
            is_active: false,
            created_at: now,
        })
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Trim + lower-case an email and check its basic shape.
pub fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(DomainError::validation("email cannot be empty"));
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(d), None) => (l, d),
        _ => return Err(DomainError::validation("email must contain exactly one '@'")),
    };

    if local.is_empty() || domain.is_empty() {
        return Err(DomainError::validation("email must have a local part and a domain"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("email cannot contain whitespace"));
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_creates_inactive_user_with_normalized_email() {
        let user = User::register("  Buyer@Example.COM ", Utc::now()).unwrap();
        assert_eq!(user.email, "buyer@example.com");
        assert!(!user.is_active);
    }

    #[test]
    fn register_rejects_bad_emails() {
        for bad in ["", "   ", "no-at-sign", "@example.com", "buyer@", "a@b@c", "a b@c.d"] {
            let err = User::register(bad, Utc::now()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{bad:?} => {err:?}");
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: normalization is idempotent.
            #[test]
            fn normalize_is_idempotent(local in "[A-Za-z0-9.]{1,20}", domain in "[A-Za-z0-9]{1,20}\\.[a-z]{2,4}") {
                let once = normalize_email(&format!("{local}@{domain}")).unwrap();
                let twice = normalize_email(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
