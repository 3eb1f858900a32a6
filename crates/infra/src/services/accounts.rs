use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use shopfront_auth::{User, normalize_email};
use shopfront_core::UserId;

use super::ServiceError;
use crate::store::UserStore;
use crate::tasks::{ActivationMailPayload, SEND_ACTIVATION_MAIL, TaskQueue};

/// User registration.
pub struct AccountService {
    users: Arc<dyn UserStore>,
    tasks: Arc<dyn TaskQueue>,
    site_url: String,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, tasks: Arc<dyn TaskQueue>, site_url: impl Into<String>) -> Self {
        Self {
            users,
            tasks,
            site_url: site_url.into(),
        }
    }

    /// Create an inactive user and queue their activation mail.
    pub async fn register(&self, email: &str, now: DateTime<Utc>) -> Result<User, ServiceError> {
        let email = normalize_email(email)?;
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!("email {email} is already registered")));
        }

        let user = User::register(&email, now)?;
        self.users.insert_user(&user).await?;

        let payload = ActivationMailPayload {
            user_id: user.id,
            email: user.email.clone(),
            site: self.site_url.clone(),
        };
        match serde_json::to_value(&payload) {
            Ok(payload) => self.tasks.enqueue(SEND_ACTIVATION_MAIL, payload),
            Err(e) => error!(user_id = %user.id, error = %e, "could not encode activation mail"),
        }

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, ServiceError> {
        self.users.get_user(id).await?.ok_or(ServiceError::NotFound("user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryShopStore;
    use crate::tasks::InMemoryTaskQueue;

    fn service() -> (AccountService, Arc<InMemoryTaskQueue>) {
        let tasks = Arc::new(InMemoryTaskQueue::default());
        let service = AccountService::new(InMemoryShopStore::arc(), tasks.clone(), "https://shop.test");
        (service, tasks)
    }

    #[tokio::test]
    async fn registration_stores_inactive_user_and_queues_mail() {
        let (accounts, tasks) = service();

        let user = accounts.register(" New@Shop.Test ", Utc::now()).await.unwrap();
        assert_eq!(user.email, "new@shop.test");
        assert!(!user.is_active);
        assert_eq!(accounts.get_user(user.id).await.unwrap(), user);

        let mails = tasks.tasks_named(SEND_ACTIVATION_MAIL).unwrap();
        assert_eq!(mails.len(), 1);
        let payload: ActivationMailPayload = serde_json::from_value(mails[0].payload.clone()).unwrap();
        assert_eq!(payload.user_id, user.id);
        assert_eq!(payload.site, "https://shop.test");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (accounts, tasks) = service();
        accounts.register("dup@shop.test", Utc::now()).await.unwrap();

        let err = accounts.register("DUP@shop.test", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(tasks.tasks_named(SEND_ACTIVATION_MAIL).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_email_is_rejected() {
        let (accounts, tasks) = service();
        let err = accounts.register("not-an-email", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(tasks.stats().unwrap().pending, 0);
    }
}
