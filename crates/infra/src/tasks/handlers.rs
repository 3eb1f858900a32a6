//! Handlers for the tasks the shop enqueues.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use shopfront_core::UserId;

use super::types::{Task, TaskOutcome};
use super::worker::TaskHandler;
use crate::store::{CatalogStore, ProductFilter, StoreResult};

pub const SEND_ACTIVATION_MAIL: &str = "send_activation_mail";
pub const PRODUCTS_STATISTIC: &str = "products_statistic";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, body = %mail.body, "outgoing mail");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationMailPayload {
    pub user_id: UserId,
    pub email: String,
    /// Base URL the activation link points at.
    pub site: String,
}

impl ActivationMailPayload {
    pub fn render(&self) -> OutgoingMail {
        let link = format!("{}/accounts/activate/{}", self.site.trim_end_matches('/'), self.user_id);
        OutgoingMail {
            to: self.email.clone(),
            subject: "Activate your account".to_string(),
            body: format!("Welcome! Follow this link to activate your account:\n{link}\n"),
        }
    }
}

pub struct ActivationMailHandler {
    mailer: Arc<dyn Mailer>,
}

impl ActivationMailHandler {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl TaskHandler for ActivationMailHandler {
    async fn handle(&self, task: &Task) -> TaskOutcome {
        let payload: ActivationMailPayload = match serde_json::from_value(task.payload.clone()) {
            Ok(p) => p,
            Err(e) => return TaskOutcome::Failure(format!("invalid activation mail payload: {e}")),
        };

        match self.mailer.send(&payload.render()).await {
            Ok(()) => TaskOutcome::Success,
            Err(e) => TaskOutcome::Failure(e.to_string()),
        }
    }
}

/// Catalog-wide stock figures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductStatistics {
    pub product_count: usize,
    pub total_units: u64,
    /// Sum of `price * stock`, in minor units.
    pub total_value: u64,
    /// Product count per category name.
    pub per_category: BTreeMap<String, usize>,
}

pub async fn collect_statistics(catalog: &dyn CatalogStore) -> StoreResult<ProductStatistics> {
    let products = catalog.list_products(ProductFilter::All).await?;
    let categories: BTreeMap<_, _> = catalog
        .list_categories()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect();

    let mut stats = ProductStatistics {
        product_count: products.len(),
        ..ProductStatistics::default()
    };
    for product in &products {
        let units = u64::from(product.stock);
        stats.total_units += units;
        stats.total_value = stats.total_value.saturating_add(product.price.saturating_mul(units));

        let category = categories
            .get(&product.category_id)
            .cloned()
            .unwrap_or_else(|| product.category_id.to_string());
        *stats.per_category.entry(category).or_default() += 1;
    }
    Ok(stats)
}

pub struct ProductStatisticsHandler {
    catalog: Arc<dyn CatalogStore>,
}

impl ProductStatisticsHandler {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl TaskHandler for ProductStatisticsHandler {
    async fn handle(&self, _task: &Task) -> TaskOutcome {
        match collect_statistics(self.catalog.as_ref()).await {
            Ok(stats) => {
                info!(
                    product_count = stats.product_count,
                    total_units = stats.total_units,
                    total_value = stats.total_value,
                    per_category = ?stats.per_category,
                    "product statistics"
                );
                TaskOutcome::Success
            }
            Err(e) => TaskOutcome::Failure(e.to_string()),
        }
    }
}
