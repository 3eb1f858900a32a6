use std::sync::Arc;

use tracing::info;

use shopfront_infra::config::AppConfig;
use shopfront_infra::services::{AccountService, BasketReconciler, OrderService, UserLocks};
use shopfront_infra::store::{BasketStore, CatalogStore, InMemoryShopStore, OrderStore, UserStore};
use shopfront_infra::tasks::{
    ActivationMailHandler, InMemoryTaskQueue, LogMailer, PRODUCTS_STATISTIC, ProductStatisticsHandler, RetryPolicy,
    SEND_ACTIVATION_MAIL, TaskQueue, TaskWorker, TaskWorkerConfig, TaskWorkerHandle,
};

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub catalog: Arc<dyn CatalogStore>,
    pub basket: BasketReconciler,
    pub orders: OrderService,
    pub accounts: AccountService,
    pub tasks: Arc<dyn TaskQueue>,
}

impl AppServices {
    /// Wire every service onto one store. Basket and order services share the
    /// per-user locks.
    pub fn new<S>(store: Arc<S>, tasks: Arc<dyn TaskQueue>, site_url: impl Into<String>) -> Self
    where
        S: CatalogStore + BasketStore + UserStore + OrderStore + 'static,
    {
        let locks = Arc::new(UserLocks::new());
        Self {
            catalog: store.clone(),
            basket: BasketReconciler::new(store.clone(), store.clone(), locks.clone()),
            orders: OrderService::new(store.clone(), store.clone(), store.clone(), locks),
            accounts: AccountService::new(store, tasks.clone(), site_url),
            tasks,
        }
    }
}

/// Build the services and start the background task worker.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<(Arc<AppServices>, TaskWorkerHandle)> {
    let retry_policy = RetryPolicy {
        max_attempts: config.task_max_attempts,
        ..RetryPolicy::default()
    };
    let queue = Arc::new(InMemoryTaskQueue::new(retry_policy));

    let services = if config.use_persistent_stores {
        build_persistent_services(config, queue.clone()).await?
    } else {
        info!("using in-memory stores");
        AppServices::new(InMemoryShopStore::arc(), queue.clone(), config.site_url.clone())
    };

    let mut worker = TaskWorker::new(queue);
    worker
        .register(SEND_ACTIVATION_MAIL, ActivationMailHandler::new(Arc::new(LogMailer)))
        .register(PRODUCTS_STATISTIC, ProductStatisticsHandler::new(services.catalog.clone()));
    let handle = worker.spawn(TaskWorkerConfig::default().with_poll_interval(config.task_poll_interval));

    Ok((Arc::new(services), handle))
}

#[cfg(feature = "postgres")]
async fn build_persistent_services(config: &AppConfig, tasks: Arc<InMemoryTaskQueue>) -> anyhow::Result<AppServices> {
    use anyhow::Context;
    use shopfront_infra::store::PostgresShopStore;

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let store = PostgresShopStore::connect(database_url)
        .await
        .context("failed to connect to postgres")?;
    store.migrate().await.context("failed to apply schema")?;

    info!("using postgres stores");
    Ok(AppServices::new(Arc::new(store), tasks, config.site_url.clone()))
}

#[cfg(not(feature = "postgres"))]
async fn build_persistent_services(config: &AppConfig, tasks: Arc<InMemoryTaskQueue>) -> anyhow::Result<AppServices> {
    tracing::warn!("USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory");
    Ok(AppServices::new(InMemoryShopStore::arc(), tasks, config.site_url.clone()))
}
