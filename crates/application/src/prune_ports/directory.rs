use async_trait::async_trait;
use dashprune_core::AppResult;
use dashprune_domain::Dashboard;

/// Port for the dashboard service directory of one namespace.
#[async_trait]
pub trait DashboardDirectory: Send + Sync {
    /// Lists every dashboard in the namespace, following continuation tokens until exhausted.
    async fn list_dashboards(&self, namespace: &str) -> AppResult<Vec<Dashboard>>;

    /// Deletes one dashboard.
    async fn delete_dashboard(&self, namespace: &str, name: &str) -> AppResult<()>;
}
