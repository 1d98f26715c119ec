use async_trait::async_trait;
use dashprune_core::AppResult;

/// Port for durable dashboard definition archives.
#[async_trait]
pub trait DashboardArchive: Send + Sync {
    /// Creates or updates the archived copy of a dashboard definition.
    ///
    /// Returning `Ok` means the definition is durably stored and the live
    /// dashboard may be deleted.
    async fn backup_dashboard(
        &self,
        namespace: &str,
        name: &str,
        definition: &[u8],
    ) -> AppResult<()>;
}
