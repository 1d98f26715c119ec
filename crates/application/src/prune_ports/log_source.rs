use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashprune_core::AppResult;
use dashprune_domain::LogEntry;

/// One forward range query page against the log store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRangePageRequest {
    /// Label selector followed by filter expressions.
    pub query: String,
    /// Inclusive page start.
    pub start: DateTime<Utc>,
    /// Exclusive range end.
    pub end: DateTime<Utc>,
    /// Maximum number of entries returned for this page.
    pub limit: usize,
}

/// Port for single-page range reads from the log store.
#[async_trait]
pub trait LogPageSource: Send + Sync {
    /// Reads one page of entries in ascending timestamp order.
    ///
    /// Implementations must not return partial pages on error.
    async fn query_range_page(&self, request: &LogRangePageRequest) -> AppResult<Vec<LogEntry>>;
}
