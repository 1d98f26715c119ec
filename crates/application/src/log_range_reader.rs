use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashprune_core::{AppError, AppResult};
use dashprune_domain::LogEntry;

use crate::prune_ports::{LogPageSource, LogRangePageRequest};

/// Default number of entries requested per page.
pub const DEFAULT_LOG_PAGE_LIMIT: usize = 1000;

/// Reads a complete time range from the log store by paginating forward in time.
#[derive(Clone)]
pub struct LogRangeReader {
    source: Arc<dyn LogPageSource>,
    limit: usize,
}

impl LogRangeReader {
    /// Creates a reader requesting `limit` entries per page.
    pub fn new(source: Arc<dyn LogPageSource>, limit: usize) -> AppResult<Self> {
        if limit == 0 {
            return Err(AppError::Validation(
                "log query limit must be greater than zero".to_owned(),
            ));
        }

        Ok(Self { source, limit })
    }

    /// Returns every entry in `[start, end)` in ascending timestamp order.
    ///
    /// A page shorter than the limit ends the read. Otherwise the next page
    /// starts one nanosecond after the last returned entry. If more than
    /// `limit` entries share one timestamp, only the first `limit` of them are
    /// returned and the rest are skipped: the log store offers no finer cursor
    /// than the timestamp.
    ///
    /// Any page failure fails the whole read.
    pub async fn query_range(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<LogEntry>> {
        let mut entries = Vec::new();
        let mut page_start = start;

        loop {
            let request = LogRangePageRequest {
                query: query.to_owned(),
                start: page_start,
                end,
                limit: self.limit,
            };
            let page = self.source.query_range_page(&request).await?;

            let exhausted = page.len() < self.limit;
            let next_start = page
                .last()
                .and_then(|entry| {
                    entry
                        .timestamp()
                        .checked_add_signed(TimeDelta::nanoseconds(1))
                });
            entries.extend(page);

            match next_start {
                Some(next_start) if !exhausted && next_start < end => page_start = next_start,
                _ => break,
            }
        }

        Ok(entries)
    }
}
