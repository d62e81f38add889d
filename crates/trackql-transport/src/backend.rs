//! The search surface shared by fake and remote backends.

use crate::error::BackendError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use trackql_query::{Search, SearchResult};

/// One search endpoint over registered record types.
///
/// Implementations compile `search` against the target type (scope
/// included) and return the same `SearchResult` shape whichever way they
/// execute it.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, BackendError>;

    /// Full match count, ignoring the page window.
    async fn count(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError>;

    async fn exists(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<bool, BackendError> {
        Ok(self.count(record_type, search, cancel).await? > 0)
    }
}
