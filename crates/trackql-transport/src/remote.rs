//! Remote backend: compile, render, and hand the request to a transport.

use crate::backend::SearchBackend;
use crate::error::{BackendError, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackql_kernel::FieldRegistry;
use trackql_query::{CompileCache, Compiler, RenderedQuery, Search, SearchResult, render};

/// Sends one rendered search request to the remote service.
///
/// HTTP, authentication, and payload mapping live behind this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn search(&self, request: &RenderedQuery) -> Result<SearchResult, TransportError>;
}

pub struct RemoteBackend<T> {
    registry: Arc<FieldRegistry>,
    cache: CompileCache,
    transport: T,
}

impl<T: Transport> RemoteBackend<T> {
    pub fn new(registry: Arc<FieldRegistry>, transport: T) -> Self {
        Self {
            registry,
            cache: CompileCache::new(),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The request body `search` would send for `record_type`.
    pub fn render(&self, record_type: &str, search: &Search) -> Result<RenderedQuery, BackendError> {
        let compiler = Compiler::new(&self.registry);
        let request = self.cache.get_or_compile(&compiler, record_type, search)?;
        Ok(render(&request))
    }

    async fn send(
        &self,
        request: &RenderedQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        tracing::debug!(
            jql = %request.jql,
            start_at = request.start_at,
            max_results = request.max_results,
            "remote search"
        );
        tokio::select! {
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            result = self.transport.search(request) => Ok(result?),
        }
    }
}

#[async_trait]
impl<T: Transport> SearchBackend for RemoteBackend<T> {
    async fn search(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, BackendError> {
        let request = self.render(record_type, search)?;
        self.send(&request, cancel).await
    }

    /// Asks for an empty page and reads the total.
    async fn count(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        let mut request = self.render(record_type, search)?;
        request.start_at = 0;
        request.max_results = 0;
        Ok(self.send(&request, cancel).await?.total)
    }
}
