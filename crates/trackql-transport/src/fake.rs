//! Fake backend: compile, then evaluate against a local record store.
//!
//! Store access and evaluation run on the blocking pool. The store is shared
//! without an outer lock; each backend scopes its own locking, so a mutation
//! waiting on one record never delays another record or a snapshot.

use crate::backend::SearchBackend;
use crate::error::BackendError;
use crate::records::{prepare_patch, prepare_record};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackql_kernel::{FieldRegistry, RecordHandle, RecordPatch, RecordSnapshot};
use trackql_query::{
    CompileCache, Compiler, QueryRequest, Search, SearchResult, count_cancellable,
    evaluate_cancellable, exists_cancellable,
};
use trackql_store::{RecordStore, StoreError};

pub struct FakeBackend<S> {
    registry: Arc<FieldRegistry>,
    store: Arc<S>,
    cache: CompileCache,
}

impl<S: RecordStore + 'static> FakeBackend<S> {
    pub fn new(registry: Arc<FieldRegistry>, store: S) -> Self {
        Self {
            registry,
            store: Arc::new(store),
            cache: CompileCache::new(),
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Compile through the backend's cache.
    pub fn compile(
        &self,
        record_type: &str,
        search: &Search,
    ) -> Result<Arc<QueryRequest>, BackendError> {
        let compiler = Compiler::new(&self.registry);
        Ok(self.cache.get_or_compile(&compiler, record_type, search)?)
    }

    /// Create a record of `record_type` with the type's scope applied.
    ///
    /// Returns the stored record, key and id assigned.
    pub async fn create(
        &self,
        record_type: &str,
        record: RecordHandle,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, BackendError> {
        let record = prepare_record(&self.registry, record_type, record)?;
        let store = Arc::clone(&self.store);
        let cancel = cancel.clone();
        run_blocking(move || {
            let key = store.insert(record, &cancel)?;
            store
                .get(&key)?
                .ok_or_else(|| StoreError::NotFound(key).into())
        })
        .await
    }

    pub async fn update(
        &self,
        record_type: &str,
        key: &str,
        patch: &RecordPatch,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, BackendError> {
        let patch = prepare_patch(&self.registry, record_type, patch)?;
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        let cancel = cancel.clone();
        run_blocking(move || Ok(store.update(&key, &patch, &cancel)?)).await
    }

    pub async fn delete(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<RecordHandle, BackendError> {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        let cancel = cancel.clone();
        run_blocking(move || Ok(store.delete(&key, &cancel)?)).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<RecordHandle>, BackendError> {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        run_blocking(move || Ok(store.get(&key)?)).await
    }

    /// Compile, snapshot, and run `query` over the snapshot off the async
    /// runtime.
    async fn with_snapshot<T, F>(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
        query: F,
    ) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&QueryRequest, &RecordSnapshot, &CancellationToken) -> Result<T, BackendError>
            + Send
            + 'static,
    {
        let request = self.compile(record_type, search)?;
        let store = Arc::clone(&self.store);
        let cancel = cancel.clone();
        run_blocking(move || {
            let snapshot = store.snapshot(&cancel)?;
            query(&request, &snapshot, &cancel)
        })
        .await
    }
}

#[async_trait]
impl<S: RecordStore + 'static> SearchBackend for FakeBackend<S> {
    async fn search(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, BackendError> {
        let result = self
            .with_snapshot(record_type, search, cancel, |request, snapshot, cancel| {
                Ok(evaluate_cancellable(request, snapshot, cancel)?)
            })
            .await?;
        tracing::debug!(
            record_type,
            total = result.total,
            returned = result.matched.len(),
            "fake search"
        );
        Ok(result)
    }

    async fn count(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<usize, BackendError> {
        self.with_snapshot(record_type, search, cancel, |request, snapshot, cancel| {
            Ok(count_cancellable(request, snapshot, cancel)?)
        })
        .await
    }

    async fn exists(
        &self,
        record_type: &str,
        search: &Search,
        cancel: &CancellationToken,
    ) -> Result<bool, BackendError> {
        self.with_snapshot(record_type, search, cancel, |request, snapshot, cancel| {
            Ok(exists_cancellable(request, snapshot, cancel)?)
        })
        .await
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| BackendError::Task(e.to_string()))?
}
