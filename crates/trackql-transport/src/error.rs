use trackql_kernel::{FieldKind, LiteralKind, RegistryError};
use trackql_query::{CompileError, EvalError};
use trackql_store::StoreError;

/// Failure reported by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("remote service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Response(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("field `{field}` ({kind}) cannot hold a {found} value")]
    KindMismatch {
        field: String,
        kind: FieldKind,
        found: LiteralKind,
    },

    #[error("field `{field}` is fixed to {expected} by the scope of `{record_type}`")]
    ScopeConflict {
        record_type: String,
        field: String,
        expected: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => Self::Cancelled,
            other => Self::Store(other),
        }
    }
}

impl From<EvalError> for BackendError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Cancelled => Self::Cancelled,
        }
    }
}
