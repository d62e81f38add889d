//! # trackql-transport
//!
//! Search backends behind one async trait.
//!
//! ```text
//! SearchBackend
//!     ├─ FakeBackend<S: RecordStore>  compile → evaluate over a store snapshot
//!     └─ RemoteBackend<T: Transport>  compile → render → transport
//! ```
//!
//! Both return `SearchResult { matched, total }` and honour a
//! `CancellationToken` on every call.

pub mod backend;
pub mod error;
pub mod fake;
pub mod records;
pub mod remote;

pub use backend::SearchBackend;
pub use error::{BackendError, TransportError};
pub use fake::FakeBackend;
pub use records::{prepare_patch, prepare_record};
pub use remote::{RemoteBackend, Transport};
