//! # trackql-store
//!
//! Record stores that feed the query evaluator.
//!
//! ```text
//! RecordStore (trait)
//!     ├─ MemoryStore  process-local, copy-on-write snapshot
//!     └─ FsStore      one JSON blob per record on a shared filesystem
//!                     (atomic replace + per-record lock files)
//! ```
//!
//! Both backends hand out `Arc<RecordSnapshot>` values carrying the key and
//! parent/child indexes the evaluator uses for subqueries.

pub mod blob;
pub mod error;
pub mod fs;
pub mod lock;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use fs::FsStore;
pub use lock::{LockPolicy, UnitLockGuard};
pub use memory::MemoryStore;
pub use store::{FIRST_RECORD_ID, RecordStore, Sequence};
