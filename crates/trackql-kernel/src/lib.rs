//! # trackql-kernel
//!
//! Shared data model for the trackql query stack.
//!
//! ```text
//! FieldRegistry      ← record types: descriptors + scope constraints
//!     │
//! Literal            ← typed values on records and in predicates
//!     │
//! RecordHandle       ← one tracked item (id, key, fields, parent)
//!     │
//! RecordSnapshot     ← point-in-time record set + key/parent indexes
//! ```
//!
//! Query compilation, rendering, and evaluation live in `trackql-query`;
//! storage backends live in `trackql-store`.

pub mod config;
pub mod digest;
pub mod error;
pub mod field;
pub mod literal;
pub mod record;
pub mod registry;
pub mod snapshot;

pub use config::{StoreSettings, TrackqlConfig};
pub use digest::ContentHash;
pub use error::{ConfigError, RegistryError};
pub use field::{FieldDescriptor, FieldKind};
pub use literal::{Literal, LiteralKind, truncate_to_minute};
pub use record::{RecordHandle, RecordPatch};
pub use registry::{FieldRegistry, RecordType, ScopeConstraint};
pub use snapshot::RecordSnapshot;
