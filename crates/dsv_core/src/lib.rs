//! Data set versioning core.
//!
//! Version lifecycle, SemVer allocation, option mapping between versions and
//! the storage ports they run against. No database code lives here; see
//! `dsv_postgres` for the PostgreSQL adapter and `memory::MemoryStore` for the
//! in-memory one.

pub mod batch;
pub mod config;
pub mod deletion;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod location;
pub mod mapping;
pub mod memory;
pub mod meta;
pub mod ports;
pub mod public;
pub mod types;
pub mod version;

pub use config::EngineConfig;
pub use error::DsvError;
pub use lifecycle::{CompletedMapping, CreateDraftRequest, DataSetVersionService};
pub use ports::Stores;
pub use types::{DataSet, DataSetVersion, DataSetVersionStatus};
pub use version::{ChangeKind, SemVersion};
