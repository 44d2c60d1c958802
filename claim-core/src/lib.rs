//! claim-core: shared building blocks for reserve-then-claim provisioning.

pub mod config;
pub mod errors;
pub mod memory;
pub mod store;

pub use config::{ClaimConfig, ClaimConfigSnapshot};
pub use errors::{ClaimError, ClaimResult, ErrorKind};
pub use memory::MemoryDirectory;
pub use store::{owner_of, CollectionKind, DirectoryStore, Fields, Record, RecordRef};
