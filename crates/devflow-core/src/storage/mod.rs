//! Synchronous filesystem abstraction shared by discovery, the dependency cache,
//! and per-plugin environment preparation.
pub mod error;
pub mod local;
pub mod provider;

pub use error::StorageSystemError;
pub use local::LocalStorageProvider;
pub use provider::StorageProvider;
