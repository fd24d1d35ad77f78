//! # Kernel
//!
//! The `kernel` module hosts the engine's component-lifecycle container: an
//! [`EngineHost`](bootstrap::EngineHost) that wires together discovery, dependency
//! resolution, security, runtime dispatch and execution into a single coordinated
//! process, plus the crate-wide [`Error`](error::Error) type every subsystem feeds into.
pub mod bootstrap;
pub mod component;
pub mod constants;
pub mod error;

pub use bootstrap::EngineHost;
pub use component::{DependencyRegistry, KernelComponent};
pub use error::{Error, Result};
