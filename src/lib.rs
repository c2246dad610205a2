//! regsync library
//!
//! Registry catalog and tag synchronization engine for Docker Registry V2
//! compatible registries: paginated listings, schema v1/v2 manifest
//! resolution, and bulk or two-phase tag mutations with streamed progress.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod registry;

pub use config::{AppConfig, RegistryConfig};
pub use error::{RegistryError, Result};
pub use logging::Logger;
pub use registry::{RegistryClient, RegistryClientBuilder};
