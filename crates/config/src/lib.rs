//! Configuration loading for grantstore.
//!
//! Uses figment to layer defaults, an optional YAML file and `GRANTSTORE_*`
//! environment variables.

pub mod schema;

pub use schema::{BackendKind, Config, ENV_PREFIX, LogConfig, LogFormat, StorageConfig, SweepConfig};
