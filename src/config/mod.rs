//! Engine configuration loaded from TOML.

pub mod loader;
pub mod types;

pub use loader::ConfigError;
pub use types::{DataViewConfig, EngineConfig, LifecycleConfig, PersistenceConfig, ValidationConfig};
