use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub data_view: DataViewConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Field validation scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Delay between a data change and the validation it triggers
    /// (default: 300).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Validate fields when their data changes (default: true).
    #[serde(default = "default_validate_on_change")]
    pub validate_on_change: bool,
}

/// Mount lifecycle strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Expect setup to run twice per mount (default: false).
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataViewConfig {
    /// Page size for new data views; 0 disables paging (default: 20).
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for file-backed view state. Falls back to the platform
    /// data directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_validate_on_change() -> bool {
    true
}

fn default_page_size() -> usize {
    20
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            validate_on_change: default_validate_on_change(),
        }
    }
}

impl Default for DataViewConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
        }
    }
}
