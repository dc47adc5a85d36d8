use std::path::Path;

use dynent_fetch::DEFAULT_MAX_MERGE_DEPTH;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Engine configuration, usually read from a TOML file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Add key and version attributes to every plan the engine builds.
    pub auto_add_keys: bool,
    /// Deepest relationship level at which composite-key types are merged.
    pub max_merge_depth: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            auto_add_keys: true,
            max_merge_depth: DEFAULT_MAX_MERGE_DEPTH,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keep one canonical instance per key and track its validity.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
