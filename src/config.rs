//! Engine configuration.
//!
//! Collaborators (CLI, config files) build an [`EngineConfig`]; the engine
//! itself only consumes it. Three environment variables override the
//! directory layout for compatibility with the rest of the toolchain:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `GNO_DATA_DIR` | where the index database lives |
//! | `GNO_CONFIG_DIR` | where collaborators keep their config |
//! | `GNO_MODEL_CACHE_DIR` | where model runtimes cache weights |
//!
//! Each must be an absolute path when set.

use std::path::{Path, PathBuf};

use chunker::ChunkerConfig;
use convert::ConvertLimits;
use search::SearchConfig;
use serde::{Deserialize, Serialize};
use store::FtsTokenizer;

use crate::error::EngineError;

pub const ENV_DATA_DIR: &str = "GNO_DATA_DIR";
pub const ENV_CONFIG_DIR: &str = "GNO_CONFIG_DIR";
pub const ENV_MODEL_CACHE_DIR: &str = "GNO_MODEL_CACHE_DIR";

/// The active embedding model preset, as selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPreset {
    /// Identifier vectors are keyed by, e.g. `builtin:minilm`.
    pub model_uri: String,
    pub dimensions: usize,
}

impl Default for ModelPreset {
    fn default() -> Self {
        Self {
            model_uri: "builtin:minilm".to_string(),
            dimensions: 384,
        }
    }
}

/// Everything the engine needs to open a store and run the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub model_cache_dir: PathBuf,
    pub tokenizer: FtsTokenizer,
    pub model: ModelPreset,
    /// When false the vector side-index is absent: vector writes still
    /// land durably, vector search fails with `VEC_UNAVAILABLE`.
    pub vec_search_enabled: bool,
    pub chunker: ChunkerConfig,
    #[serde(skip)]
    pub search: SearchConfig,
    pub convert_limits: ConvertLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".gno/data"),
            config_dir: PathBuf::from(".gno/config"),
            model_cache_dir: PathBuf::from(".gno/models"),
            tokenizer: FtsTokenizer::Unicode61,
            model: ModelPreset::default(),
            vec_search_enabled: true,
            chunker: ChunkerConfig::default(),
            search: SearchConfig::default(),
            convert_limits: ConvertLimits::default(),
        }
    }
}

impl EngineConfig {
    /// A config rooted at one directory (data/config/models subdirs).
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            model_cache_dir: root.join("models"),
            ..Self::default()
        }
    }

    /// Apply environment overrides. Set variables must hold absolute
    /// paths.
    pub fn with_env_overrides(mut self) -> Result<Self, EngineError> {
        for (var, slot) in [
            (ENV_DATA_DIR, &mut self.data_dir),
            (ENV_CONFIG_DIR, &mut self.config_dir),
            (ENV_MODEL_CACHE_DIR, &mut self.model_cache_dir),
        ] {
            if let Ok(value) = std::env::var(var) {
                let path = PathBuf::from(&value);
                if !path.is_absolute() {
                    return Err(EngineError::Validation(format!(
                        "{var} must be an absolute path, got '{value}'"
                    )));
                }
                *slot = path;
            }
        }
        Ok(self)
    }

    /// The index database file inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("index.redb")
    }
}
