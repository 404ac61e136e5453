use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, RtenkitError};

/// Locations of the two serialized artefacts an [`crate::Embedder`] needs.
///
/// ```json
/// { "model_path": "model.safetensors", "tokenizer_path": "tokenizer.json" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EmbedderConfig {
    #[serde(alias = "model")]
    pub model_path: PathBuf,
    #[serde(alias = "tokenizer")]
    pub tokenizer_path: PathBuf,
}

impl EmbedderConfig {
    pub fn new(model_path: impl Into<PathBuf>, tokenizer_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            tokenizer_path: tokenizer_path.into(),
        }
    }

    /// Reads a JSON config file. Relative artefact paths are resolved against
    /// the directory containing the config file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let io_err = |source| RtenkitError::Io {
            path: config_path.to_path_buf(),
            source,
        };

        let mut file = File::open(config_path).map_err(io_err)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(io_err)?;

        let mut config = Self::from_json_str(&contents)?;
        if let Some(base) = config_path.parent() {
            config.model_path = resolve(base, &config.model_path);
            config.tokenizer_path = resolve(base, &config.tokenizer_path);
        }
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RtenkitError::Config(e.to_string()))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
