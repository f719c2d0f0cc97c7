//! Settings file: generator and trace decoder options, stored as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::codegen::GeneratorOptions;
use crate::protocol::DecoderConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read settings: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generator: GeneratorOptions,
    pub decoder: DecoderConfig,
}

impl Settings {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let settings = Self::from_json(&fs::read_to_string(path)?)?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
