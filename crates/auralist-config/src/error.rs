//! Failures while assembling the Auralist configuration
//!
//! Every variant is fatal at startup: the binary reports it and exits before touching the
//! catalog or opening a remote session.

use auralist_types::Error as AuralistError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded, validated or saved
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An `auralist.{yaml,toml,json}` file could not be read or written
    #[error("Cannot access config file '{path}': {source}")]
    File {
        /// Config file or the directory meant to hold it
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Defaults, the config file and `AURALIST__*` variables could not be merged,
    /// usually because a value has the wrong type
    #[error("Failed to merge configuration sources: {message}")]
    Sources {
        /// Message from the layering step
        message: String,
    },

    /// A setting the requested command depends on is empty, such as the search
    /// directory for indexing or `remote.host` for syncing
    #[error("Missing required setting '{key}'")]
    MissingSetting {
        /// Dotted key of the setting
        key: String,
    },

    /// A setting is present but unusable, such as a zero chunk size
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue {
        /// Dotted key of the setting
        key: String,
        /// What is wrong with the value
        message: String,
    },

    /// `auralist config --default` could not render the requested format
    #[error("Cannot render configuration as {format}: {message}")]
    Render {
        /// Target format
        format: &'static str,
        /// Serializer message
        message: String,
    },
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Sources {
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for AuralistError {
    fn from(error: ConfigError) -> Self {
        AuralistError::config(error.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// A required setting is empty
    pub fn missing_setting<S: Into<String>>(key: S) -> Self {
        Self::MissingSetting { key: key.into() }
    }

    /// A setting holds an unusable value
    pub fn invalid_value<K: Into<String>, S: Into<String>>(key: K, message: S) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Rendering to `format` failed
    pub fn render<E: std::fmt::Display>(format: &'static str, error: E) -> Self {
        Self::Render {
            format,
            message: error.to_string(),
        }
    }
}
