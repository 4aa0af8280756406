//! Configuration error types.

use thiserror::Error;

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path of the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid TOML.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        /// Path of the file.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// The merged tree does not deserialize into the config type.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] toml::de::Error),

    /// A value is out of range or a cross-field invariant is violated.
    ///
    /// These are startup-fatal; the daemon refuses to run.
    #[error("invalid config value for {field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
