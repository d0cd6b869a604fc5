//! Error types for cluster specification resolution
//!
//! Defaulting itself never fails. Errors come from the two fallible stages
//! (network validation and certificate bootstrap) and from loading the
//! resolution context or (de)serializing the model. Each variant carries the
//! context needed to act on it.

use thiserror::Error;

use crate::pki::PkiError;
use crate::validate::{NetworkError, ProfileError};

/// Main error type for resolution operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Network topology rejected by validation
    #[error("network validation error: {source}")]
    Network {
        /// The specific rule that failed
        #[from]
        source: NetworkError,
    },

    /// Agent pool or add-on declarations rejected by validation
    #[error("profile validation error: {source}")]
    Profile {
        /// The specific rule that failed
        #[from]
        source: ProfileError,
    },

    /// Certificate bootstrap failure
    #[error("certificate bootstrap error: {source}")]
    Pki {
        /// The underlying PKI error
        #[from]
        source: PkiError,
    },

    /// Resolution context could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is wrong
        message: String,
        /// File the context was read from, if any
        source_path: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source_path: None,
        }
    }

    /// Create a configuration error for a specific file
    pub fn config_at(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source_path: Some(path.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Returns true if the caller must fix its input before resubmitting
    ///
    /// Only cryptographic failures inside certificate bootstrap can clear on
    /// a plain retry.
    pub fn is_input_error(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Profile { .. } => true,
            Error::Pki { source } => source.is_input_error(),
            Error::Config { .. } | Error::Serialization { .. } => true,
        }
    }
}
