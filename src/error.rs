//! Error types for device resolution, construction and capture.
//!
//! `HalError` is the single error type surfaced by the library. Every failure
//! is reported synchronously to the immediate caller; nothing here is retried
//! or masked by the registry.
//!
//! ## Error Taxonomy
//!
//! - **`UnknownScheme`**: no factory or alias is registered for a scheme.
//! - **`CyclicAlias`**: alias rewriting revisited a scheme it had already expanded.
//! - **`Configuration`**: a required hint or parameter is missing or malformed.
//! - **`BackendUnavailable`**: the simulation or hardware backend could not be started.
//! - **`Construction`**: a factory failed to build its driver (bad parameter,
//!   missing resource, backend initialisation failure).
//! - **`InvalidUri`**: the device string does not follow the URI grammar.
//! - **`StreamClosed`**: a capture was requested or blocked after shutdown.
//! - **`EndOfStream`**: a finite, non-looping source has been exhausted.
//!
//! Resolution and construction errors carry the originally requested URI so a
//! failure deep inside an alias chain can still be traced back to the caller's
//! input.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type HalResult<T> = std::result::Result<T, HalError>;

/// Errors raised while resolving, constructing or reading from a device.
#[derive(Error, Debug)]
pub enum HalError {
    /// No factory or alias is registered for the scheme.
    #[error("Scheme '{scheme}' not registered for factory (requested '{uri}')")]
    UnknownScheme {
        /// The scheme that could not be resolved
        scheme: String,
        /// The URI originally passed to `create`
        uri: String,
    },

    /// Alias expansion revisited a scheme.
    #[error("Alias '{scheme}' forms a cycle while resolving '{uri}' (chain: {})", chain.join(" -> "))]
    CyclicAlias {
        /// The scheme that reappeared
        scheme: String,
        /// The URI originally passed to `create`
        uri: String,
        /// Schemes expanded before the cycle was detected, in order
        chain: Vec<String>,
    },

    /// A required hint or parameter is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A backend the request depends on could not be started.
    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable {
        /// Backend name (e.g. "simulation")
        backend: String,
        /// Human-readable reason
        message: String,
    },

    /// A factory failed to build its driver.
    #[error("Failed to construct '{scheme}' device from '{uri}': {message}")]
    Construction {
        /// Scheme of the factory that failed
        scheme: String,
        /// The URI handed to the factory
        uri: String,
        /// Human-readable reason
        message: String,
    },

    /// The device string is not a valid URI.
    #[error("Invalid device URI '{uri}': {reason}")]
    InvalidUri {
        /// The offending input
        uri: String,
        /// What is wrong with it
        reason: String,
    },

    /// Capture was requested on, or interrupted by, a stopped stream.
    #[error("Capture stream closed")]
    StreamClosed,

    /// A finite source with looping disabled has delivered its last frame.
    #[error("End of stream")]
    EndOfStream,

    /// I/O failure outside of driver construction.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalError {
    /// Build a [`HalError::Construction`] for the given URI.
    pub fn construction(uri: &crate::uri::Uri, message: impl Into<String>) -> Self {
        HalError::Construction {
            scheme: uri.scheme.clone(),
            uri: uri.to_string(),
            message: message.into(),
        }
    }

    /// Returns true for errors that terminate a capture stream.
    pub fn is_stream_end(&self) -> bool {
        matches!(self, HalError::StreamClosed | HalError::EndOfStream)
    }
}
