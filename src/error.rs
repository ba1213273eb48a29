//! Error types for session and packet processing.
//!
//! This module provides the error type shared by the packet codec, the render
//! session engine and the session registry. All errors implement the
//! `std::error::Error` trait and carry enough structured context to produce a
//! useful diagnostic.
//!
//! ## Error Categories
//!
//! - **Packet Errors**: malformed buffers and unknown packet types. These are
//!   dropped with a diagnostic and never end a session.
//! - **Decoder Errors**: a controller that could not be constructed or activated
//! - **Resource Errors**: socket, thread or graphics acquisition during `start()`
//! - **Registry Errors**: unknown session ids and operations that do not apply to
//!   the session's current format
//! - **Configuration Errors**: YAML that could not be loaded or parsed
//!
//! ## Recoverability
//!
//! ```rust
//! use subtrack::SessionError;
//!
//! let error = SessionError::malformed_packet("buffer shorter than header", 3);
//! assert!(error.is_recoverable());
//!
//! let error = SessionError::unknown_session(7);
//! assert!(!error.is_recoverable());
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::SessionType;

/// Result type alias for session operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Main error type for session operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    #[error("Malformed packet ({length} bytes): {reason}")]
    MalformedPacket { reason: String, length: usize },

    #[error("Unknown packet type {raw:#x}")]
    UnknownPacketType { raw: u32 },

    #[error("Failed to construct {format} decoder: {reason}")]
    DecoderConstruction { format: SessionType, reason: String },

    #[error("Failed to acquire {resource}")]
    ResourceAcquisition {
        resource: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unknown session {id}")]
    UnknownSession { id: u32 },

    #[error("{operation} is not supported for {session_type} sessions")]
    NotSupported { operation: String, session_type: SessionType },

    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },

    #[error("Configuration error in {context}: {details}")]
    Configuration { context: String, details: String },

    #[error("Configuration file error: {path}")]
    ConfigurationFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },
}

impl SessionError {
    /// Returns whether the error is dropped with a diagnostic rather than
    /// surfaced to the caller.
    ///
    /// Packet-level failures never end a session: the offending buffer is
    /// logged and discarded and the next packet is processed normally.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::MalformedPacket { .. } => true,
            SessionError::UnknownPacketType { .. } => true,
            SessionError::DecoderConstruction { .. } => false,
            SessionError::ResourceAcquisition { .. } => false,
            SessionError::UnknownSession { .. } => false,
            SessionError::NotSupported { .. } => false,
            SessionError::InvalidArgument { .. } => false,
            SessionError::Configuration { .. } => false,
            SessionError::ConfigurationFile { .. } => false,
            SessionError::UnsupportedPlatform { .. } => false,
        }
    }

    /// Helper constructor for malformed packet errors.
    pub fn malformed_packet(reason: impl Into<String>, length: usize) -> Self {
        SessionError::MalformedPacket { reason: reason.into(), length }
    }

    /// Helper constructor for decoder construction failures.
    pub fn decoder_construction(format: SessionType, reason: impl Into<String>) -> Self {
        SessionError::DecoderConstruction { format, reason: reason.into() }
    }

    /// Helper constructor for resource acquisition failures.
    pub fn resource_acquisition(resource: impl Into<String>) -> Self {
        SessionError::ResourceAcquisition { resource: resource.into(), source: None }
    }

    /// Helper constructor for resource acquisition failures with source.
    pub fn resource_acquisition_with_source(
        resource: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SessionError::ResourceAcquisition { resource: resource.into(), source: Some(source) }
    }

    /// Helper constructor for unknown session ids.
    pub fn unknown_session(id: u32) -> Self {
        SessionError::UnknownSession { id }
    }

    /// Helper constructor for operations that do not apply to the current format.
    pub fn not_supported(operation: impl Into<String>, session_type: SessionType) -> Self {
        SessionError::NotSupported { operation: operation.into(), session_type }
    }

    /// Helper constructor for invalid arguments.
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        SessionError::InvalidArgument { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn configuration(context: impl Into<String>, details: impl Into<String>) -> Self {
        SessionError::Configuration { context: context.into(), details: details.into() }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        SessionError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

impl From<serde_yaml_ng::Error> for SessionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SessionError::Configuration { context: "YAML".to_string(), details: err.to_string() }
    }
}
