//! Error types for the status bridge

use thiserror::Error;

/// Bridge errors
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Inbound message carried no usable argument
    #[error("Malformed message on {address}: {reason}")]
    MalformedMessage { address: String, reason: String },

    /// Address is not part of the tracked status surface
    #[error("Unrecognized OSC address: {0}")]
    UnrecognizedAddress(String),

    /// Listening socket could not be acquired
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Socket used after it was closed
    #[error("Endpoint is closed")]
    EndpointClosed,

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// OSC encode/decode failure
    #[error("OSC error: {0}")]
    Osc(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn malformed(address: &str, reason: impl Into<String>) -> Self {
        BridgeError::MalformedMessage {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
