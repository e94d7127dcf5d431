//! Error types for the head pan player

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Cannot play media: {0}")]
    Media(String),
}

/// Connection errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Not connected to tracking server")]
    NotConnected,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Camera/media permission errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermissionError {
    #[error("Camera access denied: {0}")]
    Denied(String),

    #[error("No camera available")]
    NoDevice,
}

/// Session controller errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Not connected to tracking server")]
    NotConnected,

    #[error("A start or stop is already in progress")]
    TransitionInProgress,

    #[error("System is already active")]
    AlreadyActive,

    #[error("System is not active")]
    NotActive,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
