//! Error types for the SirMetal engine
//!
//! This module defines the error type shared by every subsystem: GPU memory
//! allocation, constant buffers, resource registries and configuration.

use std::fmt;

/// Result type for SirMetal engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// SirMetal engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Backend-specific error (Vulkan, Metal, etc.)
    BackendError(String),

    /// Out of GPU memory, or a fixed-capacity pool is exhausted
    OutOfMemory,

    /// Invalid resource (unknown handle, malformed resource description)
    InvalidResource(String),

    /// Initialization failed (engine, device, configuration)
    InitializationFailed(String),

    /// Operation not allowed in the current state (wrong allocation mode,
    /// wrong handle flavor, violated precondition)
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
