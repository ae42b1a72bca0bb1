//! Error types shared outside the GPU layer.

use thiserror::Error;

/// Main error type for windowing, configuration and I/O failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised by collaborators (surface creation, extension queries)
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
