//! Error types shared by the harness crates.

use thiserror::Error;

/// Setup-level error for the harness.
///
/// Every variant is fatal: whoever receives one aborts initialization.
/// Per-frame conditions that the render loop can survive are modelled
/// separately by the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan object creation or command failure
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window or surface creation errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading or decoding errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// Shader bytecode errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the harness error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            Error::Shader("bad length".into()).to_string(),
            "Shader error: bad length"
        );
        assert_eq!(
            Error::Config("zero width".into()).to_string(),
            "Config error: zero width"
        );
    }
}
