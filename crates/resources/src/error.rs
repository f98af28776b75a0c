//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The glTF document or its buffers could not be loaded.
    #[error("Failed to load glTF file '{path}': {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },

    /// The mesh does not have the shape the harness draws.
    #[error("Unsupported mesh in '{path}': {reason}")]
    InvalidMesh { path: PathBuf, reason: String },

    /// File not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mesh_message_names_file() {
        let err = ResourceError::InvalidMesh {
            path: PathBuf::from("box.gltf"),
            reason: "2 meshes".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported mesh in 'box.gltf': 2 meshes");
    }
}
