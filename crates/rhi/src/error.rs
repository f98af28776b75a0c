//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// A required instance layer is not installed
    #[error("Required layer not available: {0}")]
    MissingLayer(String),

    /// No physical device was enumerated
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No queue family supports graphics (and presentation, when required)
    #[error("No graphics-capable queue family found")]
    NoGraphicsQueue,

    /// The selected queue family cannot present to the surface
    #[error("Queue family {0} cannot present to the surface")]
    PresentNotSupported(u32),

    /// No memory type satisfies a resource's requirements
    #[error("No memory type in mask {type_bits:#b} supports {properties:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Shader bytecode error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// The surface has a zero-sized dimension, e.g. while minimized
    #[error("Surface extent is zero")]
    ZeroExtent,

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Returns the underlying Vulkan result code, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            RhiError::VulkanError(result) => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_roundtrip() {
        let err: RhiError = vk::Result::ERROR_OUT_OF_DATE_KHR.into();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(RhiError::NoSuitableGpu.vk_result(), None);
    }

    #[test]
    fn test_memory_type_message() {
        let err = RhiError::NoSuitableMemoryType {
            type_bits: 0b101,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        let text = err.to_string();
        assert!(text.contains("0b101"));
        assert!(text.contains("DEVICE_LOCAL"));
    }
}
