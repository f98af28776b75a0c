//! Renderer error types.
//!
//! Two kinds of failure exist once the renderer is running. A transient
//! failure drops the current frame and the loop carries on; a fatal one
//! means the GPU state can no longer be trusted. Setup itself reports
//! through [`harness_core::Error`].

use ash::vk;
use thiserror::Error;

use harness_core::Error;
use harness_resources::ResourceError;
use harness_rhi::RhiError;

/// Error returned by one iteration of the frame loop.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The frame was dropped; the next iteration may succeed.
    #[error("Frame dropped: {0}")]
    Transient(#[source] RhiError),

    /// Rendering cannot continue.
    #[error("Fatal frame error: {0}")]
    Fatal(#[source] RhiError),
}

impl FrameError {
    /// Sorts a failed per-frame call. A lost device or surface and
    /// exhausted memory are fatal; everything else drops the frame.
    pub fn classify(error: RhiError) -> Self {
        match error.vk_result() {
            Some(
                vk::Result::ERROR_DEVICE_LOST
                | vk::Result::ERROR_OUT_OF_HOST_MEMORY
                | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                | vk::Result::ERROR_SURFACE_LOST_KHR,
            ) => Self::Fatal(error),
            _ => Self::Transient(error),
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Converts lower-layer failures into setup errors with a short context.
pub(crate) trait SetupContext<T> {
    fn setup(self, what: &str) -> harness_core::Result<T>;
}

impl<T> SetupContext<T> for Result<T, RhiError> {
    fn setup(self, what: &str) -> harness_core::Result<T> {
        self.map_err(|e| match e {
            RhiError::ShaderError(msg) => Error::Shader(format!("{what}: {msg}")),
            other => Error::Vulkan(format!("{what}: {other}")),
        })
    }
}

impl<T> SetupContext<T> for Result<T, ResourceError> {
    fn setup(self, what: &str) -> harness_core::Result<T> {
        self.map_err(|e| Error::Resource(format!("{what}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_device_lost_is_fatal() {
        let err = FrameError::classify(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_classify_other_failures_are_transient() {
        let err = FrameError::classify(RhiError::VulkanError(vk::Result::TIMEOUT));
        assert!(!err.is_fatal());

        let err = FrameError::classify(RhiError::InvalidHandle("stale".into()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_setup_context_maps_shader_errors() {
        let result: Result<(), RhiError> = Err(RhiError::ShaderError("length 7".into()));
        let err = result.setup("vertex shader").unwrap_err();
        assert!(matches!(err, Error::Shader(_)));
        assert_eq!(err.to_string(), "Shader error: vertex shader: length 7");
    }

    #[test]
    fn test_setup_context_maps_vulkan_errors() {
        let result: Result<(), RhiError> = Err(RhiError::NoSuitableGpu);
        let err = result.setup("device").unwrap_err();
        assert!(matches!(err, Error::Vulkan(_)));
    }
}
