//! Thin RAII layer over Vulkan.
//!
//! Every wrapper owns exactly one Vulkan object (plus its memory, for
//! buffers and images) and destroys it on drop. Objects created from a
//! [`device::Device`] hold an `Arc` to it, so the device always outlives
//! them. This crate handles:
//! - Instance, validation and device creation
//! - Buffer and image allocation with one memory allocation each
//! - Staging uploads and one-shot command submission
//! - Swapchain creation and recreation
//! - Render pass, framebuffer, pipeline and descriptor construction
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod transfer;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
