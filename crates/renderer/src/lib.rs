//! Frame pipeline and scene setup.
//!
//! This crate turns the RHI wrappers into a running renderer:
//! - Frame slots and the per-frame protocol
//! - Swapchain-sized targets, rebuilt on resize
//! - The clear, quad and mesh scenes

pub mod attachments;
mod error;
pub mod frame;
pub mod frame_loop;
pub mod frame_manager;
mod renderer;
pub mod scene;
pub mod targets;

pub use error::FrameError;
pub use frame::FrameRing;
pub use frame_loop::{FrameBackend, FrameOutcome, FramePipeline, SlotState};
pub use frame_manager::FrameSlot;
pub use renderer::Renderer;
