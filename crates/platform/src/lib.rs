//! Platform layer: the window and its Vulkan surface.
//!
//! This crate provides:
//! - Window creation via winit
//! - Surface creation and the instance extensions it needs
//! - Framebuffer size queries used to size and defer swapchains

mod window;

pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::application::ApplicationHandler;
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::window::WindowId;
