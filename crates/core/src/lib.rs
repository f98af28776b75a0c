//! Shared foundations for the rendering harness.
//!
//! Everything here is independent of Vulkan:
//! - Error types and result aliases
//! - Logging initialization
//! - TOML-backed configuration
//! - Wall-clock timing for animation and frame-rate reporting

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    AssetConfig, HarnessConfig, RenderConfig, SceneKind, ValidationConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
