//! Vulkan harness entry point.
//!
//! Usage: `harness [config.toml]`. Without an argument, `harness.toml` in
//! the working directory is used when present.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use harness_core::{HarnessConfig, Timer};
use harness_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EventLoop, Window, WindowEvent, WindowId,
};
use harness_renderer::{FrameOutcome, Renderer};

/// Exit status for setup and fatal rendering failures.
const FAILURE_EXIT_CODE: u8 = 255;

struct App {
    config: HarnessConfig,
    // Dropped before the window.
    renderer: Option<Renderer>,
    window: Option<Window>,
    timer: Timer,
    failed: bool,
}

impl App {
    fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            timer: Timer::new(),
            failed: false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop) {
        self.failed = true;
        self.renderer = None;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.render_frame(&self.timer) {
            Ok(FrameOutcome::Presented { .. }) => {
                if let Some(fps) = self.timer.frame() {
                    info!("{:.1} fps", fps);
                }
            }
            Ok(FrameOutcome::Skipped) => debug!("Frame skipped for swapchain rebuild"),
            Ok(FrameOutcome::Deferred) => {
                // Nothing to draw into; sleep until the next resize event.
                event_loop.set_control_flow(ControlFlow::Wait);
            }
            Err(e) if e.is_fatal() => {
                error!("{}", e);
                self.fail(event_loop);
            }
            Err(e) => warn!("{}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                self.fail(event_loop);
                return;
            }
        };

        match Renderer::new(&window, &self.config) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
                self.timer.reset();
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                self.fail(event_loop);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                if size.width > 0 && size.height > 0 {
                    event_loop.set_control_flow(ControlFlow::Poll);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        if window.is_minimized() {
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            window.request_redraw();
        }
    }
}

fn run() -> Result<bool> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = HarnessConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(!app.failed)
}

fn main() -> ExitCode {
    harness_core::init_logging();
    info!("Starting Vulkan harness");

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(FAILURE_EXIT_CODE),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}
