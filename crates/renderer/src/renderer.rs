//! Main renderer orchestration.
//!
//! [`Renderer`] owns every GPU object for one window and runs frames through
//! [`FramePipeline`]. The Vulkan side of the frame protocol lives in
//! [`GpuFrames`], which implements [`FrameBackend`].

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use harness_core::{Error, HarnessConfig, SceneKind, Timer};
use harness_platform::{Surface, Window};
use harness_rhi::device::{Device, SWAPCHAIN_EXTENSIONS};
use harness_rhi::instance::{Instance, InstanceDesc, ValidationDesc, validation_error_count};
use harness_rhi::physical_device::{PresentTarget, select_physical_device};
use harness_rhi::swapchain::AcquireOutcome;
use harness_rhi::{RhiError, RhiResult};

use crate::attachments::{DEFAULT_DEPTH_FORMAT, clamp_samples, sample_count_flags};
use crate::error::{FrameError, SetupContext};
use crate::frame::FrameRing;
use crate::frame_loop::{FrameBackend, FrameOutcome, FramePipeline};
use crate::frame_manager::{FrameSlot, create_frame_slots};
use crate::scene::{Scene, clear_color};
use crate::targets::{RenderTargets, TargetConfig};

/// GPU state driven by the frame pipeline.
///
/// Fields drop in declaration order: scene resources, frame slots,
/// swapchain targets, the surface, the device and finally the instance.
struct GpuFrames {
    scene: Scene,
    slots: FrameRing<FrameSlot>,
    targets: RenderTargets,
    surface: Surface,
    device: Arc<Device>,
    /// Debug messenger and instance, destroyed last.
    instance: Instance,

    /// Last framebuffer size reported by the window.
    framebuffer_size: (u32, u32),
    /// Clear color for the frame being recorded.
    clear: [f32; 4],
    /// Animation time for the frame being recorded, in seconds.
    time: f32,
}

impl GpuFrames {
    fn slot(&self, slot: usize) -> Result<&FrameSlot, FrameError> {
        self.slots.get(slot).ok_or_else(|| missing_slot(slot))
    }

    fn record_commands(&self, slot: usize, image_index: u32) -> RhiResult<()> {
        let cmd = self
            .slots
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("No frame slot {}", slot)))?
            .command_buffer();
        let framebuffer = self.targets.framebuffer(image_index)?;
        let render_pass = self.targets.render_pass();
        let extent = self.targets.extent();
        let clear_values = render_pass.desc().clear_values(self.clear);

        cmd.begin()?;
        cmd.begin_render_pass(render_pass.handle(), framebuffer, extent, &clear_values);
        self.scene.record(cmd, extent, self.time);
        cmd.end_render_pass();
        cmd.end()
    }
}

/// Maps a target rebuild onto the frame protocol. A surface that shrank to
/// zero defers the rebuild; any other failure leaves the targets unusable.
fn rebuild_result(result: RhiResult<bool>) -> Result<bool, FrameError> {
    match result {
        Ok(true) => Ok(true),
        Ok(false) | Err(RhiError::ZeroExtent) => {
            debug!("Surface extent is zero, deferring swapchain rebuild");
            Ok(false)
        }
        Err(e) => Err(FrameError::Fatal(e)),
    }
}

fn missing_slot(slot: usize) -> FrameError {
    FrameError::Fatal(RhiError::InvalidHandle(format!("No frame slot {}", slot)))
}

impl FrameBackend for GpuFrames {
    fn wait_for_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.slot(slot)?.wait().map_err(FrameError::classify)
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome, FrameError> {
        let semaphore = self.slot(slot)?.image_available().handle();
        self.targets
            .swapchain()
            .acquire_next_image(semaphore)
            .map_err(FrameError::classify)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<(), FrameError> {
        self.slot(slot)?.reset().map_err(FrameError::classify)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<(), FrameError> {
        self.record_commands(slot, image_index)
            .map_err(FrameError::classify)
    }

    fn submit(&mut self, slot: usize) -> Result<(), FrameError> {
        self.slot(slot)?
            .submit(&self.device)
            .map_err(FrameError::classify)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool, FrameError> {
        let semaphore = self.slot(slot)?.render_finished().handle();
        self.targets
            .swapchain()
            .present(self.device.graphics_queue(), image_index, semaphore)
            .map_err(FrameError::classify)
    }

    fn recreate(&mut self) -> Result<bool, FrameError> {
        let (width, height) = self.framebuffer_size;
        if width == 0 || height == 0 {
            debug!("Framebuffer is {}x{}, deferring swapchain rebuild", width, height);
            return Ok(false);
        }

        let target = PresentTarget {
            surface_loader: self.surface.loader(),
            surface: self.surface.handle(),
        };
        if !rebuild_result(self.targets.recreate(target))? {
            return Ok(false);
        }

        // A suboptimal acquire may have left image_available signaled.
        for slot in self.slots.iter_mut() {
            slot.renew_semaphores(&self.device)
                .map_err(FrameError::Fatal)?;
        }
        Ok(true)
    }

    fn abandon(&mut self, slot: usize) -> Result<(), FrameError> {
        self.device.wait_idle().map_err(FrameError::Fatal)?;
        let device = self.device.clone();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| missing_slot(slot))?
            .restore(&device)
            .map_err(FrameError::Fatal)
    }
}

/// Renders the configured scene into a window.
pub struct Renderer {
    pipeline: FramePipeline,
    gpu: GpuFrames,
    animate_clear: bool,
}

impl Renderer {
    /// Creates every GPU object for `window`.
    ///
    /// # Errors
    ///
    /// Any failure here is a setup failure: a missing validation layer, no
    /// usable GPU, a missing or malformed shader or asset, or a Vulkan call
    /// that failed.
    pub fn new(window: &Window, config: &HarnessConfig) -> harness_core::Result<Self> {
        let (width, height) = window.framebuffer_size();
        info!(
            "Initializing Vulkan renderer ({}x{}, scene {:?})",
            width, height, config.render.scene
        );

        let app_name = CString::new(config.window.title.as_str())
            .map_err(|_| Error::Config("window.title contains a NUL byte".to_string()))?;
        let extensions = window.required_extensions()?;
        let validation = config.validation.enabled.then(|| ValidationDesc {
            best_practices: config.validation.best_practices,
            gpu_assisted: config.validation.gpu_assisted,
            synchronization: config.validation.synchronization,
        });
        let instance = Instance::new(&InstanceDesc {
            app_name: &app_name,
            extensions: &extensions,
            validation,
        })
        .setup("instance")?;

        // Declared after the instance so it is dropped first on early return.
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let present = PresentTarget {
            surface_loader: surface.loader(),
            surface: surface.handle(),
        };

        let physical = select_physical_device(instance.handle(), Some(present)).setup("GPU")?;
        let device =
            Device::new(&instance, &physical, SWAPCHAIN_EXTENSIONS).setup("logical device")?;

        let requested = sample_count_flags(config.render.msaa_samples).ok_or_else(|| {
            Error::Config(format!(
                "render.msaa_samples {} is not a supported sample count",
                config.render.msaa_samples
            ))
        })?;
        let samples = clamp_samples(requested, physical.max_sample_count());
        if samples != requested {
            info!(
                "Requested {:?} samples, device supports up to {:?}",
                requested, samples
            );
        }
        // Meshes are always drawn with depth testing.
        let depth = config.render.depth || config.render.scene == SceneKind::Mesh;
        let target_config = TargetConfig {
            depth_format: depth.then_some(DEFAULT_DEPTH_FORMAT),
            samples,
        };

        let targets = RenderTargets::new(&instance, device.clone(), present, target_config)
            .setup("render targets")?;
        let slots =
            create_frame_slots(&device, config.render.frames_in_flight).setup("frame slots")?;
        let pipeline = FramePipeline::new(config.render.frames_in_flight).ok_or_else(|| {
            Error::Config("render.frames_in_flight must be at least 1".to_string())
        })?;
        let scene = Scene::new(&device, config, targets.render_pass())?;

        info!(
            "Renderer initialized: {} swapchain images, {} frame(s) in flight",
            targets.swapchain().image_count(),
            pipeline.frames_in_flight()
        );

        Ok(Self {
            pipeline,
            gpu: GpuFrames {
                scene,
                slots,
                targets,
                surface,
                device,
                instance,
                framebuffer_size: (width, height),
                clear: clear_color(0.0),
                time: 0.0,
            },
            animate_clear: config.render.animate_clear,
        })
    }

    /// Records the window's new framebuffer size. The swapchain is rebuilt
    /// at the start of the next frame, or once the size is non-zero.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != self.gpu.framebuffer_size {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.gpu.framebuffer_size.0, self.gpu.framebuffer_size.1, width, height
            );
        }
        self.gpu.framebuffer_size = (width, height);
        self.pipeline.request_resize();
    }

    /// Renders one frame.
    ///
    /// # Errors
    ///
    /// See [`FramePipeline::run_iteration`]. After a fatal error the
    /// renderer should be dropped.
    pub fn render_frame(&mut self, timer: &Timer) -> Result<FrameOutcome, FrameError> {
        self.gpu.time = timer.elapsed_secs();
        self.gpu.clear = clear_color(if self.animate_clear { timer.pulse() } else { 0.0 });
        self.pipeline.run_iteration(&mut self.gpu)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.gpu.targets.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.gpu.targets.swapchain().format()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.pipeline.frames_in_flight()
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.pipeline.frame_number()
    }

    /// Whether the validation layer is active.
    pub fn has_validation(&self) -> bool {
        self.gpu.instance.has_validation()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still uses it.
        if let Err(e) = self.gpu.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }
        if self.has_validation() {
            let errors = validation_error_count();
            if errors > 0 {
                warn!("Validation reported {} error(s) during this run", errors);
            }
        }
        info!("Renderer shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_extent_defers_rebuild() {
        assert!(!rebuild_result(Ok(false)).unwrap());
        assert!(!rebuild_result(Err(RhiError::ZeroExtent)).unwrap());
    }

    #[test]
    fn test_rebuild_failure_is_fatal() {
        assert!(rebuild_result(Ok(true)).unwrap());
        let err = rebuild_result(Err(RhiError::VulkanError(vk::Result::ERROR_INITIALIZATION_FAILED)))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
