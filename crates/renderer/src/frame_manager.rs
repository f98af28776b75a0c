//! Per-frame command and synchronization resources.
//!
//! Each frame in flight owns one [`FrameSlot`]:
//!
//! ```text
//! 1. Wait on in_flight (CPU waits for the previous use of this slot)
//! 2. Acquire a swapchain image (signals image_available)
//! 3. Reset in_flight and the command pool, record the command buffer
//! 4. Submit:
//!    - wait on image_available at COLOR_ATTACHMENT_OUTPUT
//!    - signal render_finished
//!    - signal in_flight
//! 5. Present (waits on render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use harness_rhi::RhiResult;
use harness_rhi::command::{CommandBuffer, CommandPool};
use harness_rhi::device::Device;
use harness_rhi::sync::{Fence, Semaphore};

use crate::frame::FrameRing;

/// Resources owned by one frame in flight.
///
/// `in_flight` is signaled exactly when the command buffer may be
/// re-recorded. It is created signaled so the first wait returns at once.
pub struct FrameSlot {
    /// Primary command buffer, freed with `command_pool`.
    command_buffer: CommandBuffer,
    /// Transient pool reset as a whole every frame.
    command_pool: CommandPool,
    /// Signaled when a swapchain image is available.
    image_available: Semaphore,
    /// Signaled when this slot's rendering has finished.
    render_finished: Semaphore,
    /// Signaled when the slot's last submission completed.
    in_flight: Fence,
}

impl FrameSlot {
    /// Creates the resources for one slot.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            command_pool,
            image_available,
            render_finished,
            in_flight,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Blocks until the slot's previous submission has completed.
    pub fn wait(&self) -> RhiResult<()> {
        self.in_flight.wait(u64::MAX)
    }

    /// Resets the fence and the command pool.
    ///
    /// Only valid after [`Self::wait`] returned for the current frame.
    pub fn reset(&self) -> RhiResult<()> {
        self.in_flight.reset()?;
        self.command_pool.reset()
    }

    /// Submits the recorded command buffer, waiting for `image_available`
    /// and signaling `render_finished` and the fence.
    pub fn submit(&self, device: &Device) -> RhiResult<()> {
        let wait_semaphores = [self.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_finished.handle()];
        let command_buffers = [self.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { device.submit_graphics(&[submit_info], self.in_flight.handle()) }
    }

    /// Replaces both semaphores.
    ///
    /// An acquire that reported a suboptimal swapchain still signals
    /// `image_available`, and an abandoned frame may leave it signaled with
    /// no waiter. Fresh semaphores are the only way back to a known state.
    /// The device must be idle.
    ///
    /// Limitation: a device-idle wait does not cover a signal the
    /// presentation engine may still owe `image_available` after a
    /// suboptimal acquire, so the old semaphore can be destroyed with that
    /// signal pending. Callers renew only after a swapchain rebuild.
    pub fn renew_semaphores(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.image_available = Semaphore::new(device.clone())?;
        self.render_finished = Semaphore::new(device.clone())?;
        Ok(())
    }

    /// Restores the slot after a frame was abandoned between fence reset
    /// and submission: a signaled fence and fresh semaphores.
    /// The device must be idle.
    pub fn restore(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        self.in_flight = Fence::new(device.clone(), true)?;
        self.renew_semaphores(device)
    }
}

/// Creates `count` frame slots.
pub fn create_frame_slots(device: &Arc<Device>, count: usize) -> RhiResult<FrameRing<FrameSlot>> {
    let ring = FrameRing::try_from_fn(count, |index| {
        let slot = FrameSlot::new(device.clone())?;
        debug!("Created frame slot {}", index);
        Ok::<_, harness_rhi::RhiError>(slot)
    })?;

    let ring = ring.ok_or_else(|| {
        harness_rhi::RhiError::InvalidHandle("At least one frame in flight is required".to_string())
    })?;

    info!("Created {} frame slot(s)", ring.len());
    Ok(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
