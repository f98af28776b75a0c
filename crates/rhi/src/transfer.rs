//! One-shot command submission for setup-time transfers.
//!
//! Uploads are rare (setup and resize only), so each one records into a
//! fresh transient pool, submits without a fence and waits for the whole
//! queue to drain. Nothing it touched is in flight when it returns.

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::RhiResult;

/// Records the commands issued by `record` and executes them synchronously.
///
/// The command pool is destroyed before returning.
pub fn submit_once<F>(device: &Arc<Device>, record: F) -> RhiResult<()>
where
    F: FnOnce(&CommandBuffer),
{
    let pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;
    let cmd = CommandBuffer::new(device.clone(), &pool)?;

    cmd.begin()?;
    record(&cmd);
    cmd.end()?;

    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    unsafe { device.submit_graphics(&[submit_info], vk::Fence::null())? };
    device.queue_wait_idle()?;

    trace!("One-shot submission completed");
    Ok(())
}

/// A single copy region covering `size` bytes at offset 0 on both sides.
pub fn whole_buffer_copy(size: vk::DeviceSize) -> vk::BufferCopy {
    vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    }
}

/// A copy region covering a whole tightly packed 2D color image.
pub fn whole_image_copy(width: u32, height: u32) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    }
}
