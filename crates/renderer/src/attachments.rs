//! Depth and multisampled color targets sized to the swapchain.
//!
//! Both are device-local images recreated whenever the swapchain is. Only
//! one of each exists; every frame in flight renders into it, which the
//! render pass dependency orders.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use harness_rhi::RhiResult;
use harness_rhi::device::Device;
use harness_rhi::image::Image;
use harness_rhi::render_pass::RenderPassDesc;

/// Depth format used when depth testing is enabled.
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Converts a configured sample count to Vulkan flags.
///
/// Returns `None` unless `samples` is a power of two between 1 and 64.
pub fn sample_count_flags(samples: u32) -> Option<vk::SampleCountFlags> {
    match samples {
        1 => Some(vk::SampleCountFlags::TYPE_1),
        2 => Some(vk::SampleCountFlags::TYPE_2),
        4 => Some(vk::SampleCountFlags::TYPE_4),
        8 => Some(vk::SampleCountFlags::TYPE_8),
        16 => Some(vk::SampleCountFlags::TYPE_16),
        32 => Some(vk::SampleCountFlags::TYPE_32),
        64 => Some(vk::SampleCountFlags::TYPE_64),
        _ => None,
    }
}

/// The smaller of `requested` and `supported_max`.
pub fn clamp_samples(
    requested: vk::SampleCountFlags,
    supported_max: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    if requested.as_raw() > supported_max.as_raw() {
        supported_max
    } else {
        requested
    }
}

/// Attachments other than the swapchain image.
pub struct Attachments {
    /// Multisampled color target, resolved into the swapchain image.
    color: Option<Image>,
    depth: Option<Image>,
}

impl Attachments {
    /// Creates the images `desc` needs at `extent`.
    pub fn new(device: &Arc<Device>, desc: &RenderPassDesc, extent: vk::Extent2D) -> RhiResult<Self> {
        let color = if desc.is_multisampled() {
            Some(Image::new_attachment(
                device.clone(),
                extent,
                desc.color_format,
                desc.samples,
            )?)
        } else {
            None
        };

        let depth = desc
            .depth_format
            .map(|format| Image::new_attachment(device.clone(), extent, format, desc.samples))
            .transpose()?;

        debug!(
            "Attachments for {}x{}: color target {}, depth {}",
            extent.width,
            extent.height,
            color.is_some(),
            depth.is_some()
        );

        Ok(Self { color, depth })
    }

    #[inline]
    pub fn color_view(&self) -> Option<vk::ImageView> {
        self.color.as_ref().map(Image::view)
    }

    #[inline]
    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.depth.as_ref().map(Image::view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_depth_format() {
        assert_eq!(DEFAULT_DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_sample_count_flags() {
        assert_eq!(sample_count_flags(1), Some(vk::SampleCountFlags::TYPE_1));
        assert_eq!(sample_count_flags(4), Some(vk::SampleCountFlags::TYPE_4));
        assert_eq!(sample_count_flags(64), Some(vk::SampleCountFlags::TYPE_64));
        assert_eq!(sample_count_flags(3), None);
        assert_eq!(sample_count_flags(0), None);
    }

    #[test]
    fn test_clamp_samples() {
        assert_eq!(
            clamp_samples(vk::SampleCountFlags::TYPE_8, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            clamp_samples(vk::SampleCountFlags::TYPE_2, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_2
        );
    }
}
