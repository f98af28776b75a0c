//! Everything sized by the swapchain: the swapchain itself, the render pass,
//! extra attachments and one framebuffer per swapchain image.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use harness_rhi::device::Device;
use harness_rhi::instance::Instance;
use harness_rhi::physical_device::PresentTarget;
use harness_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use harness_rhi::swapchain::{Swapchain, SwapchainDesc, surface_extent};
use harness_rhi::{RhiError, RhiResult};

use crate::attachments::Attachments;

/// Depth and sample settings; the color format comes from the swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetConfig {
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
}

impl TargetConfig {
    pub fn pass_desc(&self, color_format: vk::Format) -> RenderPassDesc {
        RenderPassDesc {
            color_format,
            depth_format: self.depth_format,
            samples: self.samples,
            output_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// Swapchain-dependent objects, rebuilt together.
///
/// Fields drop in declaration order: framebuffers, attachments, render pass,
/// swapchain.
pub struct RenderTargets {
    framebuffers: Vec<Framebuffer>,
    attachments: Attachments,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    config: TargetConfig,
}

impl RenderTargets {
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        target: PresentTarget<'_>,
        config: TargetConfig,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), target, &SwapchainDesc::default())?;
        let render_pass = RenderPass::new(device.clone(), &config.pass_desc(swapchain.format()))?;
        let attachments = Attachments::new(&device, render_pass.desc(), swapchain.extent())?;
        let framebuffers = build_framebuffers(&device, &swapchain, &render_pass, &attachments)?;

        info!(
            "Render targets ready: {} framebuffers at {}x{}",
            framebuffers.len(),
            swapchain.extent().width,
            swapchain.extent().height
        );

        Ok(Self {
            framebuffers,
            attachments,
            render_pass,
            swapchain,
            device,
            config,
        })
    }

    /// Rebuilds the swapchain, render pass, attachments and framebuffers.
    ///
    /// Returns `Ok(false)` and leaves everything in place while the surface
    /// has a zero-sized dimension. Otherwise waits for the device to be idle
    /// and rebuilds. On failure the targets are unusable.
    pub fn recreate(&mut self, target: PresentTarget<'_>) -> RhiResult<bool> {
        if surface_extent(self.device.physical_device(), target)?.is_none() {
            debug!("Surface extent is zero, keeping current targets");
            return Ok(false);
        }
        self.device.wait_idle()?;

        // Framebuffers reference the old views.
        self.framebuffers.clear();
        self.swapchain.recreate(target)?;

        self.render_pass = RenderPass::new(
            self.device.clone(),
            &self.config.pass_desc(self.swapchain.format()),
        )?;
        self.attachments = Attachments::new(
            &self.device,
            self.render_pass.desc(),
            self.swapchain.extent(),
        )?;
        self.framebuffers = build_framebuffers(
            &self.device,
            &self.swapchain,
            &self.render_pass,
            &self.attachments,
        )?;

        debug!(
            "Rebuilt {} framebuffers at {}x{}",
            self.framebuffers.len(),
            self.extent().width,
            self.extent().height
        );
        Ok(true)
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Framebuffer for swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> RhiResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "No framebuffer for swapchain image {}",
                    image_index
                ))
            })
    }
}

fn build_framebuffers(
    device: &Arc<Device>,
    swapchain: &Swapchain,
    render_pass: &RenderPass,
    attachments: &Attachments,
) -> RhiResult<Vec<Framebuffer>> {
    swapchain
        .image_views()
        .iter()
        .map(|&view| {
            let views = render_pass.desc().framebuffer_views(
                view,
                attachments.color_view(),
                attachments.depth_view(),
            )?;
            Framebuffer::new(device.clone(), render_pass, &views, swapchain.extent())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_desc_takes_swapchain_format() {
        let config = TargetConfig {
            depth_format: Some(vk::Format::D32_SFLOAT),
            samples: vk::SampleCountFlags::TYPE_4,
        };
        let desc = config.pass_desc(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(desc.color_format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(desc.depth_format, Some(vk::Format::D32_SFLOAT));
        assert!(desc.is_multisampled());
    }
}
