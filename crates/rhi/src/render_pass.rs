//! Render pass and framebuffer construction.
//!
//! A [`RenderPassDesc`] describes the single subpass the harness renders
//! with. Attachments are laid out in a fixed order:
//!
//! | index | attachment | present when |
//! |-------|------------|--------------|
//! | 0 | color (the swapchain image, or a multisampled target) | always |
//! | 1 | depth | `depth_format` is set |
//! | last | resolve into the swapchain image | `samples > 1` |
//!
//! Framebuffers must be given views in that same order, see
//! [`RenderPassDesc::framebuffer_views`].

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth cleared to the far plane of a reversed-Z projection.
pub const REVERSED_Z_CLEAR_DEPTH: f32 = 0.0;

/// Attachment layout of the one-subpass render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Swapchain format, also used for the multisampled color target.
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
    /// Layout the single-sampled output is left in: `PRESENT_SRC_KHR` for
    /// a swapchain image, `TRANSFER_SRC_OPTIMAL` for an offscreen readback.
    pub output_layout: vk::ImageLayout,
}

impl RenderPassDesc {
    /// Color-only, single-sampled pass into a swapchain image.
    pub fn color_only(color_format: vk::Format) -> Self {
        Self {
            color_format,
            depth_format: None,
            samples: vk::SampleCountFlags::TYPE_1,
            output_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Color-only, single-sampled pass whose output is copied out afterwards.
    pub fn offscreen(color_format: vk::Format) -> Self {
        Self {
            output_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ..Self::color_only(color_format)
        }
    }

    #[inline]
    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }

    /// Index of the depth attachment, if any.
    pub fn depth_index(&self) -> Option<u32> {
        self.depth_format.map(|_| 1)
    }

    /// Index of the resolve attachment, if any.
    pub fn resolve_index(&self) -> Option<u32> {
        self.is_multisampled()
            .then(|| 1 + u32::from(self.depth_format.is_some()))
    }

    /// Attachment descriptions in framebuffer order.
    pub fn attachment_descriptions(&self) -> Vec<vk::AttachmentDescription> {
        let multisampled = self.is_multisampled();
        let mut attachments = Vec::with_capacity(3);

        attachments.push(
            vk::AttachmentDescription::default()
                .format(self.color_format)
                .samples(self.samples)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(if multisampled {
                    vk::AttachmentStoreOp::DONT_CARE
                } else {
                    vk::AttachmentStoreOp::STORE
                })
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(if multisampled {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                } else {
                    self.output_layout
                }),
        );

        if let Some(depth_format) = self.depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(depth_format)
                    .samples(self.samples)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }

        if multisampled {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(self.color_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(self.output_layout),
            );
        }

        attachments
    }

    /// Dependency from previous work on the attachments into subpass 0.
    pub fn subpass_dependency(&self) -> vk::SubpassDependency {
        let mut src_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let mut dst_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let mut src_access = vk::AccessFlags::empty();
        let mut dst_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;

        if self.depth_format.is_some() {
            // The depth image is shared by every frame in flight
            src_stage |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            dst_stage |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
            src_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
            dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }

        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(src_stage)
            .dst_stage_mask(dst_stage)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
    }

    /// Clear values indexed like the attachments.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        let color = vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        };
        let mut values = vec![color];
        if self.depth_format.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: REVERSED_Z_CLEAR_DEPTH,
                    stencil: 0,
                },
            });
        }
        if self.is_multisampled() {
            values.push(color);
        }
        values
    }

    /// Orders framebuffer views to match [`Self::attachment_descriptions`].
    ///
    /// # Errors
    ///
    /// Returns an error if a view the pass needs is missing.
    pub fn framebuffer_views(
        &self,
        swapchain_view: vk::ImageView,
        msaa_color_view: Option<vk::ImageView>,
        depth_view: Option<vk::ImageView>,
    ) -> RhiResult<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(3);

        if self.is_multisampled() {
            views.push(msaa_color_view.ok_or_else(|| {
                RhiError::InvalidHandle("Multisampled pass needs a color target view".to_string())
            })?);
        } else {
            views.push(swapchain_view);
        }

        if self.depth_format.is_some() {
            views.push(depth_view.ok_or_else(|| {
                RhiError::InvalidHandle("Depth pass needs a depth view".to_string())
            })?);
        }

        if self.is_multisampled() {
            views.push(swapchain_view);
        }

        Ok(views)
    }
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    /// Creates the single-subpass render pass described by `desc`.
    pub fn new(device: Arc<Device>, desc: &RenderPassDesc) -> RhiResult<Self> {
        let attachments = desc.attachment_descriptions();

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = desc.depth_index().map(|attachment| vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        let resolve_refs: Vec<vk::AttachmentReference> = desc
            .resolve_index()
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .into_iter()
            .collect();

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        let subpasses = [subpass];
        let dependencies = [desc.subpass_dependency()];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: {:?}, depth {:?}, {:?}",
            desc.color_format, desc.depth_format, desc.samples
        );

        Ok(Self {
            device,
            render_pass,
            desc: *desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// Framebuffer bound to one swapchain image.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
        debug!(
            "Framebuffer created: {}x{}, {} attachment(s)",
            extent.width,
            extent.height,
            views.len()
        );

        Ok(Self {
            device,
            framebuffer,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_UNORM;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn test_color_only_pass() {
        let desc = RenderPassDesc::color_only(COLOR);
        let attachments = desc.attachment_descriptions();
        assert_eq!(attachments.len(), 1);

        let color = attachments[0];
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(desc.depth_index(), None);
        assert_eq!(desc.resolve_index(), None);
        assert_eq!(desc.clear_values([0.0; 4]).len(), 1);
    }

    #[test]
    fn test_offscreen_pass_ends_ready_for_copy() {
        let desc = RenderPassDesc::offscreen(COLOR);
        let attachments = desc.attachment_descriptions();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            attachments[0].final_layout,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL
        );
    }

    #[test]
    fn test_depth_attachment() {
        let desc = RenderPassDesc {
            depth_format: Some(DEPTH),
            ..RenderPassDesc::color_only(COLOR)
        };
        let attachments = desc.attachment_descriptions();
        assert_eq!(attachments.len(), 2);
        assert_eq!(desc.depth_index(), Some(1));

        let depth = attachments[1];
        assert_eq!(depth.format, DEPTH);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        let clears = desc.clear_values([1.0; 4]);
        assert_eq!(unsafe { clears[1].depth_stencil.depth }, REVERSED_Z_CLEAR_DEPTH);
    }

    #[test]
    fn test_multisampled_pass_resolves_to_present() {
        let desc = RenderPassDesc {
            color_format: COLOR,
            depth_format: Some(DEPTH),
            samples: vk::SampleCountFlags::TYPE_4,
            output_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        let attachments = desc.attachment_descriptions();
        assert_eq!(attachments.len(), 3);
        assert_eq!(desc.resolve_index(), Some(2));

        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            attachments[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(desc.clear_values([0.0; 4]).len(), 3);
    }

    #[test]
    fn test_framebuffer_view_order() {
        let swapchain = vk::ImageView::from_raw(1);
        let msaa = vk::ImageView::from_raw(2);
        let depth = vk::ImageView::from_raw(3);

        let plain = RenderPassDesc::color_only(COLOR);
        assert_eq!(
            plain.framebuffer_views(swapchain, None, None).unwrap(),
            vec![swapchain]
        );

        let full = RenderPassDesc {
            color_format: COLOR,
            depth_format: Some(DEPTH),
            samples: vk::SampleCountFlags::TYPE_2,
            output_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        assert_eq!(
            full.framebuffer_views(swapchain, Some(msaa), Some(depth)).unwrap(),
            vec![msaa, depth, swapchain]
        );
        assert!(full.framebuffer_views(swapchain, None, Some(depth)).is_err());
    }

    #[test]
    fn test_subpass_dependency_covers_depth() {
        let plain = RenderPassDesc::color_only(COLOR).subpass_dependency();
        assert_eq!(plain.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(
            plain.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );

        let with_depth = RenderPassDesc {
            depth_format: Some(DEPTH),
            ..RenderPassDesc::color_only(COLOR)
        }
        .subpass_dependency();
        assert!(with_depth
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(with_depth
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }
}
