//! 2D images backed by a dedicated device-local allocation.
//!
//! An [`Image`] always carries a matching 2D view (one mip level, one array
//! layer). Sampled images start in `UNDEFINED` and reach their final layout
//! only through explicit barriers recorded by [`Image::upload`]:
//!
//! 1. `UNDEFINED -> TRANSFER_DST_OPTIMAL` before the copy
//! 2. `TRANSFER_DST_OPTIMAL -> final` after the copy, made visible to the
//!    caller's access mask and pipeline stage
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harness_rhi::device::Device;
//! use harness_rhi::image::Image;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, pixels: &[u8]) -> Result<(), harness_rhi::RhiError> {
//! let texture = Image::new(device, 4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED)?;
//! texture.upload(
//!     pixels,
//!     vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
//!     vk::AccessFlags::SHADER_READ,
//!     vk::PipelineStageFlags::FRAGMENT_SHADER,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;
use crate::transfer;

/// One image layout transition: layouts, access scopes and stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Builds the barrier for the first mip level and layer of `image`.
    pub fn barrier(
        &self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
    ) -> vk::ImageMemoryBarrier<'static> {
        vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(single_subresource(aspect_mask))
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
    }

    /// Records this transition into `cmd`.
    pub fn record(
        &self,
        cmd: &crate::command::CommandBuffer,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
    ) {
        cmd.pipeline_barrier(
            self.src_stage,
            self.dst_stage,
            &[self.barrier(image, aspect_mask)],
        );
    }
}

/// The two transitions bracketing a staging copy into an image.
///
/// The first has no source dependency since the previous contents are
/// discarded. The second makes the transfer write visible to `final_access`
/// at `final_stage`.
pub fn upload_barriers(
    final_layout: vk::ImageLayout,
    final_access: vk::AccessFlags,
    final_stage: vk::PipelineStageFlags,
) -> [LayoutTransition; 2] {
    [
        LayoutTransition {
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: final_layout,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: final_access,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: final_stage,
        },
    ]
}

/// Transitions around copying an image out to a buffer, returning it to
/// `layout` afterwards.
pub fn readback_barriers(
    layout: vk::ImageLayout,
    access: vk::AccessFlags,
    stage: vk::PipelineStageFlags,
) -> [LayoutTransition; 2] {
    [
        LayoutTransition {
            old_layout: layout,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_access: access,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: stage,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        LayoutTransition {
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: layout,
            src_access: vk::AccessFlags::empty(),
            dst_access: access,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: stage,
        },
    ]
}

/// Bytes per texel for the uncompressed formats the harness uploads.
pub fn texel_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => Some(1),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

fn single_subresource(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Creates a 2D view of the first mip level and layer of `image`.
pub fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(single_subresource(aspect_mask));

    Ok(unsafe { device.handle().create_image_view(&view_info, None)? })
}

/// View aspect for an attachment of `format`.
pub fn attachment_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Parameters for [`Image::with_desc`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// A device-local image, its view and its memory.
///
/// # Resource Destruction
///
/// Resources are destroyed in the following order:
/// 1. Image view
/// 2. Image
/// 3. Memory allocation
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// 2D view matching the image.
    view: vk::ImageView,
    /// Dedicated allocation bound at offset 0.
    memory: vk::DeviceMemory,
    extent: vk::Extent2D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
}

impl Image {
    /// Creates a single-sampled color image.
    ///
    /// `TRANSFER_DST` is added to `usage` so the image can be uploaded to.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A dimension is zero
    /// - Image creation fails
    /// - No device-local memory type fits the image
    /// - View creation fails
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        Self::with_desc(
            device,
            &ImageDesc {
                extent: vk::Extent2D { width, height },
                format,
                usage: usage | vk::ImageUsageFlags::TRANSFER_DST,
                samples: vk::SampleCountFlags::TYPE_1,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )
    }

    /// Creates a render target: a depth buffer or a multisampled color
    /// attachment. The view aspect follows from `format`.
    pub fn new_attachment(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let aspect = attachment_aspect(format);
        let usage = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
        };
        Self::with_desc(
            device,
            &ImageDesc {
                extent,
                format,
                usage,
                samples,
                aspect,
            },
        )
    }

    /// Creates an image from a full description.
    pub fn with_desc(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        let vk::Extent2D { width, height } = desc.extent;
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = device.handle();
        let image = unsafe { handle.create_image(&image_info, None)? };
        let requirements = unsafe { handle.get_image_memory_requirements(image) };

        let memory = match memory::allocate(&device, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
            Ok((memory, _)) => memory,
            Err(e) => {
                unsafe { handle.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe { handle.bind_image_memory(image, memory, 0) }
            .map_err(RhiError::from)
            .and_then(|()| create_view(&device, image, desc.format, desc.aspect));
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    handle.destroy_image(image, None);
                    handle.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        debug!(
            "Created image {}x{} {:?} ({:?}, {:?})",
            width, height, desc.format, desc.usage, desc.samples
        );

        Ok(Self {
            device,
            image,
            view,
            memory,
            extent: desc.extent,
            format: desc.format,
            aspect: desc.aspect,
        })
    }

    /// Copies tightly packed texel data into the image through a staging
    /// buffer and leaves it in `final_layout`.
    ///
    /// Blocks until the transfer has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the data size does not match the image, or if the
    /// staging buffer or submission fails.
    pub fn upload(
        &self,
        data: &[u8],
        final_layout: vk::ImageLayout,
        final_access: vk::AccessFlags,
        final_stage: vk::PipelineStageFlags,
    ) -> RhiResult<()> {
        self.check_data_len(data.len())?;

        let staging = Buffer::staging(self.device.clone(), data)?;
        let [to_transfer, to_final] = upload_barriers(final_layout, final_access, final_stage);

        transfer::submit_once(&self.device, |cmd| {
            to_transfer.record(cmd, self.image, self.aspect);
            cmd.copy_buffer_to_image(
                staging.handle(),
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[transfer::whole_image_copy(self.extent.width, self.extent.height)],
            );
            to_final.record(cmd, self.image, self.aspect);
        })?;

        info!(
            "Uploaded {}x{} image ({} bytes), now {:?}",
            self.extent.width,
            self.extent.height,
            data.len(),
            final_layout
        );
        Ok(())
    }

    /// Reads the image contents back into host memory.
    ///
    /// The image must currently be in `layout` (reached through `access` at
    /// `stage`) and have `TRANSFER_SRC` usage. It is returned to `layout`.
    pub fn download(
        &self,
        layout: vk::ImageLayout,
        access: vk::AccessFlags,
        stage: vk::PipelineStageFlags,
    ) -> RhiResult<Vec<u8>> {
        let len = self.byte_len()?;
        let readback = Buffer::with_usage(
            self.device.clone(),
            BufferUsage::Readback,
            len as vk::DeviceSize,
        )?;
        let [to_source, back] = readback_barriers(layout, access, stage);

        transfer::submit_once(&self.device, |cmd| {
            to_source.record(cmd, self.image, self.aspect);
            cmd.copy_image_to_buffer(
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.handle(),
                &[transfer::whole_image_copy(self.extent.width, self.extent.height)],
            );
            back.record(cmd, self.image, self.aspect);
        })?;

        readback.read_mapped(0, len)
    }

    fn byte_len(&self) -> RhiResult<usize> {
        let texel = texel_size(self.format).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No host copy support for {:?}", self.format))
        })?;
        Ok(self.extent.width as usize * self.extent.height as usize * texel as usize)
    }

    fn check_data_len(&self, len: usize) -> RhiResult<()> {
        let expected = self.byte_len()?;
        if len != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Image data is {} bytes, {}x{} {:?} needs {}",
                len, self.extent.width, self.extent.height, self.format, expected
            )));
        }
        Ok(())
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            let handle = self.device.handle();
            handle.destroy_image_view(self.view, None);
            handle.destroy_image(self.image, None);
            handle.free_memory(self.memory, None);
        }
        debug!(
            "Image destroyed ({}x{} {:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}
