//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, recreation, image acquisition
//! and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] owns the swapchain handle and one 2D view per image. The
//! images themselves belong to the swapchain and are never freed individually.
//! Creation settings are fixed:
//! - Format: the first one the surface reports
//! - Present mode: FIFO
//! - At least 3 images, clamped to the surface maximum
//! - Exclusive sharing, opaque composite alpha
//!
//! Acquire and present results are folded into [`AcquireOutcome`] and a
//! "needs recreate" flag by [`classify_acquire`] and [`classify_present`], so
//! the frame loop never matches on raw `vk::Result` codes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harness_rhi::device::Device;
//! use harness_rhi::instance::Instance;
//! use harness_rhi::physical_device::PresentTarget;
//! use harness_rhi::swapchain::{Swapchain, SwapchainDesc};
//!
//! # fn example(instance: &Instance, device: Arc<Device>, target: PresentTarget<'_>)
//! #     -> Result<(), harness_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(instance, device, target, &SwapchainDesc::default())?;
//!
//! // After a resize, once the GPU is idle:
//! swapchain.recreate(target)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image;
use crate::instance::Instance;
use crate::physical_device::PresentTarget;

/// Lower bound on the requested image count.
pub const MIN_IMAGE_COUNT: u32 = 3;

/// Sentinel extent meaning "the swapchain decides".
const UNDEFINED_EXTENT: u32 = u32::MAX;

/// Creation parameters for [`Swapchain::new`].
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    /// Image usage, normally `COLOR_ATTACHMENT`.
    pub usage: vk::ImageUsageFlags,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }
}

/// Result of an image acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready for rendering.
    Image(u32),
    /// The swapchain is out of date or suboptimal and must be rebuilt.
    Recreate,
}

/// Folds the result of `vkAcquireNextImageKHR` into an [`AcquireOutcome`].
///
/// A suboptimal image is reported as [`AcquireOutcome::Recreate`]. Any error
/// other than `ERROR_OUT_OF_DATE_KHR` is returned unchanged.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((index, false)) => Ok(AcquireOutcome::Image(index)),
        Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Recreate),
        Err(e) => Err(e.into()),
    }
}

/// Folds the result of `vkQueuePresentKHR` into "needs recreate".
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<bool> {
    match result {
        Ok(suboptimal) => Ok(suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
        Err(e) => Err(e.into()),
    }
}

/// Surface capabilities, formats and present modes.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    pub fn query(physical_device: vk::PhysicalDevice, target: PresentTarget<'_>) -> RhiResult<Self> {
        let loader = target.surface_loader;
        let capabilities = unsafe {
            loader.get_physical_device_surface_capabilities(physical_device, target.surface)?
        };
        let formats =
            unsafe { loader.get_physical_device_surface_formats(physical_device, target.surface)? };
        let present_modes = unsafe {
            loader.get_physical_device_surface_present_modes(physical_device, target.surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Extent a swapchain created now would get, or `None` while either surface
/// dimension is zero.
///
/// A cached window size can be stale when the presentation engine reports a
/// rebuild, so this asks the surface directly.
pub fn surface_extent(
    physical_device: vk::PhysicalDevice,
    target: PresentTarget<'_>,
) -> RhiResult<Option<vk::Extent2D>> {
    let capabilities = unsafe {
        target
            .surface_loader
            .get_physical_device_surface_capabilities(physical_device, target.surface)?
    };
    Ok(choose_extent(&capabilities))
}

/// Vulkan swapchain wrapper.
///
/// Not thread-safe; only the render thread touches it.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// One view per image, same order
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
}

impl Swapchain {
    /// Creates a swapchain for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The graphics queue family cannot present to the surface
    /// - The surface reports no formats
    /// - Swapchain or image view creation fails
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        target: PresentTarget<'_>,
        desc: &SwapchainDesc,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let created = create_swapchain(
            &device,
            &swapchain_loader,
            target,
            desc.usage,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain: created.swapchain,
            images: created.images,
            image_views: created.image_views,
            format: created.format.format,
            extent: created.extent,
            usage: desc.usage,
        })
    }

    /// Rebuilds the swapchain for the current surface size.
    ///
    /// The old swapchain is passed as a hint and destroyed only once the new
    /// one exists. The old swapchain is retired even if creation fails, so
    /// a failed recreate is fatal for presentation.
    ///
    /// The caller must ensure nothing referencing the old images is in
    /// flight; this waits for the device to be idle before starting.
    ///
    /// Returns [`RhiError::ZeroExtent`] without touching the old swapchain
    /// when the surface currently has a zero-sized dimension.
    pub fn recreate(&mut self, target: PresentTarget<'_>) -> RhiResult<()> {
        self.device.wait_idle()?;

        let created = create_swapchain(
            &self.device,
            &self.swapchain_loader,
            target,
            self.usage,
            self.swapchain,
        )?;

        if created.images.len() != self.images.len() || created.format.format != self.format {
            warn!(
                "Swapchain changed shape on recreate: {} -> {} images, {:?} -> {:?}",
                self.images.len(),
                created.images.len(),
                self.format,
                created.format.format
            );
        }

        self.destroy_resources();

        self.swapchain = created.swapchain;
        self.images = created.images;
        self.image_views = created.image_views;
        self.format = created.format.format;
        self.extent = created.extent;

        info!(
            "Swapchain recreated: {}x{}",
            self.extent.width, self.extent.height
        );
        Ok(())
    }

    /// Acquires the next image, signaling `semaphore` once it is available.
    ///
    /// Waits without timeout.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    ///
    /// Returns true if the swapchain should be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Destroys the views, forgets the images and destroys the swapchain.
    fn destroy_resources(&mut self) {
        for &view in &self.image_views {
            unsafe { self.device.handle().destroy_image_view(view, None) };
        }
        self.image_views.clear();
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain, None) };
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let count = self.images.len();
        self.destroy_resources();
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width, self.extent.height, count
        );
    }
}

struct CreatedSwapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

fn create_swapchain(
    device: &Device,
    loader: &ash::khr::swapchain::Device,
    target: PresentTarget<'_>,
    usage: vk::ImageUsageFlags,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<CreatedSwapchain> {
    let family = device.graphics_family();
    let supported = unsafe {
        target.surface_loader.get_physical_device_surface_support(
            device.physical_device(),
            family,
            target.surface,
        )?
    };
    if !supported {
        return Err(RhiError::PresentNotSupported(family));
    }

    let support = SwapchainSupportDetails::query(device.physical_device(), target)?;
    let surface_format = choose_surface_format(&support.formats)?;
    let extent = choose_extent(&support.capabilities).ok_or(RhiError::ZeroExtent)?;
    let image_count = choose_image_count(&support.capabilities);
    let transform = choose_transform(&support.capabilities);

    info!(
        "Creating swapchain: {}x{}, format {:?}, color space {:?}, FIFO, {} images",
        extent.width,
        extent.height,
        surface_format.format,
        surface_format.color_space,
        image_count
    );

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(target.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(usage)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(vk::PresentModeKHR::FIFO)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    let mut image_views = Vec::with_capacity(images.len());
    for (i, &image) in images.iter().enumerate() {
        match image::create_view(
            device,
            image,
            surface_format.format,
            vk::ImageAspectFlags::COLOR,
        ) {
            Ok(view) => image_views.push(view),
            Err(e) => {
                unsafe {
                    for &view in &image_views {
                        device.handle().destroy_image_view(view, None);
                    }
                    loader.destroy_swapchain(swapchain, None);
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {}",
                    i, e
                )));
            }
        }
    }

    info!("Swapchain created with {} images", images.len());

    Ok(CreatedSwapchain {
        swapchain,
        images,
        image_views,
        format: surface_format,
        extent,
    })
}

/// Takes the first format the surface reports.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    formats.first().copied().ok_or_else(|| {
        RhiError::SwapchainError("Surface reports no formats".to_string())
    })
}

/// Uses the current extent, or the maximum extent when the surface leaves it
/// undefined. `None` if the result has a zero dimension.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR) -> Option<vk::Extent2D> {
    let extent = if capabilities.current_extent.width == UNDEFINED_EXTENT {
        debug!(
            "Surface extent undefined, using maximum {}x{}",
            capabilities.max_image_extent.width, capabilities.max_image_extent.height
        );
        capabilities.max_image_extent
    } else {
        capabilities.current_extent
    };
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// `max(MIN_IMAGE_COUNT, min_image_count)`, clamped to `max_image_count`
/// when the surface sets one.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = MIN_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn choose_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_surface_format_takes_first() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(800, 600),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities), Some(extent(800, 600)));
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let minimized = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(0, 0),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(choose_extent(&minimized), None);

        let collapsed = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1280, 0),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(choose_extent(&collapsed), None);
    }

    #[test]
    fn test_undefined_extent_uses_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(2560, 1440),
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities), Some(extent(2560, 1440)));
    }

    #[test]
    fn test_image_count() {
        let with_max = |min_image_count, max_image_count| vk::SurfaceCapabilitiesKHR {
            min_image_count,
            max_image_count,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&with_max(2, 8)), 3);
        assert_eq!(choose_image_count(&with_max(2, 0)), 3);
        assert_eq!(choose_image_count(&with_max(4, 8)), 4);
        assert_eq!(choose_image_count(&with_max(1, 2)), 2);
    }

    #[test]
    fn test_transform_prefers_identity() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY
                | vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        assert_eq!(
            choose_transform(&capabilities),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );

        let rotated_only = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            current_transform: vk::SurfaceTransformFlagsKHR::ROTATE_90,
            ..Default::default()
        };
        assert_eq!(
            choose_transform(&rotated_only),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(classify_acquire(Ok((2, false))).unwrap(), AcquireOutcome::Image(2));
        assert_eq!(classify_acquire(Ok((0, true))).unwrap(), AcquireOutcome::Recreate);
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::Recreate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert!(!classify_present(Ok(false)).unwrap());
        assert!(classify_present(Ok(true)).unwrap());
        assert!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_default_desc_is_color_attachment() {
        assert_eq!(
            SwapchainDesc::default().usage,
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        );
    }
}
