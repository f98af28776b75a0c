//! Texture sampler.
//!
//! A sampler encodes filtering and addressing independently of any image,
//! so one sampler serves every texture view.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Nearest texel lookup, linear between mip levels, edges clamped.
pub fn nearest_clamp_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
}

/// An owned `VkSampler`.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    pub fn new(device: Arc<Device>, create_info: &vk::SamplerCreateInfo<'_>) -> RhiResult<Self> {
        let sampler = unsafe { device.handle().create_sampler(create_info, None)? };
        debug!(
            "Created sampler (min {:?}, mag {:?}, {:?})",
            create_info.min_filter, create_info.mag_filter, create_info.address_mode_u
        );
        Ok(Self { device, sampler })
    }

    /// Sampler from [`nearest_clamp_info`].
    pub fn nearest_clamp(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(device, &nearest_clamp_info())
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
        debug!("Destroyed sampler");
    }
}
