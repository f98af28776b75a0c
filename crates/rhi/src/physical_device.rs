//! Physical device (GPU) selection.
//!
//! Selection is deliberately simple: the first device in enumeration order
//! is used, with no scoring of discrete vs. integrated GPUs. Every device
//! found is logged so a wrong pick is visible in the output.
//!
//! # Example
//!
//! ```no_run
//! use harness_rhi::instance::{Instance, InstanceDesc};
//! use harness_rhi::physical_device::select_physical_device;
//!
//! # fn example() -> harness_rhi::RhiResult<()> {
//! let instance = Instance::new(&InstanceDesc::default())?;
//! let info = select_physical_device(instance.handle(), None)?;
//! println!("Selected GPU: {}", info.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{info, warn};

use crate::error::RhiError;

/// A surface the selected queue family must be able to present to.
#[derive(Clone, Copy)]
pub struct PresentTarget<'a> {
    pub surface_loader: &'a ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and memory types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// The single queue family used for graphics, transfer and present.
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        device_name(&self.properties)
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Maximum sample count usable for both color and depth attachments.
    pub fn max_sample_count(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        let counts =
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        [
            vk::SampleCountFlags::TYPE_64,
            vk::SampleCountFlags::TYPE_32,
            vk::SampleCountFlags::TYPE_16,
            vk::SampleCountFlags::TYPE_8,
            vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_2,
        ]
        .into_iter()
        .find(|&c| counts.contains(c))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("graphics_family", &self.graphics_family)
            .finish()
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> &str {
    unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown Device")
    }
}

/// Selects the first enumerated physical device.
///
/// When `present` is given, the chosen queue family must also be able to
/// present to that surface.
///
/// # Errors
///
/// - [`RhiError::NoSuitableGpu`] if no device is enumerated
/// - [`RhiError::NoGraphicsQueue`] if the first device has no usable family
pub fn select_physical_device(
    instance: &ash::Instance,
    present: Option<PresentTarget<'_>>,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let Some(&device) = devices.first() else {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    };

    info!("Found {} GPU(s)", devices.len());
    for (index, &candidate) in devices.iter().enumerate() {
        let properties = unsafe { instance.get_physical_device_properties(candidate) };
        info!("  [{}] {}", index, device_name(&properties));
    }

    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    for (index, (size_mib, device_local)) in heap_summary(&memory_properties).iter().enumerate() {
        info!(
            "  heap {}: {} MiB{}",
            index,
            size_mib,
            if *device_local { " (device local)" } else { "" }
        );
    }

    let graphics_family = find_graphics_family(&families, |index| match present {
        Some(target) => unsafe {
            target
                .surface_loader
                .get_physical_device_surface_support(device, index, target.surface)
                .unwrap_or_else(|e| {
                    warn!("Surface support query failed for family {}: {}", index, e);
                    false
                })
        },
        None => true,
    })
    .ok_or(RhiError::NoGraphicsQueue)?;

    let info = PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        graphics_family,
    };

    let (major, minor, patch) = info.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, queue family {}",
        info.device_name(),
        info.device_type_name(),
        major,
        minor,
        patch,
        graphics_family
    );

    Ok(info)
}

/// Returns the first queue family with graphics support, at least one
/// queue, and for which `supports_present` holds.
pub fn find_graphics_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(index, _)| index as u32)
        .find(|&index| supports_present(index))
}

/// `(size in MiB, device local)` for each memory heap.
pub fn heap_summary(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> Vec<(u64, bool)> {
    memory_properties
        .memory_heaps
        .iter()
        .take(memory_properties.memory_heap_count as usize)
        .map(|heap| {
            (
                heap.size / (1024 * 1024),
                heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS, 4),
        ];
        assert_eq!(find_graphics_family(&families, |_| true), Some(1));
    }

    #[test]
    fn test_family_without_queues_is_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(find_graphics_family(&families, |_| true), Some(1));
    }

    #[test]
    fn test_present_support_is_required() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(find_graphics_family(&families, |i| i == 1), Some(1));
        assert_eq!(find_graphics_family(&families, |_| false), None);
    }

    #[test]
    fn test_no_graphics_family() {
        let families = [family(vk::QueueFlags::TRANSFER, 2)];
        assert_eq!(find_graphics_family(&families, |_| true), None);
        assert_eq!(find_graphics_family(&[], |_| true), None);
    }

    #[test]
    fn test_heap_summary() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        props.memory_heaps[0] = vk::MemoryHeap {
            size: 8 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        props.memory_heaps[1] = vk::MemoryHeap {
            size: 256 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        // Heaps past memory_heap_count are ignored.
        props.memory_heaps[2] = vk::MemoryHeap {
            size: 1,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        assert_eq!(heap_summary(&props), vec![(8192, true), (256, false)]);
    }
}
