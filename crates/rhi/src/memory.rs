//! Device memory type selection and raw allocation.
//!
//! Buffers and images each own exactly one `VkDeviceMemory` allocation,
//! bound at offset 0. There is no sub-allocation.

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Returns the first memory type index allowed by `type_bits` whose flags
/// contain all of `required`.
///
/// The scan is in index order and the first match wins; no preference is
/// given among equally valid types.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
}

/// Allocates memory for `requirements` from a type with `properties`.
///
/// Returns the allocation and the memory type index it came from.
pub(crate) fn allocate(
    device: &Device,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> RhiResult<(vk::DeviceMemory, u32)> {
    let memory_type_index = device.find_memory_type(requirements.memory_type_bits, properties)?;

    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.handle().allocate_memory(&allocate_info, None)? };
    debug!(
        "Allocated {} bytes from memory type {} ({:?})",
        requirements.size, memory_type_index, properties
    );
    Ok((memory, memory_type_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn test_first_matching_type_wins() {
        let props = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST,
            HOST | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&props, 0b111, HOST), Some(1));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn test_respects_type_bits() {
        let props = properties(&[HOST, HOST, vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(find_memory_type(&props, 0b010, HOST), Some(1));
        assert_eq!(find_memory_type(&props, 0b100, HOST), None);
    }

    #[test]
    fn test_superset_matches() {
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL | HOST]);
        assert_eq!(
            find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(0)
        );
    }

    #[test]
    fn test_ignores_types_past_count() {
        let mut props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = HOST;
        assert_eq!(find_memory_type(&props, u32::MAX, HOST), None);
    }

    #[test]
    fn test_empty_requirement_matches_first_allowed() {
        let props = properties(&[HOST, vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::empty()),
            Some(1)
        );
    }
}
