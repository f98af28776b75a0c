//! GPU buffers backed by a dedicated memory allocation.
//!
//! # Overview
//!
//! - [`BufferUsage`] presets the usage and memory flags of common buffers
//! - [`Buffer`] owns a `VkBuffer` and the one `VkDeviceMemory` bound to it
//!
//! Device-local buffers are filled through [`Buffer::upload`], which copies
//! the data into a temporary host-visible staging buffer and blocks until a
//! one-shot transfer has completed on the graphics queue.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use harness_rhi::device::Device;
//! use harness_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), harness_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let vertex_buffer = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Vertex,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;
use crate::transfer;

/// Buffer usage preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex buffer, filled by upload
    Vertex,
    /// Device-local index buffer, filled by upload
    Index,
    /// Host-visible source of a transfer
    Staging,
    /// Host-visible destination of a transfer, for reading results back
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Memory properties requested for this preset.
    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Staging | BufferUsage::Readback => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// A buffer and its exclusively owned memory.
///
/// Dropping destroys the buffer handle first and frees the memory after it.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Dedicated allocation bound at offset 0.
    memory: vk::DeviceMemory,
    /// Requested size in bytes.
    size: vk::DeviceSize,
    /// Size the driver reported for the allocation.
    allocation_size: vk::DeviceSize,
    /// Memory type the allocation came from.
    memory_type_index: u32,
    /// Properties requested at creation.
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates a buffer of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `size` is zero
    /// - No memory type satisfies `properties`
    /// - Buffer creation, allocation or binding fails
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let bound = memory::allocate(&device, requirements, properties).and_then(
            |(memory, memory_type_index)| {
                if let Err(e) = unsafe { device.handle().bind_buffer_memory(buffer, memory, 0) } {
                    unsafe { device.handle().free_memory(memory, None) };
                    return Err(e.into());
                }
                Ok((memory, memory_type_index))
            },
        );

        let (memory, memory_type_index) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!(
            "Created buffer: {} bytes, usage {:?}, memory {:?}",
            size, usage, properties
        );

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            allocation_size: requirements.size,
            memory_type_index,
            properties,
        })
    }

    /// Creates a buffer from a usage preset.
    pub fn with_usage(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<Self> {
        let buffer = Self::new(device, size, usage.to_vk_usage(), usage.memory_properties())?;
        debug!("Buffer is a {} buffer", usage.name());
        Ok(buffer)
    }

    /// Creates a host-visible staging buffer holding a copy of `data`.
    pub fn staging(device: Arc<Device>, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::with_usage(device, BufferUsage::Staging, data.len() as vk::DeviceSize)?;
        buffer.write_mapped(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and uploads `data` into it.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the upload fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::with_usage(device, usage, data.len() as vk::DeviceSize)?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    /// Copies `data` into this buffer through a staging buffer.
    ///
    /// Blocks until the graphics queue is idle, so the data is visible to any
    /// later submission. The buffer needs `TRANSFER_DST` usage.
    pub fn upload(&self, data: &[u8]) -> RhiResult<()> {
        let size = data.len() as vk::DeviceSize;
        if size > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Upload exceeds buffer size: data {} > buffer {}",
                size, self.size
            )));
        }
        if size == 0 {
            return Ok(());
        }

        let staging = Self::staging(self.device.clone(), data)?;
        transfer::submit_once(&self.device, |cmd| {
            cmd.copy_buffer(
                staging.handle(),
                self.buffer,
                &[transfer::whole_buffer_copy(size)],
            );
        })?;

        debug!("Uploaded {} bytes through staging", size);
        Ok(())
    }

    /// Writes data through a host mapping of the memory.
    ///
    /// The buffer must have been created with `HOST_VISIBLE | HOST_COHERENT`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The memory is not host visible
    /// - The write would exceed the buffer size
    pub fn write_mapped(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_mappable(offset, data.len() as vk::DeviceSize, "Write")?;

        unsafe {
            let ptr = self.device.handle().map_memory(
                self.memory,
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.handle().unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Reads `len` bytes starting at `offset` through a host mapping.
    pub fn read_mapped(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        self.check_mappable(offset, len as vk::DeviceSize, "Read")?;

        let mut out = vec![0u8; len];
        unsafe {
            let ptr = self.device.handle().map_memory(
                self.memory,
                offset,
                len as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.handle().unmap_memory(self.memory);
        }
        Ok(out)
    }

    fn check_mappable(
        &self,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
        what: &str,
    ) -> RhiResult<()> {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        if !self.properties.contains(host) {
            return Err(RhiError::InvalidHandle(format!(
                "{} needs host-visible coherent memory, buffer has {:?}",
                what, self.properties
            )));
        }
        if offset + len > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "{} exceeds buffer size: offset {} + data {} > buffer {}",
                what, offset, len, self.size
            )));
        }
        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the requested size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Size of the backing allocation, at least [`Buffer::size`].
    #[inline]
    pub fn allocation_size(&self) -> vk::DeviceSize {
        self.allocation_size
    }

    /// Flags of the memory type actually bound.
    pub fn memory_flags(&self) -> vk::MemoryPropertyFlags {
        self.device.memory_properties().memory_types[self.memory_type_index as usize]
            .property_flags
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!("Buffer destroyed ({} bytes)", self.size);
    }
}
