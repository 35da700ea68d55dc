//! Buffer management
//!
//! [`Buffer`] owns a `vk::Buffer` and its memory and lays out
//! `instance_count` instances, each padded to the device's minimum offset
//! alignment, so per-instance writes, flushes and descriptor ranges can be
//! addressed by index.

use ash::{vk, Device};
use bytemuck::Pod;
use std::ffi::c_void;
use std::marker::PhantomData;

use super::{VulkanContext, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<*mut c_void>,
    buffer_size: vk::DeviceSize,
    instance_count: u32,
    instance_size: vk::DeviceSize,
    alignment_size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer holding `instance_count` aligned instances
    pub fn new(
        context: &VulkanContext,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(VulkanError::invalid("Buffer must hold at least one non-empty instance"));
        }

        let alignment_size = Self::alignment(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * instance_count as vk::DeviceSize;
        let device = context.device().clone();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(buffer_size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match context
            .find_memory_type(mem_requirements.memory_type_bits, properties)
            .and_then(|memory_type_index| {
                let alloc_info = vk::MemoryAllocateInfo::builder()
                    .allocation_size(mem_requirements.size)
                    .memory_type_index(memory_type_index);
                unsafe { device.allocate_memory(&alloc_info, None) }.map_err(|e| match e {
                    vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                        VulkanError::OutOfMemory {
                            requested: mem_requirements.size as usize,
                        }
                    }
                    other => VulkanError::Api(other),
                })
            }) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            buffer,
            memory,
            mapped: None,
            buffer_size,
            instance_count,
            instance_size,
            alignment_size,
        })
    }

    /// Round `instance_size` up to a multiple of `min_offset_alignment`
    ///
    /// Vulkan guarantees the alignment is a power of two; zero means no
    /// requirement.
    pub fn alignment(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
        if min_offset_alignment > 0 {
            (instance_size + min_offset_alignment - 1) & !(min_offset_alignment - 1)
        } else {
            instance_size
        }
    }

    /// Map the whole buffer into host memory
    pub fn map(&mut self) -> VulkanResult<()> {
        if self.mapped.is_some() {
            return Ok(());
        }
        let ptr = unsafe {
            self.device
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };
        self.mapped = Some(ptr);
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe {
                self.device.unmap_memory(self.memory);
            }
        }
    }

    /// Copy `data` into the mapped range starting at `offset`
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) -> VulkanResult<()> {
        let Some(mapped) = self.mapped else {
            return Err(VulkanError::invalid("Cannot write to an unmapped buffer"));
        };
        let end = offset + data.len() as vk::DeviceSize;
        if end > self.buffer_size {
            return Err(VulkanError::invalid(format!(
                "Write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.buffer_size
            )));
        }
        unsafe {
            let dst = (mapped as *mut u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Write one instance at `index * alignment_size`
    pub fn write_to_index(&mut self, data: &[u8], index: u32) -> VulkanResult<()> {
        if data.len() as vk::DeviceSize > self.instance_size {
            return Err(VulkanError::invalid("Instance data larger than instance size"));
        }
        self.write_to_buffer(data, self.index_offset(index)?)
    }

    /// Make host writes in a mapped range visible to the device
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        let range = vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(offset)
            .size(size)
            .build();
        unsafe {
            self.device
                .flush_mapped_memory_ranges(&[range])
                .map_err(VulkanError::Api)
        }
    }

    /// Flush the whole buffer
    pub fn flush_all(&self) -> VulkanResult<()> {
        self.flush(vk::WHOLE_SIZE, 0)
    }

    /// Descriptor range covering `size` bytes at `offset`
    pub fn descriptor_info(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: size,
        }
    }

    /// Descriptor range of a single instance
    pub fn descriptor_info_for_index(&self, index: u32) -> VulkanResult<vk::DescriptorBufferInfo> {
        Ok(self.descriptor_info(self.alignment_size, self.index_offset(index)?))
    }

    fn index_offset(&self, index: u32) -> VulkanResult<vk::DeviceSize> {
        if index >= self.instance_count {
            return Err(VulkanError::invalid(format!(
                "Instance index {} out of range ({} instances)",
                index, self.instance_count
            )));
        }
        Ok(index as vk::DeviceSize * self.alignment_size)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn buffer_size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Persistently mapped uniform buffer holding a single `T`
pub struct UniformBuffer<T: Pod> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create and map a host-visible uniform buffer
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let mut buffer = Buffer::new(
            context,
            std::mem::size_of::<T>() as vk::DeviceSize,
            1,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            context.properties().limits.min_uniform_buffer_offset_alignment,
        )?;
        buffer.map()?;

        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Write `data`; call [`Self::flush`] before the GPU reads it
    pub fn write(&mut self, data: &T) -> VulkanResult<()> {
        self.buffer.write_to_buffer(bytemuck::bytes_of(data), 0)
    }

    pub fn flush(&self) -> VulkanResult<()> {
        self.buffer.flush_all()
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.buffer.descriptor_info(vk::WHOLE_SIZE, 0)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_rounds_up_to_power_of_two() {
        assert_eq!(Buffer::alignment(100, 256), 256);
        assert_eq!(Buffer::alignment(256, 256), 256);
        assert_eq!(Buffer::alignment(257, 256), 512);
        assert_eq!(Buffer::alignment(12, 4), 12);
        assert_eq!(Buffer::alignment(13, 4), 16);
    }

    #[test]
    fn test_alignment_zero_means_unaligned() {
        assert_eq!(Buffer::alignment(100, 0), 100);
        assert_eq!(Buffer::alignment(1, 0), 1);
    }
}
