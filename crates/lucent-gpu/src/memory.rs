//! Memory type resolution and device memory ownership.

use crate::error::{GpuError, Result};
use ash::vk;

/// Resolve the memory type index for a resource.
///
/// Returns the first index eligible under the requirement mask whose
/// property flags are a superset of `required`. Failing to find one means
/// the device does not support this resource/usage combination, which is a
/// fatal configuration error.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        if requirements.memory_type_bits & (1 << i) == 0 {
            continue;
        }
        if memory_properties.memory_types[i as usize]
            .property_flags
            .contains(required)
        {
            return Ok(i);
        }
    }

    Err(GpuError::NoCompatibleMemoryType {
        type_bits: requirements.memory_type_bits,
        flags: required,
    })
}

/// A device memory allocation owned by exactly one buffer or image.
///
/// Move-only: the block is consumed by [`MemoryBlock::free`], so it is
/// released exactly once, together with the resource bound to it.
pub struct MemoryBlock {
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    type_index: u32,
}

impl MemoryBlock {
    /// Allocate a block sized to the given requirements, in the first
    /// memory type satisfying `flags`.
    ///
    /// # Safety
    /// The device must be valid and the memory properties must describe its
    /// physical device.
    pub unsafe fn allocate(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let type_index = find_memory_type_index(memory_properties, requirements, flags)?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);

        let memory = device.allocate_memory(&alloc_info, None)?;

        Ok(Self {
            memory,
            size: requirements.size,
            type_index,
        })
    }

    /// Allocate memory for a buffer and bind it at offset 0.
    ///
    /// # Safety
    /// The device and buffer must be valid.
    pub unsafe fn for_buffer(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        buffer: vk::Buffer,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let requirements = device.get_buffer_memory_requirements(buffer);
        let block = Self::allocate(device, memory_properties, &requirements, flags)?;
        device.bind_buffer_memory(buffer, block.memory, 0)?;
        Ok(block)
    }

    /// Allocate memory for an image and bind it at offset 0.
    ///
    /// # Safety
    /// The device and image must be valid.
    pub unsafe fn for_image(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        image: vk::Image,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let requirements = device.get_image_memory_requirements(image);
        let block = Self::allocate(device, memory_properties, &requirements, flags)?;
        device.bind_image_memory(image, block.memory, 0)?;
        Ok(block)
    }

    /// Allocation size in bytes (rounded up to the resource's requirements).
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// The memory type index the resolver selected.
    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Map the whole block, copy `data` to its start, and unmap.
    ///
    /// The block must live in host-visible, host-coherent memory; no flush
    /// is issued.
    ///
    /// # Safety
    /// The device must be valid and the memory must not be in use by the GPU.
    pub unsafe fn write_mapped(&self, device: &ash::Device, data: &[u8]) -> Result<()> {
        let ptr = device.map_memory(
            self.memory,
            0,
            vk::WHOLE_SIZE,
            vk::MemoryMapFlags::empty(),
        )?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
        device.unmap_memory(self.memory);
        Ok(())
    }

    /// Release the allocation. Consumes the block.
    ///
    /// # Safety
    /// The device must be valid and no resource may still be bound to this
    /// memory.
    pub unsafe fn free(self, device: &ash::Device) {
        device.free_memory(self.memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a synthetic memory-properties table from per-type flags.
    fn memory_table(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    fn requirements(type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 256,
            alignment: 64,
            memory_type_bits: type_bits,
        }
    }

    #[test]
    fn resolves_first_eligible_superset() {
        let props = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type_index(
            &props,
            &requirements(0b111),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn requirement_mask_excludes_types() {
        let props = memory_table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 matches the flags but is masked out by the requirements
        let index = find_memory_type_index(
            &props,
            &requirements(0b10),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn no_eligible_type_is_fatal() {
        let props = memory_table(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type_index(
            &props,
            &requirements(0b1),
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );
        assert!(matches!(
            result,
            Err(GpuError::NoCompatibleMemoryType { .. })
        ));
    }
}
