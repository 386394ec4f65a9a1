//! Buffer resource with typed memory backing.

use crate::command::{execute_one_shot, CommandPool};
use crate::context::DeviceContext;
use crate::error::Result;
use crate::memory::MemoryBlock;
use ash::vk;

/// Host-visible and host-coherent together make a buffer directly writable
/// by the CPU; anything less forces uploads through a staging buffer.
pub fn needs_staging(flags: vk::MemoryPropertyFlags) -> bool {
    !flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT)
}

/// Full-range descriptor for a buffer. Partial-buffer descriptors are not
/// supported: offset is always 0 and range the full current size.
fn full_range_descriptor(buffer: vk::Buffer, size: vk::DeviceSize) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(size)
}

/// A GPU buffer and the memory block it exclusively owns.
///
/// The handle and its memory are always allocated and freed together. The
/// upload path is fixed at construction: buffers in CPU-writable memory are
/// updated by mapped writes, everything else round-trips through a staging
/// buffer — the same algorithm at creation and on every later [`Buffer::update`].
pub struct Buffer {
    handle: vk::Buffer,
    memory: Option<MemoryBlock>,
    size: vk::DeviceSize,
    descriptor: vk::DescriptorBufferInfo,
    uses_staging: bool,
}

impl Buffer {
    /// Create a buffer, optionally filled with initial data.
    ///
    /// With host-visible + host-coherent property flags the buffer is
    /// created directly and written through a mapping. Otherwise the data
    /// travels through a temporary staging buffer and a one-shot copy on the
    /// graphics queue, and the final buffer gains TRANSFER_DST usage.
    ///
    /// # Safety
    /// The context and pool must be valid; the pool's family must reach the
    /// graphics queue.
    pub unsafe fn new(
        ctx: &DeviceContext,
        pool: &CommandPool,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
        size: vk::DeviceSize,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        let device = ctx.device();
        let uses_staging = needs_staging(flags);

        let (handle, memory) = if let (true, Some(data)) = (uses_staging, data) {
            let (staging, staging_memory) = create_raw(
                ctx,
                size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            staging_memory.write_mapped(device, data)?;

            let (handle, memory) =
                create_raw(ctx, size, usage | vk::BufferUsageFlags::TRANSFER_DST, flags)?;

            copy_buffer(ctx, pool, staging, handle, size)?;

            staging_memory.free(device);
            device.destroy_buffer(staging, None);

            (handle, memory)
        } else {
            let (handle, memory) = create_raw(ctx, size, usage, flags)?;
            if let Some(data) = data {
                memory.write_mapped(device, data)?;
            }
            (handle, memory)
        };

        Ok(Self {
            handle,
            memory: Some(memory),
            size,
            descriptor: full_range_descriptor(handle, size),
            uses_staging,
        })
    }

    /// Overwrite the buffer contents from the start.
    ///
    /// Repeats the construction branch: a mapped write for CPU-writable
    /// buffers, otherwise an allocate-stage-copy-free round trip (logged as
    /// a performance advisory, then performed).
    ///
    /// # Safety
    /// The context and pool must be valid and the buffer must not be in use
    /// by pending GPU work that reads the region being written.
    pub unsafe fn update(
        &self,
        ctx: &DeviceContext,
        pool: &CommandPool,
        data: &[u8],
    ) -> Result<()> {
        debug_assert!(data.len() as vk::DeviceSize <= self.size);
        let device = ctx.device();

        let memory = self
            .memory
            .as_ref()
            .ok_or_else(|| crate::error::GpuError::Other("buffer already destroyed".to_string()))?;

        if !self.uses_staging {
            return memory.write_mapped(device, data);
        }

        tracing::warn!(
            "Updating a buffer without host-visible|host-coherent memory goes through a \
             staging buffer; consider host-visible memory for frequently updated buffers"
        );

        let (staging, staging_memory) = create_raw(
            ctx,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging_memory.write_mapped(device, data)?;

        copy_buffer(ctx, pool, staging, self.handle, data.len() as vk::DeviceSize)?;

        staging_memory.free(device);
        device.destroy_buffer(staging, None);

        Ok(())
    }

    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Whether updates go through the staging path.
    pub fn uses_staging(&self) -> bool {
        self.uses_staging
    }

    /// Descriptor referencing the whole buffer.
    pub fn descriptor(&self) -> vk::DescriptorBufferInfo {
        self.descriptor
    }

    /// Destroy the buffer and release its memory block together.
    ///
    /// # Safety
    /// The device must be valid and the buffer must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if let Some(memory) = self.memory.take() {
            device.destroy_buffer(self.handle, None);
            memory.free(device);
            self.handle = vk::Buffer::null();
        }
    }
}

/// Create a raw buffer with freshly resolved, bound memory.
unsafe fn create_raw(
    ctx: &DeviceContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    flags: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, MemoryBlock)> {
    let device = ctx.device();

    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = device.create_buffer(&buffer_info, None)?;

    let memory = MemoryBlock::for_buffer(device, ctx.memory_properties(), buffer, flags)?;

    Ok((buffer, memory))
}

/// Synchronous whole-range buffer copy on the graphics queue.
unsafe fn copy_buffer(
    ctx: &DeviceContext,
    pool: &CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let device = ctx.device();
    execute_one_shot(device, pool, ctx.graphics_queue(), |cmd| {
        let region = vk::BufferCopy::default().src_offset(0).dst_offset(0).size(size);
        device.cmd_copy_buffer(cmd, src, dst, &[region]);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_writable_buffers_skip_staging() {
        assert!(!needs_staging(
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        ));
        assert!(!needs_staging(
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
        ));
    }

    #[test]
    fn everything_else_stages() {
        assert!(needs_staging(vk::MemoryPropertyFlags::DEVICE_LOCAL));
        assert!(needs_staging(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(needs_staging(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(needs_staging(vk::MemoryPropertyFlags::empty()));
    }

    #[test]
    fn descriptor_spans_whole_buffer_at_offset_zero() {
        let descriptor = full_range_descriptor(vk::Buffer::null(), 512);
        assert_eq!(descriptor.offset, 0);
        assert_eq!(descriptor.range, 512);
    }
}
