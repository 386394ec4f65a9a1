//! Command pool and one-shot command submission.

use crate::error::Result;
use ash::vk;

/// Command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = device.create_command_pool(&create_info, None)?;

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let buffers = self.allocate_command_buffers(device, 1)?;
        Ok(buffers[0])
    }

    /// Allocate multiple primary command buffers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffers(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = device.allocate_command_buffers(&alloc_info)?;
        Ok(buffers)
    }

    /// Free command buffers back to this pool.
    ///
    /// # Safety
    /// The device must be valid and the buffers must not be pending.
    pub unsafe fn free_command_buffers(&self, device: &ash::Device, buffers: &[vk::CommandBuffer]) {
        device.free_command_buffers(self.pool, buffers);
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    device.queue_submit(queue, &[submit_info], fence)?;
    Ok(())
}

/// Record and synchronously execute a one-shot command buffer.
///
/// Allocates a transient primary buffer from `pool`, records `f` into it,
/// submits to `queue`, blocks until the queue is idle, and frees the buffer.
/// Deliberately synchronous: transfers and layout transitions are
/// correctness-critical and infrequent, so simplicity wins over throughput.
///
/// # Safety
/// All handles must be valid and the pool's family must match the queue.
pub unsafe fn execute_one_shot<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = pool.allocate_command_buffer(device)?;

    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    device.begin_command_buffer(cmd, &begin_info)?;
    f(cmd);
    device.end_command_buffer(cmd)?;

    let cmd_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
    device.queue_submit(queue, &[submit_info], vk::Fence::null())?;
    device.queue_wait_idle(queue)?;

    pool.free_command_buffers(device, &cmd_buffers);

    Ok(())
}
