//! Synchronization primitives.

use crate::error::Result;
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    device.wait_for_fences(&[fence], true, timeout_ns)?;
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// Per-frame GPU-GPU ordering primitives.
///
/// Two semaphores order the graphics submission against acquire and
/// present. The per-image fences are a reserved granularity point: created
/// signaled so a future per-image wait can't deadlock, but not consulted by
/// the frame protocol.
pub struct FrameSync {
    /// Signaled when the presentation engine releases the acquired image.
    pub present_complete: vk::Semaphore,
    /// Signaled when the graphics submission for the frame finishes.
    pub render_complete: vk::Semaphore,
    /// One fence per swapchain image.
    pub wait_fences: Vec<vk::Fence>,
}

impl FrameSync {
    /// Create the sync set for a swapchain with `image_count` images.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, image_count: usize) -> Result<Self> {
        let mut wait_fences = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            wait_fences.push(create_fence(device, true)?);
        }

        Ok(Self {
            present_complete: create_semaphore(device)?,
            render_complete: create_semaphore(device)?,
            wait_fences,
        })
    }

    /// Destroy all primitives.
    ///
    /// # Safety
    /// The device must be valid and no primitive may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.present_complete, None);
        device.destroy_semaphore(self.render_complete, None);
        for &fence in &self.wait_fences {
            device.destroy_fence(fence, None);
        }
    }
}
