//! Application context.

use std::sync::Arc;

use ash::vk;
use lucent_gpu::command::CommandPool;
use lucent_gpu::swapchain::{calculate_extent, Swapchain};
use lucent_gpu::sync::FrameSync;
use lucent_gpu::{DeviceContext, SurfaceContext};
use winit::window::Window;

use crate::gate::ComputeGate;

/// Swapchain images requested before capability negotiation.
const REQUESTED_IMAGE_COUNT: u32 = 2;

/// Everything the frame protocol and the application share.
///
/// Owns the window handle, the device context, the presentation chain, the
/// per-image draw command buffers, the frame sync set, and the compute
/// gate. Resources are created device-first and destroyed in strict
/// reverse order once both queues are idle.
pub struct AppContext {
    /// The window handle.
    pub window: Arc<Window>,
    /// Device context with both queues.
    pub device: DeviceContext,
    /// Surface plumbing for the window.
    pub surface: SurfaceContext,
    /// The presentation chain.
    pub swapchain: Swapchain,
    /// Graphics-family pool the draw buffers and one-shot transfers use.
    pub command_pool: CommandPool,
    /// One persistent draw command buffer per swapchain image.
    pub draw_command_buffers: Vec<vk::CommandBuffer>,
    /// Semaphores and per-image fences.
    pub sync: FrameSync,
    /// Compute queue pacing.
    pub gate: ComputeGate,
    /// Whether vsync is enabled.
    pub vsync: bool,
}

impl AppContext {
    /// Build the context for a window.
    ///
    /// # Safety
    /// The window must have valid handles for the context's lifetime.
    pub(crate) unsafe fn new(
        window: Arc<Window>,
        device: DeviceContext,
        vsync: bool,
    ) -> anyhow::Result<Self> {
        let surface = SurfaceContext::from_window(&device, window.as_ref())?;

        let size = window.inner_size();
        let caps = surface.capabilities(&device)?;
        let surface_format = caps.recommended_format();
        let present_mode = caps.recommended_present_mode(vsync);
        let extent = calculate_extent(
            &caps.capabilities,
            size.width.max(1),
            size.height.max(1),
        );

        let swapchain = Swapchain::new(
            device.device(),
            &surface.swapchain_loader,
            surface.surface,
            &caps.capabilities,
            surface_format,
            present_mode,
            extent,
            REQUESTED_IMAGE_COUNT,
        )?;

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count()
        );

        let sync = FrameSync::new(device.device(), swapchain.image_count())?;

        let command_pool = CommandPool::new(
            device.device(),
            device.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let draw_command_buffers =
            command_pool.allocate_command_buffers(device.device(), swapchain.image_count() as u32)?;

        let gate = ComputeGate::new(&device)?;

        Ok(Self {
            window,
            device,
            surface,
            swapchain,
            command_pool,
            draw_command_buffers,
            sync,
            gate,
            vsync,
        })
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height as f32
    }

    /// Get the swapchain's color format.
    pub fn surface_format(&self) -> vk::Format {
        self.swapchain.format
    }

    /// Tear down everything this context owns, in reverse creation order.
    ///
    /// # Safety
    /// Both queues must be idle.
    pub(crate) unsafe fn cleanup(&mut self) {
        let device = self.device.device();

        self.gate.destroy(device);

        self.command_pool
            .free_command_buffers(device, &self.draw_command_buffers);
        self.draw_command_buffers.clear();
        self.command_pool.destroy(device);

        self.sync.destroy(device);

        self.swapchain
            .destroy(device, &self.surface.swapchain_loader);
        self.surface.destroy();
    }
}
