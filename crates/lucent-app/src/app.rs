//! `RenderApp` trait definition.

use crate::context::AppContext;
use ash::vk;
use winit::event::WindowEvent;

/// Trait for Lucent applications.
///
/// The framework owns the window, the device context, the swapchain, and
/// the frame protocol; the application supplies resources and recorded
/// commands through these hooks. Command buffers are persistent: the
/// recording hooks run once at startup, and per-frame state flows through
/// buffer updates in [`RenderApp::update`].
pub trait RenderApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the device context, swapchain, and command
    /// buffers exist. Create buffers, images, and pipelines here.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every frame after the frame's submissions have been issued.
    /// Mutate per-frame data (uniform buffers, history snapshots) here.
    fn update(&mut self, ctx: &AppContext, dt: f32) -> anyhow::Result<()>;

    /// Record the draw commands for one swapchain image.
    ///
    /// Called once per swapchain image at startup; the buffer is
    /// resubmitted every time that image is acquired.
    fn record_draw(
        &self,
        ctx: &AppContext,
        cmd: vk::CommandBuffer,
        image_index: usize,
    ) -> anyhow::Result<()>;

    /// Record the compute dispatch command buffer.
    ///
    /// Called once at startup; the buffer is resubmitted every frame,
    /// paced by the compute fence.
    fn record_compute(&self, ctx: &AppContext, cmd: vk::CommandBuffer) -> anyhow::Result<()>;

    /// Handle window events.
    ///
    /// Return `true` if the event was consumed. Default does nothing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Destroy application resources before shutdown.
    ///
    /// Both queues are idle when this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
