//! Application runner: event loop and the per-frame protocol.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use lucent_gpu::command::submit_command_buffers;
use lucent_gpu::DeviceContextBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::RenderApp;
use crate::context::AppContext;

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Lucent".to_string(),
            width: 1280,
            height: 720,
            vsync: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }
}

/// Run a `RenderApp` with the given configuration.
///
/// Initializes logging, creates the window and device context, records the
/// application's command buffers, and drives the frame protocol until the
/// window closes. Any error is fatal: it is logged and the loop exits.
pub fn run_app<A: RenderApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
    };

    if let Err(e) = event_loop.run_app(&mut runner) {
        error!("Event loop error: {e}");
    }

    Ok(())
}

/// Internal runner implementing winit's ApplicationHandler.
struct AppRunner<A: RenderApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
}

/// Internal application state.
struct AppState<A: RenderApp> {
    ctx: AppContext,
    app: A,
    last_frame_time: Instant,
    frame_count: u64,
}

impl<A: RenderApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.cleanup();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let render_result = match &mut self.state {
                    Some(state) => state.render_frame(),
                    None => return,
                };
                match render_result {
                    Ok(()) => {
                        if let Some(state) = &self.state {
                            state.ctx.window.request_redraw();
                        }
                    }
                    // Any frame error is fatal: tear down and exit
                    Err(e) => {
                        error!("Render error: {e}");
                        if let Some(mut state) = self.state.take() {
                            state.cleanup();
                        }
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: RenderApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let device = DeviceContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;

        let mut ctx = unsafe { AppContext::new(window, device, self.config.vsync)? };

        let app = A::init(&mut ctx)?;

        unsafe { record_command_buffers(&app, &ctx)? };

        Ok(AppState {
            ctx,
            app,
            last_frame_time: Instant::now(),
            frame_count: 0,
        })
    }
}

/// Record the persistent draw and compute command buffers once.
unsafe fn record_command_buffers<A: RenderApp>(app: &A, ctx: &AppContext) -> anyhow::Result<()> {
    let device = ctx.device.device();

    for (image_index, &cmd) in ctx.draw_command_buffers.iter().enumerate() {
        let begin_info = vk::CommandBufferBeginInfo::default();
        device.begin_command_buffer(cmd, &begin_info)?;
        app.record_draw(ctx, cmd, image_index)?;
        device.end_command_buffer(cmd)?;
    }

    let compute_cmd = ctx.gate.command_buffer();
    let begin_info = vk::CommandBufferBeginInfo::default();
    device.begin_command_buffer(compute_cmd, &begin_info)?;
    app.record_compute(ctx, compute_cmd)?;
    device.end_command_buffer(compute_cmd)?;

    Ok(())
}

impl<A: RenderApp> AppState<A> {
    /// Drive one frame, in this fixed order:
    ///
    /// 1. acquire the next swapchain image (present-complete semaphore)
    /// 2. submit the draw buffer for that image, waiting on
    ///    present-complete at color-attachment-output, signaling
    ///    render-complete
    /// 3. present, waiting on render-complete
    /// 4. wait on the previous compute dispatch's fence and reset it
    /// 5. submit the next compute dispatch, signaling the fence
    ///
    /// Compute for frame N+1 is issued only after frame N's graphics work
    /// has been handed to the driver, so CPU submission serializes to one
    /// frame's worth of work at a time.
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let ctx = &mut self.ctx;
        let device = ctx.device.device();

        unsafe {
            let image_index = ctx
                .swapchain
                .acquire_next_image(&ctx.surface.swapchain_loader, ctx.sync.present_complete)?;

            submit_command_buffers(
                device,
                ctx.device.graphics_queue(),
                &[ctx.draw_command_buffers[image_index as usize]],
                &[ctx.sync.present_complete],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[ctx.sync.render_complete],
                vk::Fence::null(),
            )?;

            ctx.swapchain.present(
                &ctx.surface.swapchain_loader,
                ctx.device.graphics_queue(),
                &[ctx.sync.render_complete],
            )?;

            ctx.gate.wait_and_reset(device)?;
            ctx.gate.submit(device, ctx.device.compute_queue())?;
        }

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        self.app.update(&self.ctx, dt)?;

        Ok(())
    }

    fn cleanup(&mut self) {
        info!("Starting cleanup after {} frames...", self.frame_count);
        unsafe {
            if let Err(e) = self.ctx.device.wait_idle() {
                error!("Failed to wait idle: {e}");
            }

            self.app.cleanup(&mut self.ctx);
            self.ctx.cleanup();
        }
        info!("Cleanup complete");
    }
}
