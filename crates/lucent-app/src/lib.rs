//! Application framework for the Lucent renderer.
//!
//! This crate owns the boilerplate around a [`RenderApp`]:
//! - Window creation and event loop handling
//! - Device context initialization
//! - Swapchain, per-image command buffers, and frame synchronization
//! - The per-frame graphics/compute submission protocol
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use lucent_app::{run_app, AppConfig, AppContext, RenderApp};
//!
//! struct MyApp;
//!
//! impl RenderApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn record_draw(
//!         &self,
//!         ctx: &AppContext,
//!         cmd: vk::CommandBuffer,
//!         image_index: usize,
//!     ) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn record_compute(&self, ctx: &AppContext, cmd: vk::CommandBuffer) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod gate;
mod runner;

pub use app::RenderApp;
pub use context::AppContext;
pub use gate::{ComputeGate, PacingError, PacingLedger};
pub use runner::{run_app, AppConfig};

// Re-export commonly used types for convenience
pub use lucent_gpu::{DeviceContext, DeviceContextBuilder};
pub use winit::event::WindowEvent;
