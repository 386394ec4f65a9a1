//! Surface plumbing for windowed presentation.
//!
//! The window itself is an external collaborator: this module only turns
//! its raw handles into a Vulkan surface and reads the surface's
//! capabilities, formats, and present modes.

use crate::context::DeviceContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{select_present_mode, select_surface_format};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Vulkan surface and the loaders tied to it.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
    /// The Vulkan entry point (kept alive for surface_loader lifetime).
    #[allow(dead_code)]
    entry: ash::Entry,
}

impl SurfaceContext {
    /// Create a surface from a window provider.
    ///
    /// # Safety
    /// The device context must be valid and the window must have valid
    /// handles for the lifetime of the surface.
    pub unsafe fn from_window<W>(ctx: &DeviceContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = ash::Entry::load()
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan entry: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = ash_window::create_surface(
            &entry,
            ctx.instance(),
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(&entry, ctx.instance());
        let swapchain_loader = ash::khr::swapchain::Device::new(ctx.instance(), ctx.device());

        Ok(Self {
            surface,
            surface_loader,
            swapchain_loader,
            entry,
        })
    }

    /// Query surface capabilities, formats, and present modes.
    pub fn capabilities(&self, ctx: &DeviceContext) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// Surface capability query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Get the recommended surface format.
    pub fn recommended_format(&self) -> vk::SurfaceFormatKHR {
        select_surface_format(&self.formats)
    }

    /// Get the recommended present mode.
    pub fn recommended_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes, vsync)
    }
}
