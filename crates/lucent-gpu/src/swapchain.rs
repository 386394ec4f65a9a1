//! Swapchain cycle: acquire, submit against, present.

use crate::error::{GpuError, Result};
use ash::vk;

/// Clamp the requested image count into the surface's supported range.
///
/// A `max_image_count` of zero means "no upper bound". One image above the
/// minimum keeps acquire from stalling on the presentation engine.
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut count = requested.max(capabilities.min_image_count + 1);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Resolve the swapchain extent from the surface capabilities.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Select the best surface format, preferring SRGB.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for format in available {
        if format.format == vk::Format::B8G8R8A8_SRGB
            && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        {
            return *format;
        }
    }

    available[0]
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        vk::PresentModeKHR::FIFO
    } else {
        for &mode in available {
            if mode == vk::PresentModeKHR::MAILBOX {
                return mode;
            }
        }
        for &mode in available {
            if mode == vk::PresentModeKHR::IMMEDIATE {
                return mode;
            }
        }
        // FIFO is always supported
        vk::PresentModeKHR::FIFO
    }
}

/// The swapchain and its image set.
///
/// `active_image_index` is selected by the acquire call and stays valid
/// until the next acquire; acquisition takes `&mut self` so the index can
/// never be read across that boundary.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    active_image_index: u32,
}

impl Swapchain {
    /// Create a new swapchain sized by surface capability negotiation.
    ///
    /// # Safety
    /// All handles must be valid.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        extent: vk::Extent2D,
        requested_image_count: u32,
    ) -> Result<Self> {
        let image_count = select_image_count(surface_capabilities, requested_image_count);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let images = swapchain_loader.get_swapchain_images(swapchain)?;

        let image_views: Vec<_> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    );

                device.create_image_view(&view_info, None)
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            active_image_index: 0,
        })
    }

    /// Number of images in the chain.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Index selected by the last acquire.
    pub fn active_image_index(&self) -> u32 {
        self.active_image_index
    }

    /// The image selected by the last acquire.
    pub fn active_image(&self) -> vk::Image {
        self.images[self.active_image_index as usize]
    }

    /// Acquire the next image, signaling `present_complete` when the
    /// presentation engine releases it.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn acquire_next_image(
        &mut self,
        swapchain_loader: &ash::khr::swapchain::Device,
        present_complete: vk::Semaphore,
    ) -> Result<u32> {
        let (index, _suboptimal) = swapchain_loader.acquire_next_image(
            self.swapchain,
            u64::MAX,
            present_complete,
            vk::Fence::null(),
        )?;
        self.active_image_index = index;
        Ok(index)
    }

    /// Present the active image, waiting on the given semaphores.
    ///
    /// # Safety
    /// All handles must be valid and the active image must have been
    /// rendered to.
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [self.active_image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        swapchain_loader.queue_present(queue, &present_info)?;
        Ok(())
    }

    /// Destroy the swapchain and its views.
    ///
    /// # Safety
    /// All handles must be valid and the swapchain must not be in use.
    pub unsafe fn destroy(
        &self,
        device: &ash::Device,
        swapchain_loader: &ash::khr::swapchain::Device,
    ) {
        for &view in &self.image_views {
            device.destroy_image_view(view, None);
        }
        swapchain_loader.destroy_swapchain(self.swapchain, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn image_count_starts_one_above_minimum() {
        assert_eq!(select_image_count(&caps(2, 8), 2), 3);
    }

    #[test]
    fn image_count_clamps_to_maximum() {
        assert_eq!(select_image_count(&caps(2, 3), 8), 3);
    }

    #[test]
    fn zero_maximum_means_unbounded() {
        assert_eq!(select_image_count(&caps(2, 0), 16), 16);
    }

    #[test]
    fn extent_clamps_to_surface_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            // u32::MAX means the surface follows the swapchain's choice
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };

        let extent = calculate_extent(&capabilities, 4096, 16);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 64);
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..Default::default()
        };

        let extent = calculate_extent(&capabilities, 640, 480);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }
}
