//! Image resources: sampled textures, cube maps, depth-stencil attachments.

use crate::command::{execute_one_shot, CommandPool};
use crate::context::DeviceContext;
use crate::error::{GpuError, Result};
use crate::layout::transition_barrier;
use crate::memory::MemoryBlock;
use ash::vk;

/// Depth formats in preference order; the first one whose optimal-tiling
/// features include depth-stencil attachment wins.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D16_UNORM,
];

/// Probe for a usable depth-stencil attachment format.
///
/// The format-properties query is passed in so the probe can run against
/// the live device or a synthetic table.
pub fn probe_depth_format(
    query: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            query(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(GpuError::NoSupportedDepthFormat)
}

/// Whether a depth format carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Validate an image-to-image copy before anything is recorded.
///
/// The destination must have been created for transfer writes, both images
/// must match in size, and both must sit in a copy-capable layout.
fn validate_copy(
    src_extent: (u32, u32),
    src_layout: vk::ImageLayout,
    dst_extent: (u32, u32),
    dst_layout: vk::ImageLayout,
    dst_usage: vk::ImageUsageFlags,
) -> Result<()> {
    if !dst_usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        return Err(GpuError::CopyMismatch(
            "destination image was not created with TRANSFER_DST usage".to_string(),
        ));
    }
    if src_extent != dst_extent {
        return Err(GpuError::CopyMismatch(format!(
            "source is {}x{} but destination is {}x{}",
            src_extent.0, src_extent.1, dst_extent.0, dst_extent.1
        )));
    }
    if !matches!(
        src_layout,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL | vk::ImageLayout::GENERAL
    ) {
        return Err(GpuError::CopyMismatch(format!(
            "source layout {src_layout:?} is not transfer-readable"
        )));
    }
    if !matches!(
        dst_layout,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL | vk::ImageLayout::GENERAL
    ) {
        return Err(GpuError::CopyMismatch(format!(
            "destination layout {dst_layout:?} is not transfer-writable"
        )));
    }
    Ok(())
}

/// A GPU image, its memory block, view, and (for sampled images) sampler.
///
/// `layout` tracks the image's true GPU-side layout at all times: every
/// operation that transitions the image updates the field together with the
/// barrier that performs the transition.
pub struct Image {
    handle: vk::Image,
    memory: Option<MemoryBlock>,
    view: vk::ImageView,
    sampler: Option<vk::Sampler>,
    layout: vk::ImageLayout,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    width: u32,
    height: u32,
    layers: u32,
    mip_levels: u32,
}

impl Image {
    /// Create a sampled/storage texture, optionally uploading pixel data.
    ///
    /// With data: undefined -> transfer-dst, staged copy, -> `final_layout`.
    /// Without data: undefined -> `final_layout` directly. Either way the
    /// image ends in exactly the caller-requested layout before any shader
    /// sees it. `layers > 1` produces an array view; data, when present, is
    /// expected tightly packed RGBA8 covering every layer.
    ///
    /// # Safety
    /// The context and pool must be valid; the pool's family must reach the
    /// graphics queue.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn texture(
        ctx: &DeviceContext,
        pool: &CommandPool,
        usage: vk::ImageUsageFlags,
        flags: vk::MemoryPropertyFlags,
        final_layout: vk::ImageLayout,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<Self> {
        Self::new_color(
            ctx,
            pool,
            usage,
            flags,
            final_layout,
            data,
            width,
            height,
            layers,
            vk::ImageCreateFlags::empty(),
            if layers > 1 {
                vk::ImageViewType::TYPE_2D_ARRAY
            } else {
                vk::ImageViewType::TYPE_2D
            },
        )
    }

    /// Create a cube map: six layers, cube-compatible image, cube view.
    ///
    /// # Safety
    /// As [`Image::texture`].
    pub unsafe fn cube_map(
        ctx: &DeviceContext,
        pool: &CommandPool,
        usage: vk::ImageUsageFlags,
        flags: vk::MemoryPropertyFlags,
        final_layout: vk::ImageLayout,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        Self::new_color(
            ctx,
            pool,
            usage,
            flags,
            final_layout,
            data,
            width,
            height,
            6,
            vk::ImageCreateFlags::CUBE_COMPATIBLE,
            vk::ImageViewType::CUBE,
        )
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn new_color(
        ctx: &DeviceContext,
        pool: &CommandPool,
        usage: vk::ImageUsageFlags,
        flags: vk::MemoryPropertyFlags,
        final_layout: vk::ImageLayout,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        layers: u32,
        create_flags: vk::ImageCreateFlags,
        view_type: vk::ImageViewType,
    ) -> Result<Self> {
        let device = ctx.device();
        let format = vk::Format::R8G8B8A8_UNORM;

        // The upload path needs the image as a transfer destination
        let usage = if data.is_some() {
            usage | vk::ImageUsageFlags::TRANSFER_DST
        } else {
            usage
        };

        let (handle, memory) =
            create_raw(ctx, format, usage, flags, width, height, layers, create_flags)?;

        let mut image = Self {
            handle,
            memory: Some(memory),
            view: vk::ImageView::null(),
            sampler: None,
            layout: vk::ImageLayout::UNDEFINED,
            format,
            usage,
            width,
            height,
            layers,
            mip_levels: 1,
        };

        if let Some(data) = data {
            image.transition_layout(ctx, pool, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            image.upload(ctx, pool, data)?;
            image.transition_layout(ctx, pool, final_layout)?;
        } else {
            image.transition_layout(ctx, pool, final_layout)?;
        }

        image.sampler = Some(create_sampler(device)?);
        image.view = create_view(
            device,
            handle,
            view_type,
            format,
            vk::ImageAspectFlags::COLOR,
            layers,
        )?;

        Ok(image)
    }

    /// Create a depth-stencil attachment sized to the surface.
    ///
    /// The format is probed against the physical device; the view's aspect
    /// includes stencil only when the chosen format carries one. Lives in
    /// device-local memory, transitioned to the attachment layout up front.
    ///
    /// # Safety
    /// As [`Image::texture`].
    pub unsafe fn depth_stencil(
        ctx: &DeviceContext,
        pool: &CommandPool,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let device = ctx.device();
        let instance = ctx.instance();
        let physical_device = ctx.physical_device();

        let format = probe_depth_format(|candidate| {
            instance.get_physical_device_format_properties(physical_device, candidate)
        })?;

        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil_component(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }

        let usage = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        let (handle, memory) = create_raw(
            ctx,
            format,
            usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            width,
            height,
            1,
            vk::ImageCreateFlags::empty(),
        )?;

        let mut image = Self {
            handle,
            memory: Some(memory),
            view: vk::ImageView::null(),
            sampler: None,
            layout: vk::ImageLayout::UNDEFINED,
            format,
            usage,
            width,
            height,
            layers: 1,
            mip_levels: 1,
        };

        image.transition_with_aspect(
            ctx,
            pool,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            aspect,
        )?;

        image.view = create_view(device, handle, vk::ImageViewType::TYPE_2D, format, aspect, 1)?;

        Ok(image)
    }

    /// Transition the image to a new layout via a one-shot barrier on the
    /// graphics queue. The tracked layout is updated with the submission.
    ///
    /// # Safety
    /// The context and pool must be valid.
    pub unsafe fn transition_layout(
        &mut self,
        ctx: &DeviceContext,
        pool: &CommandPool,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        self.transition_with_aspect(ctx, pool, new_layout, vk::ImageAspectFlags::COLOR)
    }

    unsafe fn transition_with_aspect(
        &mut self,
        ctx: &DeviceContext,
        pool: &CommandPool,
        new_layout: vk::ImageLayout,
        aspect: vk::ImageAspectFlags,
    ) -> Result<()> {
        // Resolve the pair before recording so an unhandled transition
        // fails without touching the queue
        let barrier = transition_barrier(self.handle, aspect, self.layers, self.layout, new_layout)?;

        let device = ctx.device();
        execute_one_shot(device, pool, ctx.graphics_queue(), |cmd| {
            let dependency_info =
                vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
            device.cmd_pipeline_barrier2(cmd, &dependency_info);
        })?;

        self.layout = new_layout;
        Ok(())
    }

    /// Copy one color layer at mip 0 into another image.
    ///
    /// Validated before any GPU call: the destination must carry
    /// TRANSFER_DST usage, both images must share width and height, and
    /// both must sit in copy-capable layouts.
    ///
    /// # Safety
    /// The context and pool must be valid.
    pub unsafe fn copy_to(
        &self,
        ctx: &DeviceContext,
        pool: &CommandPool,
        dst: &Image,
        src_layer: u32,
        dst_layer: u32,
    ) -> Result<()> {
        validate_copy(
            (self.width, self.height),
            self.layout,
            (dst.width, dst.height),
            dst.layout,
            dst.usage,
        )?;

        let region = vk::ImageCopy::default()
            .src_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(src_layer)
                    .layer_count(1),
            )
            .src_offset(vk::Offset3D::default())
            .dst_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(dst_layer)
                    .layer_count(1),
            )
            .dst_offset(vk::Offset3D::default())
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            });

        let device = ctx.device();
        execute_one_shot(device, pool, ctx.graphics_queue(), |cmd| {
            device.cmd_copy_image(
                cmd,
                self.handle,
                self.layout,
                dst.handle,
                dst.layout,
                &[region],
            );
        })
    }

    /// Upload tightly packed RGBA8 pixel data through a staging buffer.
    ///
    /// The image must already be in TRANSFER_DST layout.
    unsafe fn upload(&self, ctx: &DeviceContext, pool: &CommandPool, data: &[u8]) -> Result<()> {
        debug_assert_eq!(self.layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let device = ctx.device();

        let staging_info = vk::BufferCreateInfo::default()
            .size(data.len() as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let staging = device.create_buffer(&staging_info, None)?;
        let staging_memory = MemoryBlock::for_buffer(
            device,
            ctx.memory_properties(),
            staging,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging_memory.write_mapped(device, data)?;

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(self.layers),
            )
            .image_offset(vk::Offset3D::default())
            .image_extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            });

        execute_one_shot(device, pool, ctx.graphics_queue(), |cmd| {
            device.cmd_copy_buffer_to_image(
                cmd,
                staging,
                self.handle,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        })?;

        device.destroy_buffer(staging, None);
        staging_memory.free(device);

        Ok(())
    }

    /// Get the raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    /// Get the image view.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// The image's current GPU-side layout.
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// The image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Array layer count.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Descriptor for binding the image (with its sampler, when present)
    /// into a shader-visible set. Re-fetched rather than cached so it
    /// always reflects the current layout.
    pub fn descriptor(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.unwrap_or_default())
            .image_view(self.view)
            .image_layout(self.layout)
    }

    /// Destroy sampler, view, image, and memory block together.
    ///
    /// # Safety
    /// The device must be valid and the image must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if let Some(memory) = self.memory.take() {
            if let Some(sampler) = self.sampler.take() {
                device.destroy_sampler(sampler, None);
            }
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.handle, None);
            memory.free(device);
            self.handle = vk::Image::null();
            self.view = vk::ImageView::null();
        }
    }
}

/// Create a 2D optimal-tiling image with bound, resolver-chosen memory.
#[allow(clippy::too_many_arguments)]
unsafe fn create_raw(
    ctx: &DeviceContext,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    flags: vk::MemoryPropertyFlags,
    width: u32,
    height: u32,
    layers: u32,
    create_flags: vk::ImageCreateFlags,
) -> Result<(vk::Image, MemoryBlock)> {
    let device = ctx.device();

    let image_info = vk::ImageCreateInfo::default()
        .flags(create_flags)
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(layers)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = device.create_image(&image_info, None)?;

    let memory = MemoryBlock::for_image(device, ctx.memory_properties(), image, flags)?;

    Ok((image, memory))
}

unsafe fn create_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
        .mip_lod_bias(0.0)
        .max_anisotropy(1.0)
        .compare_op(vk::CompareOp::NEVER)
        .min_lod(0.0)
        .max_lod(0.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);

    let sampler = device.create_sampler(&create_info, None)?;
    Ok(sampler)
}

unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    layers: u32,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(layers),
        );

    let view = device.create_image_view(&view_info, None)?;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_probe_takes_first_supported_candidate() {
        let format = probe_depth_format(|candidate| {
            let mut props = vk::FormatProperties::default();
            if candidate == vk::Format::D16_UNORM {
                props.optimal_tiling_features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
            }
            props
        })
        .unwrap();
        assert_eq!(format, vk::Format::D16_UNORM);
        assert!(!has_stencil_component(format));
    }

    #[test]
    fn depth_probe_prefers_stencil_capable_formats() {
        let format = probe_depth_format(|_| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
        assert!(has_stencil_component(format));
    }

    #[test]
    fn depth_probe_with_no_candidates_is_fatal() {
        let result = probe_depth_format(|_| vk::FormatProperties::default());
        assert!(matches!(result, Err(GpuError::NoSupportedDepthFormat)));
    }

    #[test]
    fn copy_requires_transfer_dst_usage() {
        let result = validate_copy(
            (64, 64),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            (64, 64),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert!(matches!(result, Err(GpuError::CopyMismatch(_))));
    }

    #[test]
    fn copy_requires_matching_extents() {
        let result = validate_copy(
            (64, 64),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            (64, 32),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );
        assert!(matches!(result, Err(GpuError::CopyMismatch(_))));
    }

    #[test]
    fn copy_requires_transfer_capable_layouts() {
        let result = validate_copy(
            (64, 64),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            (64, 64),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageUsageFlags::TRANSFER_DST,
        );
        assert!(matches!(result, Err(GpuError::CopyMismatch(_))));
    }

    #[test]
    fn valid_copy_passes_validation() {
        validate_copy(
            (64, 64),
            vk::ImageLayout::GENERAL,
            (64, 64),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .unwrap();
    }
}
