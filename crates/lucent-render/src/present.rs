//! Graphics present stage: the traced image as a fullscreen triangle.

use ash::vk;
use lucent_gpu::descriptors::{
    write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder,
};
use lucent_gpu::error::Result;
use lucent_gpu::{GraphicsPipeline, GraphicsPipelineConfig, Image};

/// The fullscreen pipeline sampling the traced image.
///
/// Vertices come from the vertex shader, so the pipeline has no vertex
/// input; the front face is culled to match the generated winding.
pub struct PresentPipeline {
    pipeline: GraphicsPipeline,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
}

impl PresentPipeline {
    /// Create the pipeline and bind the traced image for sampling.
    ///
    /// # Safety
    /// The device must be valid; the traced image must carry a sampler.
    pub unsafe fn new(
        device: &ash::Device,
        vertex_shader: Vec<u32>,
        fragment_shader: Vec<u32>,
        traced: &Image,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let set_layout = DescriptorSetLayoutBuilder::new()
            .sampled_image(0, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let config = GraphicsPipelineConfig {
            vertex_shader,
            fragment_shader,
            cull_mode: vk::CullModeFlags::FRONT,
            color_format,
            depth_format: Some(depth_format),
            ..Default::default()
        };

        let pipeline = GraphicsPipeline::new(device, &config, &[set_layout], &[])?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)];
        let descriptor_pool = DescriptorPool::new(device, 1, &pool_sizes)?;
        let descriptor_set = descriptor_pool.allocate(device, &[set_layout])?[0];

        write_combined_image_sampler(device, descriptor_set, 0, &traced.descriptor());

        Ok(Self {
            pipeline,
            set_layout,
            descriptor_pool,
            descriptor_set,
        })
    }

    /// Record the present pass for one swapchain image.
    ///
    /// Orders the compute write of the traced image before the fragment
    /// read, moves the swapchain image into the attachment layout, draws
    /// the fullscreen triangle under dynamic rendering, and leaves the
    /// swapchain image ready for presentation.
    ///
    /// # Safety
    /// The command buffer must be in recording state on the graphics queue
    /// family; the traced image must be in GENERAL layout when the compute
    /// dispatch it samples from has run.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        traced: &Image,
        swapchain_image: vk::Image,
        swapchain_view: vk::ImageView,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
    ) {
        let color_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        // The compute stage writes the traced image in GENERAL layout; the
        // fragment stage samples it in the same layout, so only the access
        // ordering needs a barrier
        let barriers = [
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
                .src_access_mask(vk::AccessFlags2::SHADER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_READ)
                .old_layout(vk::ImageLayout::GENERAL)
                .new_layout(vk::ImageLayout::GENERAL)
                .image(traced.handle())
                .subresource_range(color_range),
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .image(swapchain_image)
                .subresource_range(color_range),
        ];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        device.cmd_pipeline_barrier2(cmd, &dependency_info);

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(swapchain_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.5, 0.5, 0.5, 1.0],
                },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        device.cmd_begin_rendering(cmd, &rendering_info);

        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        device.cmd_set_viewport(cmd, 0, &[viewport]);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline.layout,
            0,
            &[self.descriptor_set],
            &[],
        );
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        device.cmd_draw(cmd, 3, 1, 0, 0);

        device.cmd_end_rendering(cmd);

        let present_barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags2::NONE)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .image(swapchain_image)
            .subresource_range(color_range);
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(std::slice::from_ref(&present_barrier));
        device.cmd_pipeline_barrier2(cmd, &dependency_info);
    }

    /// Destroy all pipeline objects.
    ///
    /// # Safety
    /// The device must be valid and no draw may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.descriptor_pool.destroy(device);
        device.destroy_descriptor_set_layout(self.set_layout, None);
        self.pipeline.destroy(device);
    }
}
