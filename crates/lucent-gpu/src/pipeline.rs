//! Pipeline wrappers.
//!
//! Shader binaries arrive as opaque SPIR-V; fixed-function state comes in
//! through [`GraphicsPipelineConfig`]. Graphics pipelines target dynamic
//! rendering, so no render pass objects are involved.

use crate::error::{GpuError, Result};
use crate::shader::create_shader_module;
use ash::vk;

/// Compute pipeline wrapper.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl ComputePipeline {
    /// Create a compute pipeline from shader code.
    ///
    /// # Safety
    /// The device must be valid and the shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let shader_module = create_shader_module(device, shader_code)?;

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = device.create_pipeline_layout(&layout_info, None)?;

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(c"main");

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let pipelines = device
            .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_pipelines, e)| GpuError::Vulkan(e))?;

        // The module is owned by the pipeline from here on
        device.destroy_shader_module(shader_module, None);

        Ok(Self {
            pipeline: pipelines[0],
            layout,
        })
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

/// Fixed-function state for a graphics pipeline.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: None,
        }
    }
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline using dynamic rendering.
    ///
    /// Vertex input is empty: full-screen passes generate vertices in the
    /// vertex shader. Viewport and scissor are dynamic.
    ///
    /// # Safety
    /// The device must be valid and shader code must be valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let vert_module = create_shader_module(device, &config.vertex_shader)?;
        let frag_module = create_shader_module(device, &config.fragment_shader)?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = device.create_pipeline_layout(&layout_info, None)?;

        let color_formats = [config.color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(depth_format) = config.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_pipelines, e)| GpuError::Vulkan(e));

        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);

        Ok(Self {
            pipeline: pipelines?[0],
            layout,
        })
    }

    /// Destroy the pipeline.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
