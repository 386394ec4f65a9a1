//! Compute trace stage: ray tracing into a storage texture.

use ash::vk;
use lucent_gpu::descriptors::{
    write_combined_image_sampler, write_storage_buffer, write_storage_image, write_uniform_buffer,
    DescriptorPool, DescriptorSetLayoutBuilder,
};
use lucent_gpu::error::Result;
use lucent_gpu::{Buffer, ComputePipeline, Image};

/// Workgroup edge length baked into the trace shader.
const WORKGROUP_SIZE: u32 = 16;

/// Workgroup counts covering a target of the given size.
pub fn dispatch_groups(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(WORKGROUP_SIZE),
        height.div_ceil(WORKGROUP_SIZE),
    )
}

/// The compute pipeline that writes the ray-traced image.
///
/// Bindings: 0 = output storage image, 1 = scene uniforms, 2..=4 = sphere,
/// plane, and triangle storage buffers, 5 = environment cube map.
pub struct TracePipeline {
    pipeline: ComputePipeline,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    width: u32,
    height: u32,
}

impl TracePipeline {
    /// Create the pipeline and bind all resources into its descriptor set.
    ///
    /// # Safety
    /// The device must be valid; the target must be a storage image in
    /// GENERAL layout; the buffers must outlive the recorded dispatches.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        shader_code: &[u32],
        target: &Image,
        uniforms: &Buffer,
        spheres: &Buffer,
        planes: &Buffer,
        triangles: &Buffer,
        environment: &Image,
    ) -> Result<Self> {
        let set_layout = DescriptorSetLayoutBuilder::new()
            .storage_image(0, vk::ShaderStageFlags::COMPUTE)
            .uniform_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(3, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(4, vk::ShaderStageFlags::COMPUTE)
            .sampled_image(5, vk::ShaderStageFlags::COMPUTE)
            .build(device)?;

        let pipeline = ComputePipeline::new(device, shader_code, &[set_layout], &[])?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(3),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1),
        ];
        let descriptor_pool = DescriptorPool::new(device, 1, &pool_sizes)?;
        let descriptor_set = descriptor_pool.allocate(device, &[set_layout])?[0];

        write_storage_image(device, descriptor_set, 0, &target.descriptor());
        write_uniform_buffer(device, descriptor_set, 1, &uniforms.descriptor());
        write_storage_buffer(device, descriptor_set, 2, &spheres.descriptor());
        write_storage_buffer(device, descriptor_set, 3, &planes.descriptor());
        write_storage_buffer(device, descriptor_set, 4, &triangles.descriptor());
        write_combined_image_sampler(device, descriptor_set, 5, &environment.descriptor());

        Ok(Self {
            pipeline,
            set_layout,
            descriptor_pool,
            descriptor_set,
            width: target.width(),
            height: target.height(),
        })
    }

    /// Record the trace dispatch.
    ///
    /// # Safety
    /// The command buffer must be in recording state on a compute-capable
    /// queue family.
    pub unsafe fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            self.pipeline.layout,
            0,
            &[self.descriptor_set],
            &[],
        );

        let (groups_x, groups_y) = dispatch_groups(self.width, self.height);
        device.cmd_dispatch(cmd, groups_x, groups_y, 1);
    }

    /// Destroy all pipeline objects.
    ///
    /// # Safety
    /// The device must be valid and no dispatch may be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.descriptor_pool.destroy(device);
        device.destroy_descriptor_set_layout(self.set_layout, None);
        self.pipeline.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_exact_multiples() {
        assert_eq!(dispatch_groups(1280, 720), (80, 45));
    }

    #[test]
    fn dispatch_rounds_up_edge_tiles() {
        assert_eq!(dispatch_groups(1281, 721), (81, 46));
        assert_eq!(dispatch_groups(1, 1), (1, 1));
    }
}
