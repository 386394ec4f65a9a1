//! The demo raytracer application.

use anyhow::Context;
use ash::vk;
use bytemuck::bytes_of;
use glam::Vec3;
use lucent_app::{AppContext, RenderApp};
use lucent_gpu::{load_spirv, Buffer, Image};
use lucent_render::{
    Plane, PresentPipeline, SampleHistory, SceneUniforms, Sphere, TracePipeline, Triangle,
};

/// Sample-history depth.
const HISTORY_LAYERS: u32 = 20;
/// Environment cube face edge length.
const ENVIRONMENT_SIZE: u32 = 256;
/// Frames between history snapshots.
const SNAPSHOT_INTERVAL: u32 = 30;

const TRACE_SHADER: &str = "shaders/trace.comp.spv";
const FULLSCREEN_VERT_SHADER: &str = "shaders/fullscreen.vert.spv";
const PRESENT_FRAG_SHADER: &str = "shaders/present.frag.spv";

/// Compute-traced scene presented as a fullscreen image.
pub struct Raytracer {
    sphere_buffer: Buffer,
    plane_buffer: Buffer,
    triangle_buffer: Buffer,
    uniform_buffer: Buffer,

    traced: Image,
    environment: Image,
    depth: Image,
    history: SampleHistory,

    trace_pipeline: TracePipeline,
    present_pipeline: PresentPipeline,

    uniforms: SceneUniforms,
    elapsed: f32,
    frames_since_snapshot: u32,
}

impl RenderApp for Raytracer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = ctx.device.device();
        let pool = &ctx.command_pool;

        let spheres = [
            Sphere::new(
                Vec3::new(1.75, -0.5, 0.0),
                1.0,
                Vec3::new(0.0, 1.0, 0.0),
                32.0,
                0,
            ),
            Sphere::new(
                Vec3::new(0.0, 1.0, -0.5),
                1.0,
                Vec3::new(0.65, 0.77, 0.97),
                32.0,
                1,
            ),
            Sphere::new(
                Vec3::new(-1.75, -0.75, -0.5),
                1.25,
                Vec3::new(0.9, 0.76, 0.46),
                32.0,
                2,
            ),
        ];

        let room_dim = 4.0;
        let planes = [Plane::new(Vec3::Y, room_dim, Vec3::ONE, 32.0, 3)];

        let triangles = [Triangle::new(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.65, 0.77, 0.97),
            32.0,
            4,
        )];

        // Geometry lives in device-local memory; construction goes through
        // the staging path
        let (sphere_buffer, plane_buffer, triangle_buffer) = unsafe {
            (
                Buffer::new(
                    &ctx.device,
                    pool,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                    vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    std::mem::size_of_val(&spheres) as vk::DeviceSize,
                    Some(bytemuck::cast_slice(&spheres)),
                )?,
                Buffer::new(
                    &ctx.device,
                    pool,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                    vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    std::mem::size_of_val(&planes) as vk::DeviceSize,
                    Some(bytemuck::cast_slice(&planes)),
                )?,
                Buffer::new(
                    &ctx.device,
                    pool,
                    vk::BufferUsageFlags::STORAGE_BUFFER,
                    vk::MemoryPropertyFlags::DEVICE_LOCAL,
                    std::mem::size_of_val(&triangles) as vk::DeviceSize,
                    Some(bytemuck::cast_slice(&triangles)),
                )?,
            )
        };

        let mut uniforms = SceneUniforms {
            aspect_ratio: ctx.aspect_ratio(),
            ..Default::default()
        };
        uniforms.light_pos = Vec3::new(0.0, 0.0, 2.0);

        let uniform_buffer = unsafe {
            Buffer::new(
                &ctx.device,
                pool,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                std::mem::size_of::<SceneUniforms>() as vk::DeviceSize,
                Some(bytes_of(&uniforms)),
            )?
        };

        let (width, height) = (ctx.width(), ctx.height());

        let traced = unsafe {
            Image::texture(
                &ctx.device,
                pool,
                vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::ImageLayout::GENERAL,
                None,
                width,
                height,
                1,
            )?
        };

        let environment = unsafe {
            Image::cube_map(
                &ctx.device,
                pool,
                vk::ImageUsageFlags::SAMPLED,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                Some(&environment_faces(ENVIRONMENT_SIZE)),
                ENVIRONMENT_SIZE,
                ENVIRONMENT_SIZE,
            )?
        };

        let depth = unsafe { Image::depth_stencil(&ctx.device, pool, width, height)? };

        let history =
            unsafe { SampleHistory::new(&ctx.device, pool, width, height, HISTORY_LAYERS)? };

        let trace_shader =
            load_spirv(TRACE_SHADER).context("loading trace compute shader")?;
        let trace_pipeline = unsafe {
            TracePipeline::new(
                device,
                &trace_shader,
                &traced,
                &uniform_buffer,
                &sphere_buffer,
                &plane_buffer,
                &triangle_buffer,
                &environment,
            )?
        };

        let vert_shader =
            load_spirv(FULLSCREEN_VERT_SHADER).context("loading fullscreen vertex shader")?;
        let frag_shader =
            load_spirv(PRESENT_FRAG_SHADER).context("loading present fragment shader")?;
        let present_pipeline = unsafe {
            PresentPipeline::new(
                device,
                vert_shader,
                frag_shader,
                &traced,
                ctx.surface_format(),
                depth.format(),
            )?
        };

        tracing::info!(
            "Scene ready: {} spheres, {} planes, {} triangles",
            spheres.len(),
            planes.len(),
            triangles.len()
        );

        Ok(Self {
            sphere_buffer,
            plane_buffer,
            triangle_buffer,
            uniform_buffer,
            traced,
            environment,
            depth,
            history,
            trace_pipeline,
            present_pipeline,
            uniforms,
            elapsed: 0.0,
            frames_since_snapshot: 0,
        })
    }

    fn update(&mut self, ctx: &AppContext, dt: f32) -> anyhow::Result<()> {
        self.elapsed += dt;

        let angle = (self.elapsed * 20.0).to_radians();
        self.uniforms.light_pos = Vec3::new(
            angle.sin() * 2.0,
            angle.sin() * 2.0,
            angle.cos() * 2.0,
        );
        self.uniforms.aspect_ratio = ctx.aspect_ratio();
        if let Some(layer) = self.history.most_recent_layer() {
            self.uniforms.current_layer = layer as i32;
        }

        unsafe {
            self.uniform_buffer
                .update(&ctx.device, &ctx.command_pool, bytes_of(&self.uniforms))?;
        }

        self.frames_since_snapshot += 1;
        if self.frames_since_snapshot >= SNAPSHOT_INTERVAL {
            self.frames_since_snapshot = 0;
            // The copy reads the traced image, so nothing may be writing it
            ctx.device.wait_idle()?;
            unsafe {
                self.history
                    .push(&ctx.device, &ctx.command_pool, &self.traced)?;
            }
        }

        Ok(())
    }

    fn record_draw(
        &self,
        ctx: &AppContext,
        cmd: vk::CommandBuffer,
        image_index: usize,
    ) -> anyhow::Result<()> {
        unsafe {
            self.present_pipeline.record(
                ctx.device.device(),
                cmd,
                &self.traced,
                ctx.swapchain.images[image_index],
                ctx.swapchain.image_views[image_index],
                self.depth.view(),
                ctx.extent(),
            );
        }
        Ok(())
    }

    fn record_compute(&self, ctx: &AppContext, cmd: vk::CommandBuffer) -> anyhow::Result<()> {
        unsafe {
            self.trace_pipeline.record(ctx.device.device(), cmd);
        }
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let device = ctx.device.device();
        unsafe {
            self.present_pipeline.destroy(device);
            self.trace_pipeline.destroy(device);
            self.history.destroy(device);
            self.depth.destroy(device);
            self.environment.destroy(device);
            self.traced.destroy(device);
            self.uniform_buffer.destroy(device);
            self.triangle_buffer.destroy(device);
            self.plane_buffer.destroy(device);
            self.sphere_buffer.destroy(device);
        }
    }
}

/// Procedural RGBA8 gradient data for all six cube faces, tightly packed.
fn environment_faces(size: u32) -> Vec<u8> {
    // One tint per face, shaded vertically toward the horizon
    const FACE_TINTS: [[f32; 3]; 6] = [
        [0.6, 0.7, 0.9],
        [0.5, 0.6, 0.8],
        [0.8, 0.85, 1.0],
        [0.2, 0.25, 0.3],
        [0.55, 0.65, 0.85],
        [0.5, 0.6, 0.8],
    ];

    let side = size as usize;
    let mut pixels = Vec::with_capacity(side * side * 4 * 6);
    for tint in FACE_TINTS {
        for y in 0..side {
            let shade = 1.0 - 0.5 * (y as f32 / side as f32);
            for _x in 0..side {
                for channel in tint {
                    pixels.push((channel * shade * 255.0) as u8);
                }
                pixels.push(255);
            }
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_data_covers_six_faces() {
        let data = environment_faces(8);
        assert_eq!(data.len(), 8 * 8 * 4 * 6);
        // Alpha is opaque everywhere
        assert!(data.chunks_exact(4).all(|px| px[3] == 255));
    }
}
