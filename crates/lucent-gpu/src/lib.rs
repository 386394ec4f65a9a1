//! Vulkan resource lifecycle and synchronization layer for Lucent.
//!
//! This crate provides:
//! - Instance and device management with graphics + compute queue selection
//! - Memory type resolution and uniquely-owned device memory blocks
//! - Buffer and image resources with staged or mapped upload paths
//! - Image layout transition management with an explicit transition table
//! - One-shot command submission, command pools, and frame sync primitives
//! - Swapchain, descriptor, shader-module, and pipeline plumbing

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::Buffer;
pub use command::{execute_one_shot, submit_command_buffers, CommandPool};
pub use context::{DeviceContext, DeviceContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_storage_buffer, write_storage_image, write_uniform_buffer,
    DescriptorPool, DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use image::Image;
pub use memory::{find_memory_type_index, MemoryBlock};
pub use pipeline::{ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig};
pub use shader::load_spirv;
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, reset_fence, wait_for_fence, FrameSync};
