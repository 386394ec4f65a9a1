//! Shader module loading.
//!
//! Shader binaries are opaque inputs: they are read from disk as SPIR-V
//! words and wrapped into module handles, nothing more.

use crate::error::{GpuError, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

/// Read a compiled SPIR-V binary from disk.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    ash::util::read_spv(&mut file).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })
}

/// Wrap SPIR-V words into a shader module.
///
/// # Safety
/// The device must be valid and the code must be valid SPIR-V.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = device.create_shader_module(&create_info, None)?;
    Ok(module)
}
