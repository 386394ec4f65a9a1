//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal: driver calls either succeed or indicate an
/// unrecoverable state, so callers propagate with `?` and the binary logs
/// the error and exits. There is no retry path.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Non-success result from a driver call, carried with its symbolic name.
    #[error("Vulkan error: {0:?}")]
    Vulkan(#[from] vk::Result),

    /// No physical device exposes the required queue families.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The selected device has no graphics-capable queue family.
    #[error("No graphics-capable queue family found")]
    NoGraphicsQueue,

    /// The selected device has no compute-capable queue family.
    #[error("No compute-capable queue family found")]
    NoComputeQueue,

    /// No memory type satisfies the resource's requirement mask and the
    /// requested property flags.
    #[error("No compatible memory type for requirements {type_bits:#b} with flags {flags:?}")]
    NoCompatibleMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// None of the candidate depth formats supports depth-stencil attachment.
    #[error("No supported depth-stencil format")]
    NoSupportedDepthFormat,

    /// The layout pair is not in the transition table.
    #[error("Unhandled image layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    /// An image-to-image copy was rejected before recording.
    #[error("Image copy rejected: {0}")]
    CopyMismatch(String),

    /// A shader binary could not be read.
    #[error("Failed to load shader {}: {source}", path.display())]
    ShaderLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
