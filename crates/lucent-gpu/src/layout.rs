//! Image layout transitions.
//!
//! The access masks for a transition are looked up in an explicit table
//! keyed by the (old, new) layout pair. A pair outside the table is an
//! error, never a silent default: an unhandled transition is a real bug, and
//! it must surface before the barrier is recorded.

use crate::error::{GpuError, Result};
use ash::vk;

/// Resolve the source/destination access masks for a layout transition.
pub fn transition_access_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<(vk::AccessFlags2, vk::AccessFlags2)> {
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;

    let masks = match (from, to) {
        // Fresh images: nothing to wait on
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (A::NONE, A::TRANSFER_WRITE),
        (L::UNDEFINED, L::TRANSFER_SRC_OPTIMAL) => (A::NONE, A::TRANSFER_READ),
        (L::UNDEFINED, L::GENERAL) => (A::NONE, A::SHADER_READ | A::SHADER_WRITE),
        (L::UNDEFINED, L::SHADER_READ_ONLY_OPTIMAL) => (A::NONE, A::SHADER_READ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (A::NONE, A::COLOR_ATTACHMENT_WRITE),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::NONE,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),

        // Linear images preinitialized by the host
        (L::PREINITIALIZED, L::TRANSFER_DST_OPTIMAL) => (A::HOST_WRITE, A::TRANSFER_WRITE),
        (L::PREINITIALIZED, L::SHADER_READ_ONLY_OPTIMAL) => (A::HOST_WRITE, A::SHADER_READ),

        // After an upload
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ)
        }
        (L::TRANSFER_DST_OPTIMAL, L::GENERAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ | A::SHADER_WRITE)
        }
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (A::TRANSFER_WRITE, A::TRANSFER_READ),

        // After a readback or inter-image copy
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (A::TRANSFER_READ, A::SHADER_READ),
        (L::TRANSFER_SRC_OPTIMAL, L::GENERAL) => {
            (A::TRANSFER_READ, A::SHADER_READ | A::SHADER_WRITE)
        }

        // Sampled images moving to and from the transfer stages
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (A::SHADER_READ, A::TRANSFER_READ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => {
            (A::SHADER_READ, A::TRANSFER_WRITE)
        }

        // Storage images written by compute
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL) => (A::SHADER_WRITE, A::TRANSFER_READ),
        (L::GENERAL, L::SHADER_READ_ONLY_OPTIMAL) => (A::SHADER_WRITE, A::SHADER_READ),

        // Render targets handed to sampling or transfer
        (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::COLOR_ATTACHMENT_WRITE, A::TRANSFER_READ)
        }
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::COLOR_ATTACHMENT_WRITE, A::SHADER_READ)
        }

        _ => return Err(GpuError::UnsupportedLayoutTransition { from, to }),
    };

    Ok(masks)
}

/// Build the barrier for a whole-subresource layout transition.
///
/// Stage masks are ALL_COMMANDS on both sides; the access masks come from
/// the transition table. Used with one-shot submissions where the queue is
/// idled immediately afterwards.
pub fn transition_barrier(
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    layer_count: u32,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<vk::ImageMemoryBarrier2<'static>> {
    let (src_access, dst_access) = transition_access_masks(from, to)?;

    Ok(vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(src_access)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(dst_access)
        .old_layout(from)
        .new_layout(to)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(layer_count),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;

    #[test]
    fn upload_path_masks() {
        let (src, dst) = transition_access_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(src, A::NONE);
        assert_eq!(dst, A::TRANSFER_WRITE);

        let (src, dst) =
            transition_access_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(src, A::TRANSFER_WRITE);
        assert_eq!(dst, A::SHADER_READ);
    }

    #[test]
    fn storage_target_masks() {
        let (src, dst) = transition_access_masks(L::UNDEFINED, L::GENERAL).unwrap();
        assert_eq!(src, A::NONE);
        assert_eq!(dst, A::SHADER_READ | A::SHADER_WRITE);
    }

    #[test]
    fn unhandled_pair_fails_loudly() {
        let result = transition_access_masks(L::TRANSFER_SRC_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL);
        assert!(matches!(
            result,
            Err(GpuError::UnsupportedLayoutTransition {
                from: L::TRANSFER_SRC_OPTIMAL,
                to: L::COLOR_ATTACHMENT_OPTIMAL,
            })
        ));
    }

    #[test]
    fn barrier_covers_all_layers() {
        let barrier = transition_barrier(
            vk::Image::null(),
            vk::ImageAspectFlags::COLOR,
            6,
            L::UNDEFINED,
            L::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(barrier.subresource_range.layer_count, 6);
        assert_eq!(barrier.old_layout, L::UNDEFINED);
        assert_eq!(barrier.new_layout, L::SHADER_READ_ONLY_OPTIMAL);
    }
}
