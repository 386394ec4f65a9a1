//! Sample history: recent traced frames kept in an array texture.

use ash::vk;
use lucent_gpu::command::CommandPool;
use lucent_gpu::context::DeviceContext;
use lucent_gpu::error::Result;
use lucent_gpu::Image;

/// Ring cursor over the history layers.
#[derive(Debug, Clone, Copy)]
struct LayerCursor {
    next: u32,
    layers: u32,
    written: bool,
}

impl LayerCursor {
    fn new(layers: u32) -> Self {
        Self {
            next: 0,
            layers,
            written: false,
        }
    }

    /// Claim the next slot and return its layer index.
    fn advance(&mut self) -> u32 {
        let layer = self.next;
        self.next = (self.next + 1) % self.layers;
        self.written = true;
        layer
    }

    /// The most recently written layer, if any frame has been pushed.
    fn most_recent(&self) -> Option<u32> {
        if !self.written {
            return None;
        }
        Some((self.next + self.layers - 1) % self.layers)
    }
}

/// A ring of past traced frames held in one array texture.
///
/// Each push snapshots the traced image into the next layer through an
/// inter-image copy, so shaders can blend recent samples by layer index.
pub struct SampleHistory {
    texture: Image,
    cursor: LayerCursor,
}

impl SampleHistory {
    /// Create the history store with `layers` slots.
    ///
    /// # Safety
    /// The context and pool must be valid.
    pub unsafe fn new(
        ctx: &DeviceContext,
        pool: &CommandPool,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<Self> {
        let texture = Image::texture(
            ctx,
            pool,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            None,
            width,
            height,
            layers,
        )?;

        Ok(Self {
            texture,
            cursor: LayerCursor::new(layers),
        })
    }

    /// Snapshot the traced image into the next history layer.
    ///
    /// The store transitions to transfer-destination for the copy and back
    /// to shader-read afterwards, so it is always sampleable at rest.
    ///
    /// # Safety
    /// The context and pool must be valid; the source must be in a
    /// transfer-readable layout.
    pub unsafe fn push(
        &mut self,
        ctx: &DeviceContext,
        pool: &CommandPool,
        traced: &Image,
    ) -> Result<u32> {
        self.texture
            .transition_layout(ctx, pool, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let layer = self.cursor.advance();
        traced.copy_to(ctx, pool, &self.texture, 0, layer)?;

        self.texture
            .transition_layout(ctx, pool, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        Ok(layer)
    }

    /// The most recently written layer, if any.
    pub fn most_recent_layer(&self) -> Option<u32> {
        self.cursor.most_recent()
    }

    /// The history texture (array view over all layers).
    pub fn texture(&self) -> &Image {
        &self.texture
    }

    /// Destroy the history texture.
    ///
    /// # Safety
    /// The device must be valid and the texture must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.texture.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_around() {
        let mut cursor = LayerCursor::new(3);
        assert_eq!(cursor.advance(), 0);
        assert_eq!(cursor.advance(), 1);
        assert_eq!(cursor.advance(), 2);
        assert_eq!(cursor.advance(), 0);
    }

    #[test]
    fn most_recent_tracks_last_write() {
        let mut cursor = LayerCursor::new(3);
        assert_eq!(cursor.most_recent(), None);
        cursor.advance();
        assert_eq!(cursor.most_recent(), Some(0));
        cursor.advance();
        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.most_recent(), Some(0));
    }
}
