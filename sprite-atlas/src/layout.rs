use crate::atlas::SpriteAtlasError;

/// Descriptor used to configure and create a `SpriteAtlas`.
///
/// The defaults reproduce the atlas geometry the renderer was tuned for:
/// 4096x4096 layers of 32x32 sprites, 128 sprites per row, 16384 per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteAtlasDescriptor {
    /// Edge length of one square layer, in texels.
    pub atlas_size: u32,
    /// Edge length of one sprite cell, in texels. Must divide `atlas_size`.
    pub sprite_size: u32,
    /// Hard ceiling on the number of layers the atlas may ever hold.
    pub max_layers: u32,
    /// How many layers each physical reallocation adds at once.
    pub growth_chunk: u32,
    /// How many sprite payloads one transfer buffer holds.
    pub transfer_batch: u32,
    /// Number of backing buffers in the transfer ring.
    pub transfer_ring_depth: u32,
}

impl Default for SpriteAtlasDescriptor {
    fn default() -> Self {
        Self {
            atlas_size: 4096,
            sprite_size: 32,
            max_layers: 64,
            growth_chunk: 4,
            transfer_batch: 256,
            transfer_ring_depth: 3,
        }
    }
}

/// Validated geometry derived from a [`SpriteAtlasDescriptor`].
///
/// Every coordinate the atlas hands out is expressed in terms of this layout;
/// it never changes for the lifetime of the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    atlas_size: u32,
    sprite_size: u32,
    max_layers: u32,
    growth_chunk: u32,
    transfer_batch: u32,
    transfer_ring_depth: u32,

    sprites_per_row: u32,
    sprites_per_layer: u32,
    // tightly packed bytes in one sprite row (sprite_size * 4)
    sprite_row_bytes: u32,
    // one sprite row padded to COPY_BYTES_PER_ROW_ALIGNMENT for buffer->texture copies
    padded_row_bytes: u32,
}

impl AtlasLayout {
    pub fn new(desc: SpriteAtlasDescriptor) -> Result<Self, SpriteAtlasError> {
        if desc.sprite_size == 0 || desc.atlas_size == 0 {
            return Err(SpriteAtlasError::InvalidDescriptor {
                reason: "atlas_size and sprite_size must be nonzero",
            });
        }
        if desc.sprite_size > desc.atlas_size || desc.atlas_size % desc.sprite_size != 0 {
            return Err(SpriteAtlasError::InvalidDescriptor {
                reason: "atlas_size must be a multiple of sprite_size",
            });
        }
        if desc.max_layers == 0 {
            return Err(SpriteAtlasError::InvalidDescriptor {
                reason: "max_layers must be at least 1",
            });
        }
        if desc.growth_chunk == 0 {
            return Err(SpriteAtlasError::InvalidDescriptor {
                reason: "growth_chunk must be at least 1",
            });
        }
        if desc.transfer_batch == 0 || desc.transfer_ring_depth == 0 {
            return Err(SpriteAtlasError::InvalidDescriptor {
                reason: "transfer_batch and transfer_ring_depth must be at least 1",
            });
        }

        let sprites_per_row = desc.atlas_size / desc.sprite_size;
        let sprite_row_bytes = desc.sprite_size * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row_bytes = sprite_row_bytes.div_ceil(align) * align;

        Ok(Self {
            atlas_size: desc.atlas_size,
            sprite_size: desc.sprite_size,
            max_layers: desc.max_layers,
            growth_chunk: desc.growth_chunk,
            transfer_batch: desc.transfer_batch,
            transfer_ring_depth: desc.transfer_ring_depth,
            sprites_per_row,
            sprites_per_layer: sprites_per_row * sprites_per_row,
            sprite_row_bytes,
            padded_row_bytes,
        })
    }

    pub fn atlas_size(&self) -> u32 {
        self.atlas_size
    }

    pub fn sprite_size(&self) -> u32 {
        self.sprite_size
    }

    pub fn max_layers(&self) -> u32 {
        self.max_layers
    }

    pub fn growth_chunk(&self) -> u32 {
        self.growth_chunk
    }

    pub fn transfer_ring_depth(&self) -> u32 {
        self.transfer_ring_depth
    }

    pub fn sprites_per_row(&self) -> u32 {
        self.sprites_per_row
    }

    pub fn sprites_per_layer(&self) -> u32 {
        self.sprites_per_layer
    }

    /// Size of one caller-supplied RGBA payload in bytes.
    pub fn sprite_payload_bytes(&self) -> usize {
        (self.sprite_size * self.sprite_size * 4) as usize
    }

    pub fn sprite_row_bytes(&self) -> u32 {
        self.sprite_row_bytes
    }

    pub fn padded_row_bytes(&self) -> u32 {
        self.padded_row_bytes
    }

    /// Bytes one sprite occupies in the staging buffer (row-padded).
    pub fn staged_sprite_bytes(&self) -> usize {
        (self.padded_row_bytes * self.sprite_size) as usize
    }

    /// Size of one transfer buffer in bytes.
    pub fn transfer_buffer_bytes(&self) -> u64 {
        self.staged_sprite_bytes() as u64 * self.transfer_batch as u64
    }
}
