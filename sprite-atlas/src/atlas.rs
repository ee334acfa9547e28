use log::{error, info, trace, warn};
use thiserror::Error;

use crate::binding::{self, AtlasBinding};
use crate::layout::{AtlasLayout, SpriteAtlasDescriptor};
use crate::region::Region;
use crate::slot::{FreeSlot, SlotAllocator};
use crate::transfer::TransferRing;

/// One sprite waiting to be copied into the layered texture.
#[derive(Debug, Clone, Copy)]
struct PendingUpload {
    pixel_x: u32,
    pixel_y: u32,
    layer: u32,
    staging_offset: u64,
}

/// The array texture plus its sampleable view.
///
/// Replaced wholesale during growth; the old texture is released when the
/// handle drops.
struct LayerStorage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    allocated_layers: u32,
}

#[derive(Default)]
struct Counters {
    flushes: u64,
    sync_fallbacks: u64,
    clamped_flushes: u64,
    growths: u64,
}

/// Snapshot of the atlas's book-keeping, taken with [`SpriteAtlas::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtlasStats {
    /// Layers the bump cursor has opened so far.
    pub layer_count: u32,
    /// Layers physically present in the texture.
    pub allocated_layers: u32,
    /// Sprites ever placed through the bump path (reuse does not count).
    pub total_sprites: u64,
    /// Cells currently on the free list.
    pub free_slots: usize,
    /// Sprites staged since the last flush.
    pub pending_uploads: usize,
    /// Bytes currently in the staging buffer.
    pub staged_bytes: usize,
    /// Flushes that performed work (no-op flushes do not count).
    pub flushes: u64,
    /// Flushes that fell back to the synchronous upload path.
    pub sync_fallbacks: u64,
    /// Flushes whose staging bytes were clamped to the transfer buffer size.
    pub clamped_flushes: u64,
    /// Physical texture reallocations.
    pub growths: u64,
}

/// Packs fixed-size RGBA sprites into a layered GPU array texture and
/// streams their pixel data to the device through a ring of write-mappable
/// transfer buffers.
///
/// Not thread-safe: every method expects the one rendering thread
/// (single-writer contract). Callers own the returned [`Region`]s until they
/// pass them back to [`Self::free_slot`]; the atlas keeps no back-references
/// to issued regions and never evicts on its own.
///
/// Call [`Self::flush`] once per frame before sampling; sprites added since
/// the previous flush are not on the device until then.
pub struct SpriteAtlas {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: AtlasLayout,

    storage: Option<LayerStorage>,
    transfer: Option<TransferRing>,
    layer_count: u32,

    slots: SlotAllocator,
    pending_uploads: Vec<PendingUpload>,
    staging: Vec<u8>,

    binding: AtlasBinding,
    counters: Counters,
}

impl SpriteAtlas {
    /// Validate the descriptor and store the device handles. No GPU resources
    /// are created until [`Self::initialize`].
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        desc: SpriteAtlasDescriptor,
    ) -> Result<Self, SpriteAtlasError> {
        let layout = AtlasLayout::new(desc)?;

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            layout,
            storage: None,
            transfer: None,
            layer_count: 0,
            slots: SlotAllocator::new(&layout),
            pending_uploads: Vec::new(),
            staging: Vec::new(),
            binding: AtlasBinding::new(),
            counters: Counters::default(),
        })
    }

    /// Allocate the array texture and the transfer ring.
    ///
    /// `initial_layers` is clamped to `1..=max_layers`. Idempotent: calling
    /// again on an initialized atlas does nothing.
    pub fn initialize(&mut self, initial_layers: u32) -> Result<(), SpriteAtlasError> {
        if self.storage.is_some() {
            trace!("SpriteAtlas::initialize: already initialized");
            return Ok(());
        }

        let initial_layers = initial_layers.clamp(1, self.layout.max_layers());
        let (texture, view) = Self::create_texture_and_view(&self.device, &self.layout, initial_layers);

        self.storage = Some(LayerStorage {
            texture,
            view,
            allocated_layers: initial_layers,
        });
        self.transfer = Some(TransferRing::new(
            &self.device,
            self.layout.transfer_buffer_bytes(),
            self.layout.transfer_ring_depth(),
        ));

        // Start with one active layer; the rest of the allocation is spare
        // capacity the bump cursor has not opened yet.
        self.layer_count = 1;
        self.slots.begin_layer(0);

        info!(
            "SpriteAtlas created: {size}x{size} x {initial_layers} layers",
            size = self.layout.atlas_size()
        );
        Ok(())
    }

    /// Add one sprite payload (`sprite_size * sprite_size * 4` RGBA bytes).
    ///
    /// Returns where the sprite will live. The pixel data reaches the device
    /// on the next [`Self::flush`].
    pub fn add_sprite(&mut self, rgba: &[u8]) -> Result<Region, SpriteAtlasError> {
        if !self.is_valid() {
            error!("SpriteAtlas::add_sprite called on uninitialized atlas");
            return Err(SpriteAtlasError::NotInitialized);
        }

        let expected = self.layout.sprite_payload_bytes();
        if rgba.len() != expected {
            error!(
                "SpriteAtlas::add_sprite called with {} bytes of payload, expected {expected}",
                rgba.len()
            );
            return Err(SpriteAtlasError::InvalidPayloadSize {
                expected,
                got: rgba.len(),
            });
        }

        // Freed cells first (most recently freed wins), then the bump cursor.
        let slot = match self.slots.pop_free() {
            Some(slot) => slot,
            None => {
                if self.slots.layer_is_full() {
                    self.add_layer()?;
                }
                self.slots.bump()
            }
        };

        // Back-pressure: flush before the staging buffer outgrows one
        // transfer buffer.
        let staged_sprite = self.layout.staged_sprite_bytes();
        let overflows = self
            .transfer
            .as_ref()
            .is_some_and(|ring| (self.staging.len() + staged_sprite) as u64 > ring.size());
        if overflows {
            self.flush();
        }

        let staging_offset = self.stage_payload(rgba);
        self.pending_uploads.push(PendingUpload {
            pixel_x: slot.pixel_x,
            pixel_y: slot.pixel_y,
            layer: slot.layer,
            staging_offset,
        });

        Ok(Region::new(
            &self.layout,
            slot.layer,
            slot.pixel_x,
            slot.pixel_y,
        ))
    }

    /// Return a region's cell to the free list for reuse.
    ///
    /// Double frees and malformed regions are logged and ignored. The atlas
    /// cannot tell a stale region (freed and since reallocated to another
    /// caller) from a live one; regions carry no generation.
    pub fn free_slot(&mut self, region: Region) {
        let sprite_size = self.layout.sprite_size();
        let atlas_size = self.layout.atlas_size();
        let malformed = region.pixel_x % sprite_size != 0
            || region.pixel_y % sprite_size != 0
            || region.pixel_x + sprite_size > atlas_size
            || region.pixel_y + sprite_size > atlas_size
            || region.layer >= self.layer_count;
        if malformed {
            warn!(
                "SpriteAtlas::free_slot called with malformed region [x={}, y={}, layer={}] - ignoring",
                region.pixel_x, region.pixel_y, region.layer
            );
            return;
        }

        self.slots.reclaim(FreeSlot {
            pixel_x: region.pixel_x,
            pixel_y: region.pixel_y,
            layer: region.layer,
        });
    }

    /// Move every staged sprite to the device and clear the pending state.
    ///
    /// No-op when nothing is pending. Prefers one batched copy through the
    /// transfer ring; falls back to synchronous per-sprite writes when the
    /// ring's current buffer is still in flight.
    pub fn flush(&mut self) {
        if self.pending_uploads.is_empty() {
            return;
        }

        let Some(storage) = self.storage.as_ref() else {
            // Pending uploads cannot outlive storage, but never let them leak.
            self.pending_uploads.clear();
            self.staging.clear();
            return;
        };

        let sprite_size = self.layout.sprite_size();
        let padded_row = self.layout.padded_row_bytes();
        let staged_sprite = self.layout.staged_sprite_bytes() as u64;

        let mut uploaded = false;
        if let Some(ring) = self.transfer.as_mut() {
            let ring_size = ring.size();
            let copy_len = if let Some(mut mapped) = ring.map_write() {
                let copy_len = self.staging.len().min(ring_size as usize);
                if self.staging.len() > copy_len {
                    // Sprites past the clamp are dropped on the floor; wrong
                    // pixels beat out-of-bounds writes.
                    error!(
                        "SpriteAtlas: staging buffer overflowed the transfer buffer ({} > {ring_size} bytes), clamping",
                        self.staging.len()
                    );
                    self.counters.clamped_flushes += 1;
                }
                mapped[..copy_len].copy_from_slice(&self.staging[..copy_len]);
                drop(mapped);
                Some(copy_len)
            } else {
                None
            };
            if let Some(copy_len) = copy_len {
                ring.unmap();

                let mut encoder =
                    self.device
                        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                            label: Some("SpriteAtlas Flush Encoder"),
                        });
                for upload in &self.pending_uploads {
                    if upload.staging_offset + staged_sprite > copy_len as u64 {
                        continue;
                    }
                    encoder.copy_buffer_to_texture(
                        wgpu::TexelCopyBufferInfo {
                            buffer: ring.buffer(),
                            layout: wgpu::TexelCopyBufferLayout {
                                offset: upload.staging_offset,
                                bytes_per_row: Some(padded_row),
                                rows_per_image: None,
                            },
                        },
                        wgpu::TexelCopyTextureInfo {
                            texture: &storage.texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d {
                                x: upload.pixel_x,
                                y: upload.pixel_y,
                                z: upload.layer,
                            },
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: sprite_size,
                            height: sprite_size,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                self.queue.submit(Some(encoder.finish()));
                ring.advance();
                uploaded = true;
            }
        }

        if !uploaded {
            if self.transfer.is_some() {
                warn!("SpriteAtlas: transfer buffer map unavailable, falling back to sync upload");
                self.counters.sync_fallbacks += 1;
            }
            for upload in &self.pending_uploads {
                let start = upload.staging_offset as usize;
                let end = start + staged_sprite as usize;
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &storage.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: upload.pixel_x,
                            y: upload.pixel_y,
                            z: upload.layer,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &self.staging[start..end],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: None,
                    },
                    wgpu::Extent3d {
                        width: sprite_size,
                        height: sprite_size,
                        depth_or_array_layers: 1,
                    },
                );
            }
        }

        self.counters.flushes += 1;
        self.pending_uploads.clear();
        self.staging.clear();
    }

    /// Open the next layer, physically growing the texture when the spare
    /// capacity is used up.
    fn add_layer(&mut self) -> Result<(), SpriteAtlasError> {
        // Pending uploads target the current texture and growth replaces it;
        // they must land first, unconditionally.
        self.flush();

        let max_layers = self.layout.max_layers();
        if self.layer_count >= max_layers {
            error!("SpriteAtlas: max layers ({max_layers}) reached");
            return Err(SpriteAtlasError::AtlasFull { max_layers });
        }

        let allocated_layers = self
            .storage
            .as_ref()
            .map(|storage| storage.allocated_layers)
            .ok_or(SpriteAtlasError::NotInitialized)?;

        if self.layer_count >= allocated_layers {
            // Grow in chunks: reallocation copies every existing layer, so it
            // must stay rare, but each step also spikes VRAM by its own size.
            let new_allocated = (allocated_layers + self.layout.growth_chunk()).min(max_layers);
            info!("SpriteAtlas: expanding {allocated_layers} -> {new_allocated} layers");

            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

            let (new_texture, new_view) =
                Self::create_texture_and_view(&self.device, &self.layout, new_allocated);

            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("SpriteAtlas Growth Encoder"),
                });
            if let Some(storage) = self.storage.as_ref() {
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &storage.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: &new_texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: self.layout.atlas_size(),
                        height: self.layout.atlas_size(),
                        depth_or_array_layers: allocated_layers,
                    },
                );
            }
            self.queue.submit(Some(encoder.finish()));

            // pop_error_scope resolves synchronously on native backends.
            let oom = pollster::block_on(self.device.pop_error_scope());
            let validation = pollster::block_on(self.device.pop_error_scope());
            if let Some(err) = oom.or(validation) {
                error!(
                    "SpriteAtlas: device error while expanding to {new_allocated} layers, keeping {allocated_layers}: {err}"
                );
                return Err(SpriteAtlasError::GrowthFailed {
                    reason: err.to_string(),
                });
            }

            self.storage = Some(LayerStorage {
                texture: new_texture,
                view: new_view,
                allocated_layers: new_allocated,
            });
            self.binding.invalidate();
            self.counters.growths += 1;
        }

        self.layer_count += 1;
        self.slots.begin_layer(self.layer_count - 1);
        Ok(())
    }

    /// Release the GPU resources and reset all book-keeping. The atlas can be
    /// initialized again afterwards. Dropping the atlas releases the same
    /// resources without the reset.
    pub fn release(&mut self) {
        if self.storage.is_some() {
            info!("SpriteAtlas: releasing resources");
        }
        self.storage = None;
        self.transfer = None;
        self.binding.invalidate();
        self.layer_count = 0;
        self.slots.reset();
        self.pending_uploads.clear();
        self.staging.clear();
        self.counters = Counters::default();
    }

    pub fn is_valid(&self) -> bool {
        self.storage.is_some()
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn texture(&self) -> Option<&wgpu::Texture> {
        self.storage.as_ref().map(|storage| &storage.texture)
    }

    /// `D2Array` view over every allocated layer, for sampling.
    pub fn texture_view(&self) -> Option<&wgpu::TextureView> {
        self.storage.as_ref().map(|storage| &storage.view)
    }

    /// The bind group layout pipelines sampling the atlas should use.
    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        binding::bind_group_layout(device)
    }

    /// Bind group pairing the atlas view with its nearest/clamp sampler.
    ///
    /// Cached between calls; growth replaces the texture and drops the cache,
    /// so re-fetch this every frame rather than holding one.
    pub fn bind_group(&mut self) -> Option<wgpu::BindGroup> {
        let storage = self.storage.as_ref()?;
        Some(
            self.binding
                .bind_group(&self.device, &storage.view)
                .clone(),
        )
    }

    pub fn stats(&self) -> AtlasStats {
        AtlasStats {
            layer_count: self.layer_count,
            allocated_layers: self
                .storage
                .as_ref()
                .map_or(0, |storage| storage.allocated_layers),
            total_sprites: self.slots.total_sprite_count(),
            free_slots: self.slots.free_count(),
            pending_uploads: self.pending_uploads.len(),
            staged_bytes: self.staging.len(),
            flushes: self.counters.flushes,
            sync_fallbacks: self.counters.sync_fallbacks,
            clamped_flushes: self.counters.clamped_flushes,
            growths: self.counters.growths,
        }
    }

    /// Append one payload to the staging buffer, padding each row out to the
    /// copy alignment, and return the offset it was staged at.
    fn stage_payload(&mut self, rgba: &[u8]) -> u64 {
        let offset = self.staging.len();
        let row_bytes = self.layout.sprite_row_bytes() as usize;
        let padded_row = self.layout.padded_row_bytes() as usize;

        self.staging.reserve(self.layout.staged_sprite_bytes());
        for row in rgba.chunks_exact(row_bytes) {
            self.staging.extend_from_slice(row);
            self.staging.resize(self.staging.len() + (padded_row - row_bytes), 0);
        }

        offset as u64
    }

    fn create_texture_and_view(
        device: &wgpu::Device,
        layout: &AtlasLayout,
        layers: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sprite_atlas_texture"),
            size: wgpu::Extent3d {
                width: layout.atlas_size(),
                height: layout.atlas_size(),
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("sprite_atlas_texture_view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::All,
            ..Default::default()
        });

        (texture, view)
    }
}

#[derive(Error, Debug)]
pub enum SpriteAtlasError {
    #[error("invalid atlas descriptor: {reason}")]
    InvalidDescriptor { reason: &'static str },
    #[error("the atlas is not initialized")]
    NotInitialized,
    #[error("sprite payload must be {expected} bytes, got {got}")]
    InvalidPayloadSize { expected: usize, got: usize },
    #[error("the atlas is full ({max_layers} layers reached)")]
    AtlasFull { max_layers: u32 },
    #[error("device error while growing the atlas: {reason}")]
    GrowthFailed { reason: String },
}
