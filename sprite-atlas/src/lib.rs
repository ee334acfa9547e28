// grid geometry and configuration.
pub mod layout;
// caller-facing handle: layer index plus UV rectangle.
pub mod region;
// bump-cursor cell allocator with LIFO free list.
pub mod slot;
// ring of write-mappable transfer buffers.
pub mod transfer;
// the atlas: layered storage, staging, flush, growth.
pub mod atlas;
// sampling surface (bind group layout / sampler / bind group).
pub mod binding;

pub use atlas::{AtlasStats, SpriteAtlas, SpriteAtlasError};
pub use layout::{AtlasLayout, SpriteAtlasDescriptor};
pub use region::Region;
pub use slot::FreeSlot;
pub use transfer::TransferRing;
