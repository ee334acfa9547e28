use log::warn;

use crate::layout::AtlasLayout;

/// Cell coordinates stored as integers to avoid a float round-trip through
/// UV space when a region is freed and later reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub pixel_x: u32,
    pub pixel_y: u32,
    pub layer: u32,
}

/// Decides which cell a new sprite occupies.
///
/// Freed cells are reused most-recently-freed first; otherwise the bump
/// cursor advances row-major through the active layer. The allocator never
/// talks to the GPU; layer growth is the atlas's concern.
pub struct SlotAllocator {
    sprite_size: u32,
    sprites_per_row: u32,

    current_layer: u32,
    // next cell in grid units, not texels
    next_x: u32,
    next_y: u32,

    total_sprite_count: u64,
    free_slots: Vec<FreeSlot>,
}

impl SlotAllocator {
    pub fn new(layout: &AtlasLayout) -> Self {
        Self {
            sprite_size: layout.sprite_size(),
            sprites_per_row: layout.sprites_per_row(),
            current_layer: 0,
            next_x: 0,
            next_y: 0,
            total_sprite_count: 0,
            free_slots: Vec::new(),
        }
    }

    /// Pop the most recently freed cell, if any.
    pub fn pop_free(&mut self) -> Option<FreeSlot> {
        self.free_slots.pop()
    }

    /// True when the bump cursor has walked off the end of the active layer.
    pub fn layer_is_full(&self) -> bool {
        self.next_y >= self.sprites_per_row
    }

    /// Take the next bump position and advance the cursor.
    ///
    /// Callers must grow to a fresh layer first when [`Self::layer_is_full`].
    pub fn bump(&mut self) -> FreeSlot {
        debug_assert!(!self.layer_is_full());

        let slot = FreeSlot {
            pixel_x: self.next_x * self.sprite_size,
            pixel_y: self.next_y * self.sprite_size,
            layer: self.current_layer,
        };

        self.next_x += 1;
        if self.next_x >= self.sprites_per_row {
            self.next_x = 0;
            self.next_y += 1;
        }
        self.total_sprite_count += 1;

        slot
    }

    /// Make `layer` the active layer and reset the cursor to its first cell.
    pub fn begin_layer(&mut self, layer: u32) {
        self.current_layer = layer;
        self.next_x = 0;
        self.next_y = 0;
    }

    /// Return a cell to the free list.
    ///
    /// The list is scanned linearly for the same triple first; a duplicate is
    /// logged and ignored so a double free cannot hand one cell to two
    /// callers. The list stays small relative to total capacity, so the scan
    /// is O(n) on purpose.
    pub fn reclaim(&mut self, slot: FreeSlot) -> bool {
        if self.free_slots.contains(&slot) {
            warn!(
                "SlotAllocator: double free detected for slot [x={}, y={}, layer={}] - ignoring",
                slot.pixel_x, slot.pixel_y, slot.layer
            );
            return false;
        }

        self.free_slots.push(slot);
        true
    }

    pub fn current_layer(&self) -> u32 {
        self.current_layer
    }

    pub fn free_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Sprites ever placed through the bump path. Reuse does not count.
    pub fn total_sprite_count(&self) -> u64 {
        self.total_sprite_count
    }

    pub fn reset(&mut self) {
        self.current_layer = 0;
        self.next_x = 0;
        self.next_y = 0;
        self.total_sprite_count = 0;
        self.free_slots.clear();
    }
}
