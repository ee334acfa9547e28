use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{trace, warn};

/// Ring of write-mappable buffers used to stream staged sprite bytes to the
/// device without stalling the caller.
///
/// One buffer is written and consumed per flush; `advance` rotates to the
/// next backing buffer and schedules an asynchronous re-map of the one just
/// used, so by the time the ring cycles back the map has usually completed.
/// `map_write` never blocks: when the current buffer is still in flight it
/// returns `None` and the caller takes its synchronous path instead.
///
/// Not thread-safe; single-writer like the rest of the crate. The completion
/// flags are atomics only because wgpu map callbacks must be `Send`.
pub struct TransferRing {
    device: wgpu::Device,
    buffers: Vec<RingBuffer>,
    size: u64,
    index: usize,
    advances: u64,
}

struct RingBuffer {
    buffer: wgpu::Buffer,
    // true while the buffer is mapped and writable
    map_ready: Arc<AtomicBool>,
    // true while a map_async request has not called back yet
    map_inflight: Arc<AtomicBool>,
}

impl TransferRing {
    /// Create `depth` buffers of `size` bytes each.
    ///
    /// All buffers start mapped (`mapped_at_creation`), so the first `depth`
    /// flushes are guaranteed the fast path.
    pub fn new(device: &wgpu::Device, size: u64, depth: u32) -> Self {
        let buffers = (0..depth)
            .map(|i| RingBuffer {
                buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("sprite_atlas_transfer_buffer_{i}")),
                    size,
                    usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: true,
                }),
                map_ready: Arc::new(AtomicBool::new(true)),
                map_inflight: Arc::new(AtomicBool::new(false)),
            })
            .collect();

        trace!("TransferRing: created {depth} buffers of {size} bytes");

        Self {
            device: device.clone(),
            buffers,
            size,
            index: 0,
            advances: 0,
        }
    }

    /// Size of one backing buffer in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn depth(&self) -> usize {
        self.buffers.len()
    }

    /// Index of the buffer the next flush will write into.
    pub fn index(&self) -> usize {
        self.index
    }

    /// How many times the ring has rotated.
    pub fn advances(&self) -> u64 {
        self.advances
    }

    /// Map the current buffer for writing, without blocking.
    ///
    /// Drains completed map callbacks with one non-blocking device poll; if
    /// the current buffer is still not mapped after that, returns `None`.
    pub fn map_write(&mut self) -> Option<wgpu::BufferViewMut<'_>> {
        let _ = self.device.poll(wgpu::PollType::Poll);

        if !self.buffers[self.index].map_ready.load(Ordering::Acquire) {
            // A failed map leaves the buffer unmapped with no request in
            // flight; re-request it so one bad map does not pin this slot to
            // the synchronous path forever.
            if !self.buffers[self.index].map_inflight.load(Ordering::Acquire) {
                self.request_map(self.index);
            }
            let _ = self.device.poll(wgpu::PollType::Poll);
            if !self.buffers[self.index].map_ready.load(Ordering::Acquire) {
                return None;
            }
        }

        let slot = &self.buffers[self.index];
        Some(slot.buffer.slice(..).get_mapped_range_mut())
    }

    /// Unmap the current buffer after writing. Must pair with a successful
    /// [`Self::map_write`].
    pub fn unmap(&mut self) {
        let slot = &self.buffers[self.index];
        if slot.map_ready.swap(false, Ordering::AcqRel) {
            slot.buffer.unmap();
        }
    }

    /// The buffer copy commands should source from: the one most recently
    /// written and unmapped.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffers[self.index].buffer
    }

    /// Rotate to the next backing buffer.
    ///
    /// The buffer just consumed gets an asynchronous write-map request; wgpu
    /// completes it once any submitted work reading the buffer has finished.
    pub fn advance(&mut self) {
        self.request_map(self.index);
        self.index = (self.index + 1) % self.buffers.len();
        self.advances += 1;
    }

    fn request_map(&mut self, index: usize) {
        let slot = &self.buffers[index];
        if slot.map_ready.load(Ordering::Acquire) || slot.map_inflight.load(Ordering::Acquire) {
            return;
        }

        slot.map_inflight.store(true, Ordering::Release);
        let ready = Arc::clone(&slot.map_ready);
        let inflight = Arc::clone(&slot.map_inflight);
        slot.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Write, move |result| {
                match result {
                    Ok(()) => ready.store(true, Ordering::Release),
                    Err(err) => warn!("TransferRing: write map failed: {err}"),
                }
                inflight.store(false, Ordering::Release);
            });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn noop_device() -> (wgpu::Instance, wgpu::Adapter, wgpu::Device, wgpu::Queue) {
        pollster::block_on(gpu_utils::wgpu_utils::noop_wgpu())
    }

    /// Buffers start mapped, so a fresh ring always takes the fast path.
    #[test]
    fn fresh_ring_maps_immediately() {
        let (_instance, _adapter, device, _queue) = noop_device();
        let mut ring = TransferRing::new(&device, 4096, 3);

        assert_eq!(ring.size(), 4096);
        assert_eq!(ring.depth(), 3);
        assert_eq!(ring.index(), 0);

        let mut view = ring.map_write().expect("fresh buffer is mapped");
        view[..4].copy_from_slice(&[1, 2, 3, 4]);
        drop(view);
        ring.unmap();
    }

    /// Each advance rotates to the next buffer; the first `depth` flushes all
    /// find a creation-mapped buffer.
    #[test]
    fn advance_rotates_through_every_buffer() {
        let (_instance, _adapter, device, _queue) = noop_device();
        let mut ring = TransferRing::new(&device, 1024, 2);

        for expected_index in [0, 1] {
            assert_eq!(ring.index(), expected_index);
            let view = ring.map_write().expect("creation-mapped buffer");
            drop(view);
            ring.unmap();
            ring.advance();
        }

        assert_eq!(ring.index(), 0);
        assert_eq!(ring.advances(), 2);
    }

    /// Once the ring cycles back to a consumed buffer, map_write either finds
    /// the re-map completed or reports unavailability; it never blocks or
    /// panics.
    #[test]
    fn cycled_buffer_is_polled_not_awaited() {
        let (_instance, _adapter, device, _queue) = noop_device();
        let mut ring = TransferRing::new(&device, 1024, 1);

        let view = ring.map_write().expect("creation-mapped buffer");
        drop(view);
        ring.unmap();
        ring.advance();
        assert_eq!(ring.index(), 0);

        // The re-map request may or may not have completed; both outcomes are
        // valid, only blocking would be a bug.
        let mapped = ring.map_write().is_some();
        if mapped {
            ring.unmap();
        }
    }
}
