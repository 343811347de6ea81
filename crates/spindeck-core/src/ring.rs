//! In-place single-producer/single-consumer sector ring
//!
//! One ring per deck carries raw sectors from the stream task to the audio
//! task. Unlike a by-value queue, entries are filled **in place**: the
//! producer reserves a slot with [`Producer::begin`], reads the sector from
//! storage directly into it, then publishes with [`Producer::commit`] (or
//! walks away, abandoning the reservation, when the read fails). The
//! consumer peeks at the oldest committed entry and consumes it separately,
//! which is what lets the sampler discard stale entries until it finds the
//! chunk it wants.
//!
//! The reservation and peek borrows are the protocol tokens: holding
//! `&mut SectorEntry` from `begin` prevents a second reservation, and the
//! `&SectorEntry` from `peek` ends before `advance` can run.
//!
//! Memory ordering follows the usual SPSC scheme: positions are monotonic
//! counters, the writer of a position stores with `Release` and the other
//! side loads with `Acquire`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::track::Sector;

/// One ring entry: a raw sector tagged with its chunk index
pub struct SectorEntry {
    pub chunk: i32,
    pub sector: Sector,
}

struct Shared {
    entries: Box<[UnsafeCell<SectorEntry>]>,
    /// Total sectors ever committed
    head: AtomicUsize,
    /// Total sectors ever consumed
    tail: AtomicUsize,
}

// Slots in [tail, head) are only read by the consumer; the slot at head is
// only written by the producer before it is published. The two positions
// are the only shared state.
unsafe impl Sync for Shared {}

/// Create a ring holding up to `capacity` sectors
pub fn sector_ring(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity > 0);

    let entries = (0..capacity)
        .map(|_| {
            UnsafeCell::new(SectorEntry {
                chunk: -1,
                sector: Sector::zeroed(),
            })
        })
        .collect();

    let shared = Arc::new(Shared {
        entries,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
            reserved: false,
        },
        Consumer { shared },
    )
}

/// Write half of a sector ring (owned by the stream task)
pub struct Producer {
    shared: Arc<Shared>,
    reserved: bool,
}

impl Producer {
    /// Reserve the next entry for writing
    ///
    /// Returns `None` when the ring is full. The reservation is not
    /// visible to the consumer until [`commit`](Self::commit); dropping it
    /// without committing abandons the entry.
    pub fn begin(&mut self) -> Option<&mut SectorEntry> {
        debug_assert!(!self.reserved, "begin() while a reservation is live");

        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= self.shared.entries.len() {
            return None;
        }

        self.reserved = true;
        let slot = &self.shared.entries[head % self.shared.entries.len()];

        // Sound: this slot is outside [tail, head), so only the producer
        // touches it, and `&mut self` prevents a second reservation.
        Some(unsafe { &mut *slot.get() })
    }

    /// Publish the entry reserved by the last [`begin`](Self::begin)
    pub fn commit(&mut self) {
        debug_assert!(self.reserved, "commit() without a reservation");
        self.reserved = false;

        let head = self.shared.head.load(Ordering::Relaxed);
        self.shared.head.store(head.wrapping_add(1), Ordering::Release);
    }

    /// Drop the current reservation without publishing
    pub fn abandon(&mut self) {
        self.reserved = false;
    }

    /// Committed entries currently buffered
    pub fn len(&self) -> usize {
        let head = self.shared.head.load(Ordering::Relaxed);
        let tail = self.shared.tail.load(Ordering::Acquire);

        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.entries.len()
    }
}

/// Read half of a sector ring (owned by the audio task)
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Borrow the oldest committed entry without consuming it
    pub fn peek(&self) -> Option<&SectorEntry> {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = &self.shared.entries[tail % self.shared.entries.len()];

        // Sound: committed entries are never written again until consumed.
        Some(unsafe { &*slot.get() })
    }

    /// Chunk index of the oldest committed entry
    pub fn peek_chunk(&self) -> Option<i32> {
        self.peek().map(|entry| entry.chunk)
    }

    /// Consume the oldest committed entry
    ///
    /// Must only be called after a successful [`peek`](Self::peek).
    pub fn advance(&mut self) {
        let tail = self.shared.tail.load(Ordering::Relaxed);

        debug_assert_ne!(
            tail,
            self.shared.head.load(Ordering::Acquire),
            "advance() on an empty ring"
        );

        self.shared.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Committed entries currently buffered
    pub fn len(&self) -> usize {
        let tail = self.shared.tail.load(Ordering::Relaxed);
        let head = self.shared.head.load(Ordering::Acquire);

        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
