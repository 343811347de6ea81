//! Deferred reclamation for data shared with lock-free readers
//!
//! Track details (metadata + waveform) are published to the UI through
//! `basedrop::SharedCell`, so the reader never takes a lock and the
//! writer never frees memory a reader might still hold. Dropping a
//! `Shared<T>` only enqueues the pointer; [`Reclaimer::run`] frees the
//! queue on its own thread, where latency does not matter.
//!
//! The reclaimer is part of the core's task set, not a global: it is
//! constructed during wiring, its allocation [`handle`](Reclaimer::handle)
//! is given to the publishers, and `rt` spawns and shuts it down together
//! with the audio, I/O and stream tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use basedrop::{Collector, Handle};

/// Collection cadence; reclamation is not latency-sensitive
const COLLECT_PERIOD: Duration = Duration::from_millis(100);

/// Owner of the deferred-drop queue
pub struct Reclaimer {
    collector: Collector,
}

impl Reclaimer {
    pub fn new() -> Self {
        Self {
            collector: Collector::new(),
        }
    }

    /// Cloneable handle for allocating `Shared<T>` values
    pub fn handle(&self) -> Handle {
        self.collector.handle()
    }

    /// Allocations queued or still live, for diagnostics
    pub fn backlog(&self) -> usize {
        self.collector.alloc_count()
    }

    /// Free queued drops periodically until `shutdown` is raised
    ///
    /// Performs a final sweep on the way out and reports anything a
    /// leaked handle keeps pinned.
    pub fn run(mut self, shutdown: &AtomicBool) {
        log::info!("reclaim task running");

        while !shutdown.load(Ordering::Relaxed) {
            self.collector.collect();
            std::thread::sleep(COLLECT_PERIOD);
        }

        self.collector.collect();

        let pinned = self.collector.alloc_count();
        if pinned > 0 {
            log::warn!("{pinned} shared allocations still live at shutdown");
        }
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}
