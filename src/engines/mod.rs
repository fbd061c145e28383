//! The two execution strategies and the bookkeeping they share.
//!
//! Both engines implement [`ExecutionStrategy`] and are driven through
//! generics, never through a trait object: the profiler and the analysis
//! session are monomorphized per engine.

pub mod eager;
pub mod planned;

use std::borrow::Cow;

use serde::Serialize;

use crate::errors::ShapeResult;
use crate::tensor::Batch;

pub use eager::EagerEngine;
pub use planned::PlannedEngine;

/// Common surface of the eager and planned engines.
pub trait ExecutionStrategy: Send {
    /// Short label used in logs and reports.
    fn name(&self) -> &'static str;

    /// Runs one forward pass. Shape errors are raised before any write.
    ///
    /// The eager engine hands out a freshly allocated vector, the planned
    /// engine a view into its own output buffer.
    fn execute(&mut self, input: &Batch) -> ShapeResult<Cow<'_, [f32]>>;

    /// Memory held while running, as attributed by the engine itself.
    fn memory_footprint(&self) -> MemoryFootprint;

    /// Heap allocations performed by the most recent `execute` call.
    fn allocation_events(&self) -> usize;
}

/// Memory attributed to one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryFootprint {
    /// Maximum bytes simultaneously live during one forward pass.
    pub peak_bytes: usize,
    /// Bytes allocated per forward pass (eager) or once up front (planned).
    pub allocated_bytes: usize,
    /// Number of distinct buffers behind `allocated_bytes`.
    pub buffers: usize,
}

/// One buffer allocated by the eager engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationEvent {
    /// Ordinal of the operation that allocated the buffer.
    pub ordinal: usize,
    pub tensor: &'static str,
    pub bytes: usize,
    /// Ordinal of the last operation that still holds the buffer.
    pub released_at: usize,
}

impl AllocationEvent {
    fn is_live_at(&self, ordinal: usize) -> bool {
        self.ordinal <= ordinal && ordinal <= self.released_at
    }
}

/// Allocation and release record of a single forward pass.
#[derive(Debug, Clone, Default)]
pub struct AllocationLog {
    events: Vec<AllocationEvent>,
}

impl AllocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the previous pass, keeping the event storage.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Records an allocation and returns its index for [`Self::record_release`].
    pub fn record_alloc(&mut self, ordinal: usize, tensor: &'static str, bytes: usize) -> usize {
        self.events.push(AllocationEvent {
            ordinal,
            tensor,
            bytes,
            released_at: ordinal,
        });
        self.events.len() - 1
    }

    pub fn record_release(&mut self, index: usize, ordinal: usize) {
        if let Some(event) = self.events.get_mut(index) {
            event.released_at = ordinal.max(event.ordinal);
        }
    }

    pub fn events(&self) -> &[AllocationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.events.iter().map(|e| e.bytes).sum()
    }

    /// Peak of simultaneously live bytes, swept over every allocation point.
    ///
    /// Live ranges are inclusive, so a buffer released at ordinal `k`
    /// still counts against an allocation made at `k`.
    pub fn peak_bytes(&self) -> usize {
        self.events
            .iter()
            .map(|at| {
                self.events
                    .iter()
                    .filter(|e| e.is_live_at(at.ordinal))
                    .map(|e| e.bytes)
                    .sum()
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_sweep_counts_inclusive_overlap() {
        let mut log = AllocationLog::new();
        let a = log.record_alloc(0, "a", 100);
        let b = log.record_alloc(1, "b", 100);
        log.record_release(a, 1);
        let c = log.record_alloc(2, "c", 10);
        log.record_release(b, 2);
        log.record_release(c, 3);

        assert_eq!(log.len(), 3);
        assert_eq!(log.total_bytes(), 210);
        assert_eq!(log.peak_bytes(), 200);
    }

    #[test]
    fn test_empty_log() {
        let mut log = AllocationLog::new();
        assert_eq!(log.peak_bytes(), 0);
        log.record_alloc(0, "a", 8);
        log.clear();
        assert!(log.is_empty());
    }
}
