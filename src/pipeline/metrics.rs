//! Pipeline performance accounting.
//!
//! Metrics are a plain value type snapshot; the only state that survives an
//! arena reset is the monotone lifetime counters (cycles, total notes,
//! errors) and the ns/note moving average.

use crate::pipeline::arena::ArenaStats;
use serde::{Deserialize, Serialize};

/// Snapshot of pipeline metrics returned by `get_metrics`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Completed processing cycles (batches)
    pub cycles: u64,
    /// Notes processed across all cycles
    pub total_notes: u64,
    /// Phase failures and recovered errors across all cycles
    pub error_count: u64,
    /// Conflicts the coordinator resolved in the most recent cycle
    pub conflicts_resolved: u64,
    /// Moving average cost per note in nanoseconds
    pub avg_ns_per_note: u64,
    /// Arena memory overhead vs. the raw note footprint, in percent
    pub memory_overhead_percent: u32,
    pub arena: ArenaStats,
}

/// Mutable accumulator behind the metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    cycles: u64,
    total_notes: u64,
    error_count: u64,
    conflicts_resolved: u64,
    avg_ns_per_note: u64,
}

impl MetricsRecorder {
    /// Exponential smoothing weight for the ns/note moving average (1/4 new)
    const SMOOTHING_SHIFT: u32 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed cycle into the counters
    pub fn record_cycle(&mut self, notes: usize, elapsed_ns: u64, conflicts_resolved: u64) {
        self.cycles += 1;
        self.total_notes += notes as u64;
        self.conflicts_resolved = conflicts_resolved;

        let per_note = if notes == 0 { 0 } else { elapsed_ns / notes as u64 };
        if self.cycles == 1 {
            self.avg_ns_per_note = per_note;
        } else {
            let old = self.avg_ns_per_note;
            self.avg_ns_per_note = old - (old >> Self::SMOOTHING_SHIFT)
                + (per_note >> Self::SMOOTHING_SHIFT);
        }
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn avg_ns_per_note(&self) -> u64 {
        self.avg_ns_per_note
    }

    /// Assemble the public snapshot.
    ///
    /// `base_note_bytes` is the footprint of the raw `TimedNote` batch the
    /// overhead percentage is measured against.
    pub fn snapshot(&self, arena: ArenaStats, base_note_bytes: usize) -> PipelineMetrics {
        let memory_overhead_percent = if base_note_bytes == 0 {
            0
        } else {
            ((arena.peak_bytes as u64 * 100) / base_note_bytes as u64) as u32
        };
        PipelineMetrics {
            cycles: self.cycles,
            total_notes: self.total_notes,
            error_count: self.error_count,
            conflicts_resolved: self.conflicts_resolved,
            avg_ns_per_note: self.avg_ns_per_note,
            memory_overhead_percent,
            arena,
        }
    }
}
