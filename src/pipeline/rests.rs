//! Rest consolidation.
//!
//! Merges sequence-consecutive rests separated by at most a small gap, as
//! long as the merged run does not cross a beat boundary it was not already
//! past. The first rest of a run carries the consolidated `RestInfo` (total
//! span, gaps included, so no time is lost); the swallowed rests are flagged
//! as processed without annotations and the emitter skips them.

use crate::config::{PerformanceConfig, QualityConfig};
use crate::domain::annotations::RestInfo;
use crate::domain::errors::ConvertError;
use crate::pipeline::arena::ScopedArena;
use crate::pipeline::enhanced::EnhancedTimedNote;
use crate::pipeline::PhaseOutcome;

/// Largest silent gap absorbed into a rest run, in ticks
const MAX_REST_GAP: u32 = 10;

/// Readability bonus applied to non-crossing runs
const READABILITY_BONUS: f64 = 0.05;

/// Consolidate rest runs and attach `RestInfo` to each run head.
///
/// Notes must already be sorted by start tick.
pub fn annotate_rests(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    divisions: u32,
    quality: &QualityConfig,
    performance: &PerformanceConfig,
) -> Result<PhaseOutcome, ConvertError> {
    let mut outcome = PhaseOutcome::default();
    if divisions == 0 {
        return Ok(outcome);
    }

    let mut i = 0usize;
    let mut iterations = 0u32;
    'scan: while i < notes.len() {
        iterations += 1;
        if iterations > performance.max_iterations_per_loop {
            log::warn!(
                "rest scan hit iteration cap {} at note {}",
                performance.max_iterations_per_loop,
                i
            );
            outcome.capped = true;
            break;
        }

        if !notes[i].note.is_rest() {
            i += 1;
            continue;
        }

        // Open a run at this rest and extend it while merging stays legal
        let head = i;
        let run_start = notes[head].note.start_tick;
        let original_duration = notes[head].note.duration;
        let mut run_end = notes[head].note.end_tick();
        let mut merged = 0usize;

        let mut j = head + 1;
        while j < notes.len() && notes[j].note.is_rest() {
            let next = &notes[j].note;
            let gap = next.start_tick.saturating_sub(run_end);
            if gap > MAX_REST_GAP {
                break;
            }
            if crosses_new_beat(run_end, next.end_tick(), divisions) {
                break;
            }
            run_end = run_end.max(next.end_tick());
            merged += 1;
            j += 1;
        }

        let total = run_end.saturating_sub(run_start);
        let crosses = run_start / divisions != run_end.saturating_sub(1) / divisions;
        let info = RestInfo {
            start_time: run_start,
            duration: total,
            is_optimized_rest: merged > 0,
            original_duration,
            alignment_score: alignment_score(run_start, divisions, crosses, quality),
        };
        match arena.alloc(info) {
            Ok(handle) => {
                notes[head].rest = Some(handle);
                outcome.annotated += 1;
            }
            Err(err) if performance.enable_performance_fallback => {
                log::warn!("rest phase degraded: {}", err);
                outcome.degraded = true;
                break 'scan;
            }
            Err(err) => return Err(err),
        }

        i = j;
    }

    for note in notes.iter_mut() {
        note.flags.mark_rest_processed();
    }

    Ok(outcome)
}

/// True when absorbing the next rest would push the run across a beat
/// boundary it has not already passed.
///
/// The reference boundary is the first one at or beyond the run's current
/// end, re-derived on every extension attempt, so boundaries the run has
/// already exceeded stay open while each fresh one still closes the run.
fn crosses_new_beat(run_end: u32, merged_end: u32, divisions: u32) -> bool {
    let next_boundary = (run_end.saturating_sub(1) / divisions + 1) * divisions;
    merged_end > next_boundary
}

/// Grade how cleanly the rest sits on the beat grid
fn alignment_score(start: u32, divisions: u32, crosses: bool, quality: &QualityConfig) -> f64 {
    let base = if start % divisions == 0 {
        1.0
    } else if start % (divisions / 2).max(1) == 0 {
        0.75
    } else if start % (divisions / 4).max(1) == 0 {
        0.5
    } else {
        0.25
    };
    if quality.prioritize_readability && !crosses {
        (base + READABILITY_BONUS).min(1.0)
    } else {
        base
    }
}
