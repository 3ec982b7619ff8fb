//! Beat-aware beam grouping.
//!
//! One linear scan opens a run at the first beamable note (shorter than a
//! quarter, not a rest) and closes it at rests, long notes, beat boundaries,
//! oversized inter-note gaps, or tuplet-membership changes. Runs of two or
//! more notes become begin/continue/end beam annotations.

use crate::config::{PerformanceConfig, QualityConfig};
use crate::domain::annotations::{BeamState, BeamingInfo, TupletInfo};
use crate::domain::errors::ConvertError;
use crate::pipeline::arena::{ArenaRef, ScopedArena};
use crate::pipeline::enhanced::EnhancedTimedNote;
use crate::pipeline::PhaseOutcome;

/// Largest silent gap between beamed notes, in ticks
const MAX_BEAM_GAP: u32 = 60;

/// Attach beam annotations to runs of short notes.
///
/// Notes must already be sorted by start tick.
pub fn annotate_beams(
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

    let mut run: Vec<usize> = Vec::new();
    let mut iterations = 0u32;

    for i in 0..notes.len() {
        iterations += 1;
        if iterations > performance.max_iterations_per_loop {
            log::warn!(
                "beam scan hit iteration cap {} at note {}",
                performance.max_iterations_per_loop,
                i
            );
            outcome.capped = true;
            break;
        }

        if !is_beamable(&notes[i], divisions) {
            close_run(&mut run, notes, arena, divisions, performance, &mut outcome)?;
            if outcome.degraded {
                break;
            }
            continue;
        }

        if let Some(&prev) = run.last() {
            if must_break(&notes[prev], &notes[i], divisions, quality, arena) {
                close_run(&mut run, notes, arena, divisions, performance, &mut outcome)?;
            }
        }
        if outcome.degraded {
            break;
        }
        run.push(i);
    }

    if !outcome.degraded {
        close_run(&mut run, notes, arena, divisions, performance, &mut outcome)?;
    }

    for note in notes.iter_mut() {
        note.flags.mark_beaming_processed();
    }

    Ok(outcome)
}

fn is_beamable(note: &EnhancedTimedNote, divisions: u32) -> bool {
    !note.note.is_rest() && note.note.duration < divisions
}

/// Whether the run must close between two consecutive beamable notes
fn must_break(
    prev: &EnhancedTimedNote,
    next: &EnhancedTimedNote,
    divisions: u32,
    quality: &QualityConfig,
    arena: &ScopedArena,
) -> bool {
    // Beat boundary: beaming never crosses into the next beat
    if next.note.start_tick / divisions != prev.note.start_tick / divisions {
        return true;
    }

    // Silent gap; saturating so overlapping notes count as gap zero
    let gap = next.note.start_tick.saturating_sub(prev.note.end_tick());
    if gap > MAX_BEAM_GAP {
        return true;
    }

    if quality.enable_beam_tuplet_coordination
        && tuplet_identity(prev.tuplet, arena) != tuplet_identity(next.tuplet, arena)
    {
        return true;
    }

    false
}

/// Tuplet span identity used for membership comparison
fn tuplet_identity(handle: Option<ArenaRef<TupletInfo>>, arena: &ScopedArena) -> Option<u32> {
    handle.and_then(|h| arena.get(h)).map(|info| info.start_tick)
}

/// Flush the pending run, annotating it when it has at least two members
fn close_run(
    run: &mut Vec<usize>,
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    divisions: u32,
    performance: &PerformanceConfig,
    outcome: &mut PhaseOutcome,
) -> Result<(), ConvertError> {
    if run.len() < 2 {
        run.clear();
        return Ok(());
    }

    let group_id = run[0] as u32;
    let last_pos = run.len() - 1;
    for (pos, &idx) in run.iter().enumerate() {
        let state = if pos == 0 {
            BeamState::Begin
        } else if pos == last_pos {
            BeamState::End
        } else {
            BeamState::Continue
        };
        let note = &notes[idx].note;
        let info = BeamingInfo {
            state,
            level: beam_level(note.duration, divisions),
            can_beam: true,
            beat_position: (note.start_tick % divisions) as f64 / divisions as f64,
            group_id,
        };
        match arena.alloc(info) {
            Ok(handle) => {
                notes[idx].beaming = Some(handle);
                outcome.annotated += 1;
            }
            Err(err) if performance.enable_performance_fallback => {
                log::warn!("beam phase degraded: {}", err);
                outcome.degraded = true;
                break;
            }
            Err(err) => return Err(err),
        }
    }
    run.clear();
    Ok(())
}

/// Beam level from duration: sixteenths and shorter get a second beam
pub(crate) fn beam_level(duration: u32, divisions: u32) -> u8 {
    if duration <= divisions / 4 { 2 } else { 1 }
}
