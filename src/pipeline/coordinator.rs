//! Cross-feature conflict coordination.
//!
//! Runs after the detection phases and before stem resolution, so stems see
//! a consistent annotation set. The coordinator mutates annotation metadata
//! only; the underlying notes are never rewritten. Rules run in a fixed
//! order:
//!
//! 1. dynamics attached to a rest are dropped
//! 2. a beam crossing a tuplet boundary is split at the boundary
//! 3. a tuplet containing both beamed and unbeamed beamable notes is
//!    recomputed to all-or-none
//! 4. an optimized rest sitting inside a beam group loses its optimization
//! 5. a partial tuplet at a measure boundary has beam continuation cut there
//! 6. same-tick notes in different voices are parallel voices, not a chord;
//!    nothing is mutated

use crate::config::{CoordinationConfig, CoordinationFailureMode, QualityConfig};
use crate::domain::annotations::{BeamState, BeamingInfo};
use crate::domain::errors::ConvertError;
use crate::pipeline::arena::ScopedArena;
use crate::pipeline::beams::beam_level;
use crate::pipeline::enhanced::EnhancedTimedNote;

/// Coordination result counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinationOutcome {
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}

/// Detect and resolve inter-feature conflicts.
///
/// `measure_ticks` is the measure length used for rule 5's boundary checks.
pub fn coordinate(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    divisions: u32,
    measure_ticks: u32,
    quality: &QualityConfig,
    coordination: &CoordinationConfig,
) -> Result<CoordinationOutcome, ConvertError> {
    let mut outcome = CoordinationOutcome::default();

    resolve_dynamics_on_rests(notes, &mut outcome);
    if quality.enable_beam_tuplet_coordination {
        split_beams_at_tuplet_boundaries(notes, arena, &mut outcome);
        rebalance_beams_within_tuplets(notes, arena, divisions, &mut outcome)?;
    }
    if quality.enable_rest_beam_coordination {
        release_rests_inside_beam_groups(notes, arena, &mut outcome);
    }
    cut_beams_at_partial_tuplet_measure_breaks(notes, arena, measure_ticks, &mut outcome);
    log_parallel_voice_collisions(notes);
    validate_rest_beam_consistency(notes, coordination, &mut outcome)?;

    Ok(outcome)
}

/// Rule 1: a rest can never carry a dynamic marking
fn resolve_dynamics_on_rests(notes: &mut [EnhancedTimedNote], outcome: &mut CoordinationOutcome) {
    for note in notes.iter_mut() {
        if note.note.is_rest() && note.dynamics.is_some() {
            note.dynamics = None;
            outcome.conflicts_detected += 1;
            outcome.conflicts_resolved += 1;
        }
    }
}

/// Tuplet span identity of a note, if any
fn tuplet_identity(note: &EnhancedTimedNote, arena: &ScopedArena) -> Option<u32> {
    note.tuplet.and_then(|h| arena.get(h)).map(|t| t.start_tick)
}

/// Rule 2: no beam group may span two different tuplet identities
fn split_beams_at_tuplet_boundaries(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    outcome: &mut CoordinationOutcome,
) {
    for i in 0..notes.len().saturating_sub(1) {
        let (Some(prev_handle), Some(next_handle)) = (notes[i].beaming, notes[i + 1].beaming)
        else {
            continue;
        };
        let (Some(prev), Some(next)) = (arena.get(prev_handle), arena.get(next_handle)) else {
            continue;
        };
        if prev.group_id != next.group_id {
            continue;
        }
        if tuplet_identity(&notes[i], arena) == tuplet_identity(&notes[i + 1], arena) {
            continue;
        }

        outcome.conflicts_detected += 1;
        let old_group = prev.group_id;
        let new_group = (i + 1) as u32;
        if let Some(info) = arena.get_mut(prev_handle) {
            info.state = BeamState::End;
        }
        if let Some(info) = arena.get_mut(next_handle) {
            info.state = BeamState::Begin;
        }
        // Everything after the boundary moves to a fresh group id
        for note in notes.iter().skip(i + 1) {
            let Some(handle) = note.beaming else { continue };
            let belongs = arena.get(handle).map(|b| b.group_id) == Some(old_group);
            if belongs {
                if let Some(info) = arena.get_mut(handle) {
                    info.group_id = new_group;
                }
            }
        }
        outcome.conflicts_resolved += 1;
    }
}

/// Rule 3: inside one tuplet span, beamable notes are beamed all-or-none
fn rebalance_beams_within_tuplets(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    divisions: u32,
    outcome: &mut CoordinationOutcome,
) -> Result<(), ConvertError> {
    // Distinct tuplet spans, by identity
    let mut spans: Vec<(u32, u32)> = Vec::new();
    for note in notes.iter() {
        if let Some(info) = note.tuplet.and_then(|h| arena.get(h)) {
            if !spans.iter().any(|&(s, _)| s == info.start_tick) {
                spans.push((info.start_tick, info.end_tick));
            }
        }
    }

    for (span_start, span_end) in spans {
        let members: Vec<usize> = notes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                !n.note.is_rest()
                    && n.note.duration < divisions
                    && n.note.start_tick >= span_start
                    && n.note.start_tick < span_end
            })
            .map(|(idx, _)| idx)
            .collect();

        let beamed = members.iter().filter(|&&i| notes[i].beaming.is_some()).count();
        if beamed == 0 || beamed == members.len() {
            continue;
        }
        outcome.conflicts_detected += 1;

        let contiguous = members.windows(2).all(|pair| pair[1] == pair[0] + 1);
        if members.len() >= 2 && contiguous {
            // Beam the whole span as one group
            let group_id = members[0] as u32;
            let last = members.len() - 1;
            for (pos, &idx) in members.iter().enumerate() {
                let state = if pos == 0 {
                    BeamState::Begin
                } else if pos == last {
                    BeamState::End
                } else {
                    BeamState::Continue
                };
                let note = notes[idx].note;
                match notes[idx].beaming {
                    Some(handle) => {
                        if let Some(info) = arena.get_mut(handle) {
                            info.state = state;
                            info.group_id = group_id;
                        }
                    }
                    None => {
                        let info = BeamingInfo {
                            state,
                            level: beam_level(note.duration, divisions),
                            can_beam: true,
                            beat_position: (note.start_tick % divisions) as f64
                                / divisions as f64,
                            group_id,
                        };
                        notes[idx].beaming = Some(arena.alloc(info)?);
                    }
                }
            }
        } else {
            // Cannot beam the span as one run: strip the partial beams
            for &idx in &members {
                notes[idx].beaming = None;
            }
        }
        outcome.conflicts_resolved += 1;
    }
    Ok(())
}

/// Rule 4: an optimized rest inside a beam group's span is released so the
/// emitter will not merge across it
fn release_rests_inside_beam_groups(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    outcome: &mut CoordinationOutcome,
) {
    // Beam group spans by group id: (first start, last start)
    let mut spans: Vec<(u32, u32, u32)> = Vec::new();
    for note in notes.iter() {
        if let Some(info) = note.beaming.and_then(|h| arena.get(h)) {
            match spans.iter_mut().find(|(id, _, _)| *id == info.group_id) {
                Some(span) => {
                    span.1 = span.1.min(note.note.start_tick);
                    span.2 = span.2.max(note.note.start_tick);
                }
                None => spans.push((info.group_id, note.note.start_tick, note.note.start_tick)),
            }
        }
    }

    for note in notes.iter_mut() {
        if !note.note.is_rest() {
            continue;
        }
        let Some(handle) = note.rest else { continue };
        let inside = spans
            .iter()
            .any(|&(_, first, last)| note.note.start_tick > first && note.note.start_tick < last);
        if !inside {
            continue;
        }
        if let Some(info) = arena.get_mut(handle) {
            if info.is_optimized_rest {
                info.is_optimized_rest = false;
                outcome.conflicts_detected += 1;
                outcome.conflicts_resolved += 1;
            }
        }
    }
}

/// Rule 5: a tuplet with fewer members than its kind expects does not carry
/// beams across a measure boundary
fn cut_beams_at_partial_tuplet_measure_breaks(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    measure_ticks: u32,
    outcome: &mut CoordinationOutcome,
) {
    if measure_ticks == 0 {
        return;
    }
    for i in 0..notes.len().saturating_sub(1) {
        let Some(info) = notes[i].tuplet.and_then(|h| arena.get(h)) else {
            continue;
        };
        let expected = info.kind.note_count() as usize;
        let span_start = info.start_tick;
        let actual = notes
            .iter()
            .filter(|n| {
                tuplet_identity_matches(n, arena, span_start)
            })
            .count();
        if actual >= expected {
            continue;
        }

        // Partial tuplet: cut any beam continuation across the measure line
        let (Some(prev_handle), Some(next_handle)) = (notes[i].beaming, notes[i + 1].beaming)
        else {
            continue;
        };
        let same_group =
            arena.get(prev_handle).map(|b| b.group_id) == arena.get(next_handle).map(|b| b.group_id);
        let crosses_measure =
            notes[i].note.start_tick / measure_ticks != notes[i + 1].note.start_tick / measure_ticks;
        if same_group && crosses_measure {
            outcome.conflicts_detected += 1;
            if let Some(b) = arena.get_mut(prev_handle) {
                b.state = BeamState::End;
            }
            if let Some(b) = arena.get_mut(next_handle) {
                b.state = BeamState::Begin;
                b.group_id = (i + 1) as u32;
            }
            outcome.conflicts_resolved += 1;
        }
    }
}

fn tuplet_identity_matches(note: &EnhancedTimedNote, arena: &ScopedArena, span_start: u32) -> bool {
    note.tuplet
        .and_then(|h| arena.get(h))
        .map(|t| t.start_tick == span_start)
        .unwrap_or(false)
}

/// Rule 6: same-tick notes in different voices are parallel voices by
/// construction; nothing to mutate, but worth a trace when debugging layout
fn log_parallel_voice_collisions(notes: &[EnhancedTimedNote]) {
    for pair in notes.windows(2) {
        if pair[0].note.start_tick == pair[1].note.start_tick
            && pair[0].note.effective_voice() != pair[1].note.effective_voice()
        {
            log::debug!(
                "parallel voices at tick {}: voices {} and {}",
                pair[0].note.start_tick,
                pair[0].note.effective_voice(),
                pair[1].note.effective_voice()
            );
        }
    }
}

/// Terminal consistency check: a rest carrying beam metadata is an
/// inconsistency no rule resolves, handled per the configured failure mode
fn validate_rest_beam_consistency(
    notes: &mut [EnhancedTimedNote],
    coordination: &CoordinationConfig,
    outcome: &mut CoordinationOutcome,
) -> Result<(), ConvertError> {
    for (i, note) in notes.iter_mut().enumerate() {
        if note.note.is_rest() && note.beaming.is_some() {
            outcome.conflicts_detected += 1;
            match coordination.coordination_failure_mode {
                CoordinationFailureMode::Strict => {
                    return Err(ConvertError::CoordinationConflict {
                        reason: format!("rest at index {} carries beam metadata", i),
                    });
                }
                CoordinationFailureMode::Fallback => {
                    note.beaming = None;
                    outcome.conflicts_resolved += 1;
                }
                CoordinationFailureMode::Ignore => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PerformanceConfig;
    use crate::domain::annotations::{Dynamic, DynamicsInfo};
    use crate::domain::timed_note::TimedNote;
    use crate::pipeline::arena::Phase;
    use crate::pipeline::beams::annotate_beams;
    use crate::pipeline::tuplets::annotate_tuplets;

    fn coordinate_default(
        notes: &mut [EnhancedTimedNote],
        arena: &mut ScopedArena,
    ) -> CoordinationOutcome {
        coordinate(
            notes,
            arena,
            480,
            1920,
            &QualityConfig::default(),
            &CoordinationConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_dynamics_on_rest_cleared() {
        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Dynamics);
        let handle = arena
            .alloc(DynamicsInfo {
                time_position: 0,
                dynamic: Dynamic::Mf,
                previous_dynamic: None,
                triggers_new_dynamic: true,
            })
            .unwrap();
        arena.end_phase();

        let mut rest = EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap());
        rest.dynamics = Some(handle);
        let mut notes = vec![rest];

        let outcome = coordinate_default(&mut notes, &mut arena);
        assert!(notes[0].dynamics.is_none(), "rest must lose its dynamics");
        assert_eq!(outcome.conflicts_resolved, 1);
    }

    #[test]
    fn test_beam_split_at_tuplet_boundary() {
        // Triplet at beat 0 followed by a sixteenth in the same beat... the
        // beam grouper with tuplet coordination off will happily join them
        let mut notes: Vec<EnhancedTimedNote> = [
            (0u32, 160u32),
            (160, 160),
            (320, 160),
        ]
        .iter()
        .map(|&(s, d)| EnhancedTimedNote::new(TimedNote::note(60, 80, s, d).unwrap()))
        .collect();

        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Tuplet);
        annotate_tuplets(
            &mut notes,
            &mut arena,
            480,
            &QualityConfig::default(),
            &PerformanceConfig::default(),
        )
        .unwrap();
        arena.end_phase();

        // Append an untupleted eighth in the next beat region and beam it
        // into the triplet manually by faking the grouper with coordination
        // disabled
        notes.push(EnhancedTimedNote::new(
            TimedNote::note(62, 80, 480, 160).unwrap(),
        ));
        let no_tuplet_quality = QualityConfig {
            enable_beam_tuplet_coordination: false,
            ..QualityConfig::default()
        };
        arena.begin_phase(Phase::Beam);
        annotate_beams(
            &mut notes,
            &mut arena,
            960, // coarse beat so all four share one beat
            &no_tuplet_quality,
            &PerformanceConfig::default(),
        )
        .unwrap();
        arena.end_phase();
        assert!(notes.iter().all(|n| n.beaming.is_some()));

        arena.begin_phase(Phase::Coordination);
        let outcome = coordinate_default(&mut notes, &mut arena);
        arena.end_phase();

        assert!(outcome.conflicts_resolved >= 1);
        let third = arena.get(notes[2].beaming.unwrap()).unwrap();
        let fourth = arena.get(notes[3].beaming.unwrap()).unwrap();
        assert_eq!(third.state, BeamState::End, "beam ends at tuplet boundary");
        assert_eq!(fourth.state, BeamState::Begin, "new group after boundary");
        assert_ne!(third.group_id, fourth.group_id);
    }

    #[test]
    fn test_rest_inside_beam_group_released() {
        let mut notes: Vec<EnhancedTimedNote> = vec![
            EnhancedTimedNote::new(TimedNote::note(60, 80, 0, 100).unwrap()),
            EnhancedTimedNote::new(TimedNote::rest(100, 100).unwrap()),
            EnhancedTimedNote::new(TimedNote::note(62, 80, 200, 100).unwrap()),
        ];

        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Beam);
        // Fake a beam group spanning the rest (grouper would not produce it)
        for (i, state) in [(0usize, BeamState::Begin), (2, BeamState::End)] {
            let info = BeamingInfo {
                state,
                level: 2,
                can_beam: true,
                beat_position: 0.0,
                group_id: 0,
            };
            notes[i].beaming = Some(arena.alloc(info).unwrap());
        }
        arena.end_phase();

        arena.begin_phase(Phase::Rest);
        let rest_info = crate::domain::annotations::RestInfo {
            start_time: 100,
            duration: 100,
            is_optimized_rest: true,
            original_duration: 100,
            alignment_score: 0.5,
        };
        notes[1].rest = Some(arena.alloc(rest_info).unwrap());
        arena.end_phase();

        arena.begin_phase(Phase::Coordination);
        let outcome = coordinate_default(&mut notes, &mut arena);
        arena.end_phase();

        let info = arena.get(notes[1].rest.unwrap()).unwrap();
        assert!(!info.is_optimized_rest, "optimization released inside beam");
        assert!(outcome.conflicts_resolved >= 1);
    }

    #[test]
    fn test_strict_mode_surfaces_rest_beam_inconsistency() {
        let mut notes = vec![EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap())];
        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Beam);
        let info = BeamingInfo {
            state: BeamState::Begin,
            level: 1,
            can_beam: true,
            beat_position: 0.0,
            group_id: 0,
        };
        notes[0].beaming = Some(arena.alloc(info).unwrap());
        arena.end_phase();

        let strict = CoordinationConfig {
            coordination_failure_mode: CoordinationFailureMode::Strict,
        };
        let result = coordinate(
            &mut notes,
            &mut arena,
            480,
            1920,
            &QualityConfig::default(),
            &strict,
        );
        assert!(matches!(
            result,
            Err(ConvertError::CoordinationConflict { .. })
        ));
    }

    #[test]
    fn test_fallback_mode_clears_rest_beam_inconsistency() {
        let mut notes = vec![EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap())];
        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Beam);
        let info = BeamingInfo {
            state: BeamState::Begin,
            level: 1,
            can_beam: true,
            beat_position: 0.0,
            group_id: 0,
        };
        notes[0].beaming = Some(arena.alloc(info).unwrap());
        arena.end_phase();

        let outcome = coordinate_default(&mut notes, &mut arena);
        assert!(notes[0].beaming.is_none());
        assert_eq!(outcome.conflicts_resolved, 1);
    }

    #[test]
    fn test_clean_input_reports_no_conflicts() {
        let mut notes: Vec<EnhancedTimedNote> = [(0u32, 240u32), (240, 240)]
            .iter()
            .map(|&(s, d)| EnhancedTimedNote::new(TimedNote::note(64, 80, s, d).unwrap()))
            .collect();
        let mut arena = ScopedArena::new();
        arena.begin_phase(Phase::Beam);
        annotate_beams(
            &mut notes,
            &mut arena,
            480,
            &QualityConfig::default(),
            &PerformanceConfig::default(),
        )
        .unwrap();
        arena.end_phase();

        let outcome = coordinate_default(&mut notes, &mut arena);
        assert_eq!(outcome.conflicts_detected, 0);
        assert_eq!(outcome.conflicts_resolved, 0);
    }
}
