//! Stem direction resolution.
//!
//! Beamed notes share one direction chosen to keep total stem length small
//! (majority side of the middle line decides, like hand engraving); lone
//! notes follow the pitch rule, with voice preference taking over in
//! multi-voice textures so voice 1 points up and voice 2 down.

use crate::config::PerformanceConfig;
use crate::domain::annotations::{StemDirection, StemInfo};
use crate::domain::errors::ConvertError;
use crate::domain::value_objects::Pitch;
use crate::pipeline::arena::ScopedArena;
use crate::pipeline::enhanced::EnhancedTimedNote;
use crate::pipeline::PhaseOutcome;
use std::collections::HashMap;

/// Middle staff line of the treble staff (B4)
const TREBLE_MIDDLE: u8 = 71;

/// Middle staff line of the bass staff (D3)
const BASS_MIDDLE: u8 = 50;

/// Attach `StemInfo` to every pitched note.
pub fn annotate_stems(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    performance: &PerformanceConfig,
) -> Result<PhaseOutcome, ConvertError> {
    let mut outcome = PhaseOutcome::default();

    let multi_voice = {
        let mut voices: Vec<u8> = notes
            .iter()
            .filter(|n| !n.note.is_rest())
            .map(|n| n.note.effective_voice())
            .collect();
        voices.sort_unstable();
        voices.dedup();
        voices.len() > 1
    };

    // Collect beam group membership: group id -> member staff positions
    let mut group_positions: HashMap<u32, Vec<i8>> = HashMap::new();
    for note in notes.iter() {
        if note.note.is_rest() {
            continue;
        }
        if let Some(info) = note.beaming.and_then(|h| arena.get(h)) {
            group_positions
                .entry(info.group_id)
                .or_default()
                .push(staff_position(note.note.pitch));
        }
    }

    for note in notes.iter_mut() {
        note.flags.mark_stem_processed();
        if note.note.is_rest() {
            continue;
        }

        let voice = note.note.effective_voice();
        let position = staff_position(note.note.pitch);
        let solo_direction = solo_stem_direction(position, voice, multi_voice);

        let group_id = note
            .beaming
            .and_then(|h| arena.get(h))
            .map(|info| info.group_id);
        let (direction, in_beam_group, beam_influenced) = match group_id {
            Some(id) => {
                let members = group_positions.get(&id).map(Vec::as_slice).unwrap_or(&[]);
                let group_dir = group_stem_direction(members, voice);
                (group_dir, true, group_dir != solo_direction)
            }
            None => (solo_direction, false, false),
        };

        let info = StemInfo {
            direction,
            beam_influenced,
            voice,
            in_beam_group,
            beam_group_id: group_id,
            staff_position: position,
        };
        match arena.alloc(info) {
            Ok(handle) => {
                note.stem = Some(handle);
                outcome.annotated += 1;
            }
            Err(err) if performance.enable_performance_fallback => {
                log::warn!("stem phase degraded: {}", err);
                outcome.degraded = true;
                break;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(outcome)
}

/// Semitone offset from the middle line of the staff the pitch sits on
pub fn staff_position(pitch: u8) -> i8 {
    let middle = if pitch >= Pitch::MIDDLE_C {
        TREBLE_MIDDLE
    } else {
        BASS_MIDDLE
    };
    (pitch as i16 - middle as i16) as i8
}

/// Direction for an unbeamed note
fn solo_stem_direction(position: i8, voice: u8, multi_voice: bool) -> StemDirection {
    if multi_voice {
        match voice {
            1 => return StemDirection::Up,
            2 => return StemDirection::Down,
            _ => {}
        }
    }
    if position > 0 {
        StemDirection::Down
    } else {
        StemDirection::Up
    }
}

/// Uniform direction for a beam group.
///
/// The side of the middle line holding the farther mass of noteheads gets
/// the stems pointed away from it, which minimizes total stem length.
/// Balanced groups fall back to voice preference, then up.
fn group_stem_direction(positions: &[i8], voice: u8) -> StemDirection {
    let sum: i32 = positions.iter().map(|&p| p as i32).sum();
    if sum > 0 {
        StemDirection::Down
    } else if sum < 0 {
        StemDirection::Up
    } else {
        match voice {
            2 => StemDirection::Down,
            _ => StemDirection::Up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityConfig;
    use crate::domain::timed_note::TimedNote;
    use crate::pipeline::beams::annotate_beams;

    fn enhanced(pitches: &[(u8, u32, u32)]) -> Vec<EnhancedTimedNote> {
        pitches
            .iter()
            .map(|&(pitch, start, dur)| {
                EnhancedTimedNote::new(TimedNote::note(pitch, 80, start, dur).unwrap())
            })
            .collect()
    }

    fn resolve(notes: &mut [EnhancedTimedNote], arena: &mut ScopedArena) {
        annotate_stems(notes, arena, &PerformanceConfig::default()).unwrap();
    }

    fn direction(note: &EnhancedTimedNote, arena: &ScopedArena) -> StemDirection {
        arena.get(note.stem.unwrap()).unwrap().direction
    }

    #[test]
    fn test_staff_position_reference_lines() {
        assert_eq!(staff_position(71), 0, "B4 sits on the treble middle line");
        assert_eq!(staff_position(72), 1);
        assert_eq!(staff_position(60), -11, "middle C is below the treble middle");
        assert_eq!(staff_position(50), 0, "D3 sits on the bass middle line");
        assert_eq!(staff_position(43), -7);
    }

    #[test]
    fn test_high_note_stems_down_low_note_up() {
        let mut notes = enhanced(&[(79, 0, 480), (64, 480, 480)]);
        let mut arena = ScopedArena::new();
        resolve(&mut notes, &mut arena);

        assert_eq!(direction(&notes[0], &arena), StemDirection::Down);
        assert_eq!(direction(&notes[1], &arena), StemDirection::Up);
    }

    #[test]
    fn test_middle_line_note_stems_up_when_solo() {
        let mut notes = enhanced(&[(71, 0, 480)]);
        let mut arena = ScopedArena::new();
        resolve(&mut notes, &mut arena);
        assert_eq!(direction(&notes[0], &arena), StemDirection::Up);
    }

    #[test]
    fn test_beam_group_shares_direction() {
        // Three eighths mostly above the middle line: the whole group goes down
        let mut notes = enhanced(&[(79, 0, 120), (76, 120, 120), (67, 240, 120)]);
        let mut arena = ScopedArena::new();
        annotate_beams(
            &mut notes,
            &mut arena,
            480,
            &QualityConfig::default(),
            &PerformanceConfig::default(),
        )
        .unwrap();
        resolve(&mut notes, &mut arena);

        for note in &notes {
            let info = arena.get(note.stem.unwrap()).unwrap();
            assert_eq!(info.direction, StemDirection::Down);
            assert!(info.in_beam_group);
            assert_eq!(info.beam_group_id, Some(0));
        }
        // The low note was dragged along by the group
        let dragged = arena.get(notes[2].stem.unwrap()).unwrap();
        assert!(dragged.beam_influenced);
    }

    #[test]
    fn test_voice_preference_in_multi_voice_texture() {
        let mut notes = vec![
            EnhancedTimedNote::new(TimedNote::new(79, 0, 80, 0, 480, 1, 0).unwrap()),
            EnhancedTimedNote::new(TimedNote::new(64, 0, 80, 0, 480, 2, 0).unwrap()),
        ];
        let mut arena = ScopedArena::new();
        resolve(&mut notes, &mut arena);

        // Pitch rule alone would flip both; voice preference wins
        assert_eq!(direction(&notes[0], &arena), StemDirection::Up);
        assert_eq!(direction(&notes[1], &arena), StemDirection::Down);
    }

    #[test]
    fn test_rests_carry_no_stem() {
        let mut notes = vec![EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap())];
        let mut arena = ScopedArena::new();
        resolve(&mut notes, &mut arena);
        assert!(notes[0].stem.is_none());
        assert!(notes[0].flags.stem_processed());
    }
}
