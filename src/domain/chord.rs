//! Chord grouping by exact start tick.
//!
//! Tolerance is fixed at zero ticks: notes that are merely close in time are
//! never merged, which keeps sequential grace-note-like figures out of chords
//! (MuseScore rejects fused chords whose members did not start together).

use crate::domain::timed_note::TimedNote;
use serde::{Deserialize, Serialize};

/// A non-empty set of notes sharing an exact start tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordGroup {
    pub notes: Vec<TimedNote>,
}

impl ChordGroup {
    pub fn start_tick(&self) -> u32 {
        self.notes[0].start_tick
    }

    /// Chord duration is taken from the first note
    pub fn duration(&self) -> u32 {
        self.notes[0].duration
    }

    pub fn is_chord(&self) -> bool {
        self.notes.len() > 1
    }
}

/// Group notes with exactly equal start ticks across all tracks.
///
/// Output groups are ordered by start tick; within a group, notes are ordered
/// by ascending pitch. O(n log n) from the stable sort, then one linear pass.
pub fn group_chords(notes: &[TimedNote]) -> Vec<ChordGroup> {
    let mut sorted: Vec<TimedNote> = notes.to_vec();
    sorted.sort_by_key(|n| n.start_tick);

    let mut groups: Vec<ChordGroup> = Vec::new();
    let mut current: Vec<TimedNote> = Vec::new();

    for note in sorted {
        match current.first() {
            Some(first) if first.start_tick == note.start_tick => {
                current.push(note);
            }
            Some(_) => {
                current.sort_by_key(|n| n.pitch);
                groups.push(ChordGroup { notes: std::mem::take(&mut current) });
                current.push(note);
            }
            None => current.push(note),
        }
    }

    if !current.is_empty() {
        current.sort_by_key(|n| n.pitch);
        groups.push(ChordGroup { notes: current });
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_at(pitch: u8, start_tick: u32) -> TimedNote {
        TimedNote::note(pitch, 80, start_tick, 480).unwrap()
    }

    #[test]
    fn test_exact_start_forms_chord() {
        let notes = vec![note_at(64, 0), note_at(60, 0), note_at(67, 0)];
        let groups = group_chords(&notes);

        assert_eq!(groups.len(), 1, "Simultaneous notes should form one chord");
        assert!(groups[0].is_chord());
        let pitches: Vec<u8> = groups[0].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67], "Chord members sorted by pitch");
    }

    #[test]
    fn test_close_but_unequal_starts_not_merged() {
        // 1 tick apart must stay separate: tolerance is exactly zero
        let notes = vec![note_at(60, 0), note_at(64, 1)];
        let groups = group_chords(&notes);

        assert_eq!(groups.len(), 2, "Near-simultaneous notes must not merge");
        assert!(!groups[0].is_chord());
        assert!(!groups[1].is_chord());
    }

    #[test]
    fn test_groups_ordered_by_start() {
        let notes = vec![note_at(72, 960), note_at(60, 0), note_at(64, 480)];
        let groups = group_chords(&notes);

        let starts: Vec<u32> = groups.iter().map(|g| g.start_tick()).collect();
        assert_eq!(starts, vec![0, 480, 960]);
    }

    #[test]
    fn test_grouping_spans_tracks() {
        let mut left = TimedNote::note(48, 70, 0, 960).unwrap();
        left.track = 1;
        let right = TimedNote::note(72, 80, 0, 960).unwrap();

        let groups = group_chords(&[right, left]);
        assert_eq!(groups.len(), 1, "Exact-start notes group across tracks");
        assert_eq!(groups[0].notes.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_chords(&[]).is_empty());
    }
}
