//! Measure partitioning and emission-side voice grouping.
//!
//! Notes are assigned to measures by start tick against the time-signature
//! grid. A note its voice cannot hold is split at the barline and the halves
//! are tied, so total duration is always conserved. Closing a measure pads
//! any meaningful remaining voice-1 capacity with a rest so downstream
//! software sees full measures; interior empty measures become whole-measure
//! rests. Hard caps keep pathological input from producing unbounded
//! output.

use crate::domain::chord::group_chords;
use crate::domain::errors::{ConversionWarning, WarningCategory, WarningSeverity};
use crate::domain::measure::Measure;
use crate::domain::timed_note::TimedNote;
use crate::domain::value_objects::TimeSignature;
use crate::pipeline::{EnhancedTimedNote, ProcessingFlags};

/// Upper bound on emitted measures per part
pub const MAX_MEASURES: usize = 10_000;

/// Upper bound on notes within one measure
pub const MAX_NOTES_PER_MEASURE: usize = 1_000;

/// A measure plus the annotated notes it will emit
#[derive(Debug, Clone)]
pub struct EngravedMeasure {
    pub measure: Measure,
    pub notes: Vec<EnhancedTimedNote>,
}

impl EngravedMeasure {
    fn new(
        number: u32,
        start_tick: u32,
        time_signature: TimeSignature,
        beat_unit: u32,
    ) -> Result<Self, &'static str> {
        let measure = Measure::new(number, start_tick, time_signature, beat_unit)?;
        Ok(Self {
            measure,
            notes: Vec::new(),
        })
    }

    /// Pad remaining voice-1 capacity with a rest when it is at least one
    /// thirty-second note
    fn close(&mut self, beat_unit: u32) {
        let remaining = self.measure.remaining_capacity(1);
        if remaining >= beat_unit / 8 && remaining > 0 {
            let start = self.measure.end_tick - remaining;
            if let Ok(rest) = TimedNote::rest(start, remaining) {
                if self.measure.add_note(rest).is_ok() {
                    self.notes.push(EnhancedTimedNote::new(rest));
                }
            }
        }
    }
}

/// Partition annotated notes into measures.
///
/// Notes must be sorted by start tick. A note that overfills its voice is
/// split at the barline with a tie and the tail carries into the following
/// measure, so no input duration is ever lost; only the hard measure cap
/// drops content, and that leaves a warning naming the lost ticks.
pub fn partition_measures(
    notes: &[EnhancedTimedNote],
    time_signature: TimeSignature,
    beat_unit: u32,
    warnings: &mut Vec<ConversionWarning>,
) -> Vec<EngravedMeasure> {
    let measure_len = time_signature.measure_ticks(beat_unit);
    if measure_len == 0 || notes.is_empty() {
        return Vec::new();
    }

    let mut measures: Vec<EngravedMeasure> = Vec::new();
    let Ok(mut current) = EngravedMeasure::new(1, 0, time_signature, beat_unit) else {
        return Vec::new();
    };
    let mut overflow_reported = false;

    // The unit of placement is the chord group: simultaneous notes land in
    // one measure together, and their shared slot is checked once
    let plain: Vec<_> = notes.iter().map(|n| n.note).collect();
    let chords = group_chords(&plain);
    let mut next_note = 0usize;

    let mut carryovers: Vec<EnhancedTimedNote> = Vec::new();

    for chord in &chords {
        let members = &notes[next_note..next_note + chord.notes.len()];
        next_note += chord.notes.len();
        let target_index = (chord.start_tick() / measure_len) as usize;

        // Close finished measures (padding them) until the target is open
        while (current.measure.number as usize) <= target_index {
            if measures.len() + 1 >= MAX_MEASURES {
                warnings.push(dropped_content_warning(&carryovers));
                current.close(beat_unit);
                measures.push(current);
                return measures;
            }
            current.close(beat_unit);
            let next_number = current.measure.number + 1;
            let next_start = current.measure.end_tick;
            measures.push(current);
            match EngravedMeasure::new(next_number, next_start, time_signature, beat_unit) {
                Ok(next) => current = next,
                Err(reason) => {
                    warnings.push(ConversionWarning::new(
                        WarningSeverity::Error,
                        WarningCategory::SafetyCap,
                        format!("measure grid stopped: {}", reason),
                    ));
                    return measures;
                }
            }
            // Split tails land at the front of the fresh measure
            for carry in std::mem::take(&mut carryovers) {
                if let Some(tail) = place_note(&mut current, carry) {
                    carryovers.push(tail);
                }
            }
        }

        if current.notes.len() + members.len() > MAX_NOTES_PER_MEASURE {
            if !overflow_reported {
                warnings.push(
                    ConversionWarning::new(
                        WarningSeverity::Error,
                        WarningCategory::SafetyCap,
                        format!("note cap {} reached in a measure", MAX_NOTES_PER_MEASURE),
                    )
                    .with_measure(current.measure.number),
                );
                overflow_reported = true;
            }
            continue;
        }

        for enhanced in members {
            if let Some(tail) = place_note(&mut current, *enhanced) {
                carryovers.push(tail);
            }
        }
    }

    // Keep opening measures until every split tail has landed
    while !carryovers.is_empty() {
        if measures.len() + 1 >= MAX_MEASURES {
            warnings.push(dropped_content_warning(&carryovers));
            break;
        }
        current.close(beat_unit);
        let next_number = current.measure.number + 1;
        let next_start = current.measure.end_tick;
        measures.push(current);
        match EngravedMeasure::new(next_number, next_start, time_signature, beat_unit) {
            Ok(next) => current = next,
            Err(reason) => {
                warnings.push(ConversionWarning::new(
                    WarningSeverity::Error,
                    WarningCategory::SafetyCap,
                    format!("measure grid stopped: {}", reason),
                ));
                return measures;
            }
        }
        for carry in std::mem::take(&mut carryovers) {
            if let Some(tail) = place_note(&mut current, carry) {
                carryovers.push(tail);
            }
        }
    }

    current.close(beat_unit);
    measures.push(current);
    measures
}

/// Place one note into the measure, splitting at the barline when its voice
/// cannot hold all of it. Returns the tail that carries into the next
/// measure, if any; head plus tail always cover the full input duration.
fn place_note(
    current: &mut EngravedMeasure,
    note: EnhancedTimedNote,
) -> Option<EnhancedTimedNote> {
    let voice = note.note.effective_voice();
    let remaining = current.measure.remaining_capacity(voice);

    if note.note.duration <= remaining {
        if current.measure.add_note(note.note).is_ok() {
            current.notes.push(note);
        }
        return None;
    }

    if remaining == 0 {
        // The voice is already full: the whole note moves past the barline
        let mut carry = note;
        carry.note.start_tick = current.measure.end_tick;
        return Some(carry);
    }

    // Split at the barline; pitched halves are tied together, rests just
    // continue as rests
    let tieable = !note.note.is_rest();
    let mut head = note;
    head.note.duration = remaining;
    head.tie_start = tieable;
    if current.measure.add_note(head.note).is_ok() {
        current.notes.push(head);
    }

    let mut tail = note;
    tail.note.start_tick = current.measure.end_tick;
    tail.note.duration = note.note.duration - remaining;
    tail.tie_start = false;
    tail.tie_stop = tieable;
    // The tail is a note no phase ever saw: it keeps only its stem
    // direction, and fresh flags so rest emission does not mistake it for a
    // swallowed run member
    tail.tuplet = None;
    tail.beaming = None;
    tail.rest = None;
    tail.dynamics = None;
    tail.flags = ProcessingFlags::default();
    Some(tail)
}

fn dropped_content_warning(carryovers: &[EnhancedTimedNote]) -> ConversionWarning {
    let lost: u32 = carryovers
        .iter()
        .map(|n| n.note.duration)
        .fold(0u32, |acc, d| acc.saturating_add(d));
    ConversionWarning::new(
        WarningSeverity::Error,
        WarningCategory::SafetyCap,
        format!(
            "measure cap {} reached; remaining content dropped ({} carried ticks lost)",
            MAX_MEASURES, lost
        ),
    )
}

/// Notes of one voice within a measure, in emission order
#[derive(Debug, Clone)]
pub struct VoiceGroup {
    pub voice: u8,
    pub notes: Vec<EnhancedTimedNote>,
}

/// Group a measure's notes by voice, ascending; in-voice order is by start
/// tick with input order preserved for chord members
pub fn group_voices(notes: &[EnhancedTimedNote]) -> Vec<VoiceGroup> {
    let mut voices: Vec<u8> = notes.iter().map(|n| n.note.effective_voice()).collect();
    voices.sort_unstable();
    voices.dedup();

    voices
        .into_iter()
        .map(|voice| {
            let mut members: Vec<EnhancedTimedNote> = notes
                .iter()
                .filter(|n| n.note.effective_voice() == voice)
                .copied()
                .collect();
            // Chord members (equal start) render in ascending pitch order
            members.sort_by_key(|n| (n.note.start_tick, n.note.pitch));
            VoiceGroup {
                voice,
                notes: members,
            }
        })
        .collect()
}
