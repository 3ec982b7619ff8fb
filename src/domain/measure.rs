//! Time-signature-driven measure container.
//!
//! Capacity is checked per voice: parallel voices legitimately stack inside
//! one measure, but no single voice may hold more ticks than the time
//! signature allows. All arithmetic saturates so malformed input can never
//! underflow a remaining-capacity computation.

use crate::domain::timed_note::TimedNote;
use crate::domain::value_objects::TimeSignature;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    /// 1-based measure number
    pub number: u32,
    pub start_tick: u32,
    pub end_tick: u32,
    pub time_signature: TimeSignature,
    pub notes: Vec<TimedNote>,
}

impl Measure {
    pub fn new(
        number: u32,
        start_tick: u32,
        time_signature: TimeSignature,
        divisions: u32,
    ) -> Result<Self, &'static str> {
        if number == 0 {
            return Err("measure number must be >= 1");
        }
        let max_duration = time_signature.measure_ticks(divisions);
        let end_tick = start_tick
            .checked_add(max_duration)
            .ok_or("measure end tick overflows u32")?;
        Ok(Self {
            number,
            start_tick,
            end_tick,
            time_signature,
            notes: Vec::new(),
        })
    }

    /// Measure capacity in ticks
    pub fn max_duration(&self) -> u32 {
        self.end_tick - self.start_tick
    }

    /// Ticks already used by the given voice.
    ///
    /// Chord members share one time slot: only the first note at each start
    /// tick counts (the chord takes its duration from its first note).
    pub fn used_ticks(&self, voice: u8) -> u32 {
        let mut last_start: Option<u32> = None;
        let mut total: u32 = 0;
        for note in self.notes.iter().filter(|n| n.effective_voice() == voice) {
            if last_start == Some(note.start_tick) {
                continue;
            }
            last_start = Some(note.start_tick);
            total = total.saturating_add(note.duration);
        }
        total
    }

    /// Remaining capacity for the given voice, never underflowing
    pub fn remaining_capacity(&self, voice: u8) -> u32 {
        self.max_duration().saturating_sub(self.used_ticks(voice))
    }

    /// Whether a note of this duration still fits in the given voice
    pub fn fits(&self, duration: u32, voice: u8) -> bool {
        duration <= self.remaining_capacity(voice)
    }

    /// Append a note, enforcing the per-voice capacity invariant
    pub fn add_note(&mut self, note: TimedNote) -> Result<(), &'static str> {
        if !self.fits(note.duration, note.effective_voice()) {
            return Err("note exceeds measure capacity for its voice");
        }
        self.notes.push(note);
        Ok(())
    }
}
