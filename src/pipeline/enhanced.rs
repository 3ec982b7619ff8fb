//! Notes augmented with optional annotation slots.

use crate::domain::annotations::{BeamingInfo, DynamicsInfo, RestInfo, StemInfo, TupletInfo};
use crate::domain::timed_note::TimedNote;
use crate::pipeline::arena::ArenaRef;

/// Bitset recording which phases have observed a note.
///
/// A phase sets its bit even when it produces no annotation, so "skipped"
/// and "not yet run" stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingFlags(u8);

impl ProcessingFlags {
    const TUPLET: u8 = 1 << 0;
    const BEAMING: u8 = 1 << 1;
    const REST: u8 = 1 << 2;
    const DYNAMICS: u8 = 1 << 3;
    const STEM: u8 = 1 << 4;

    pub fn mark_tuplet_processed(&mut self) {
        self.0 |= Self::TUPLET;
    }

    pub fn mark_beaming_processed(&mut self) {
        self.0 |= Self::BEAMING;
    }

    pub fn mark_rest_processed(&mut self) {
        self.0 |= Self::REST;
    }

    pub fn mark_dynamics_processed(&mut self) {
        self.0 |= Self::DYNAMICS;
    }

    pub fn mark_stem_processed(&mut self) {
        self.0 |= Self::STEM;
    }

    pub fn tuplet_processed(&self) -> bool {
        self.0 & Self::TUPLET != 0
    }

    pub fn beaming_processed(&self) -> bool {
        self.0 & Self::BEAMING != 0
    }

    pub fn rest_processed(&self) -> bool {
        self.0 & Self::REST != 0
    }

    pub fn dynamics_processed(&self) -> bool {
        self.0 & Self::DYNAMICS != 0
    }

    pub fn stem_processed(&self) -> bool {
        self.0 & Self::STEM != 0
    }
}

/// A note plus its five optional annotation handles.
///
/// Handles point into the batch's `ScopedArena`; after
/// `reset_for_next_cycle` they resolve to `None` and the enhanced slice must
/// be rebuilt before reuse. The tie flags are emission-side metadata set by
/// the measure partitioner when it splits a note across a barline.
#[derive(Debug, Clone, Copy)]
pub struct EnhancedTimedNote {
    pub note: TimedNote,
    pub tuplet: Option<ArenaRef<TupletInfo>>,
    pub beaming: Option<ArenaRef<BeamingInfo>>,
    pub rest: Option<ArenaRef<RestInfo>>,
    pub dynamics: Option<ArenaRef<DynamicsInfo>>,
    pub stem: Option<ArenaRef<StemInfo>>,
    pub flags: ProcessingFlags,
    pub tie_start: bool,
    pub tie_stop: bool,
}

impl EnhancedTimedNote {
    pub fn new(note: TimedNote) -> Self {
        Self {
            note,
            tuplet: None,
            beaming: None,
            rest: None,
            dynamics: None,
            stem: None,
            flags: ProcessingFlags::default(),
            tie_start: false,
            tie_stop: false,
        }
    }
}
