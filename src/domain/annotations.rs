//! Annotation records produced by the notation pipeline.
//!
//! Each record is an independent, optional attachment to a note. Records are
//! owned by the phase arena; notes address them through generational handles,
//! never by embedding.

use serde::{Deserialize, Serialize};

/// Tuplet classification by member count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TupletKind {
    Triplet,
    Quintuplet,
    Sextuplet,
    Septuplet,
}

impl TupletKind {
    /// All kinds the detector attempts, in note-count order
    pub const ALL: [TupletKind; 4] = [
        TupletKind::Triplet,
        TupletKind::Quintuplet,
        TupletKind::Sextuplet,
        TupletKind::Septuplet,
    ];

    pub fn from_note_count(count: usize) -> Option<Self> {
        match count {
            3 => Some(TupletKind::Triplet),
            5 => Some(TupletKind::Quintuplet),
            6 => Some(TupletKind::Sextuplet),
            7 => Some(TupletKind::Septuplet),
            _ => None,
        }
    }

    pub fn note_count(&self) -> u8 {
        match self {
            TupletKind::Triplet => 3,
            TupletKind::Quintuplet => 5,
            TupletKind::Sextuplet => 6,
            TupletKind::Septuplet => 7,
        }
    }

    /// MusicXML time-modification ratio: N notes in the time of M
    pub fn ratio(&self) -> (u8, u8) {
        match self {
            TupletKind::Triplet => (3, 2),
            TupletKind::Quintuplet => (5, 4),
            TupletKind::Sextuplet => (6, 4),
            TupletKind::Septuplet => (7, 4),
        }
    }
}

/// Tuplet membership annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TupletInfo {
    pub kind: TupletKind,
    pub start_tick: u32,
    pub end_tick: u32,
    /// Duration of one beat in ticks at detection time
    pub beat_unit: u32,
    /// Zero-based position of the note within the tuplet
    pub position: u8,
    /// Classification confidence in [0, 1]
    pub confidence: f64,
    pub starts_tuplet: bool,
    pub ends_tuplet: bool,
}

/// Beam state at a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamState {
    None,
    Begin,
    Continue,
    End,
}

/// Beam annotation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamingInfo {
    pub state: BeamState,
    /// Beam level: 1 = eighth, 2 = sixteenth, 3 = thirty-second
    pub level: u8,
    pub can_beam: bool,
    /// Fractional position within the beat, in [0, 1)
    pub beat_position: f64,
    /// Index of the first note of the group in the batch
    pub group_id: u32,
}

/// Consolidated rest annotation, attached to the first rest of a merged run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestInfo {
    pub start_time: u32,
    /// Total covered span of the merged run, gaps included
    pub duration: u32,
    pub is_optimized_rest: bool,
    /// Duration of the first rest before merging
    pub original_duration: u32,
    /// Beat-alignment grade in [0, 1]
    pub alignment_score: f64,
}

/// Dynamic markings from softest to loudest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
}

impl Dynamic {
    /// MusicXML element name for this marking
    pub fn element_name(&self) -> &'static str {
        match self {
            Dynamic::Ppp => "ppp",
            Dynamic::Pp => "pp",
            Dynamic::P => "p",
            Dynamic::Mp => "mp",
            Dynamic::Mf => "mf",
            Dynamic::F => "f",
            Dynamic::Ff => "ff",
            Dynamic::Fff => "fff",
        }
    }

    /// Nominal MIDI velocity for `<sound dynamics>` playback hints
    pub fn nominal_velocity(&self) -> u8 {
        match self {
            Dynamic::Ppp => 16,
            Dynamic::Pp => 33,
            Dynamic::P => 49,
            Dynamic::Mp => 64,
            Dynamic::Mf => 80,
            Dynamic::F => 96,
            Dynamic::Ff => 112,
            Dynamic::Fff => 126,
        }
    }
}

/// Dynamics annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicsInfo {
    pub time_position: u32,
    pub dynamic: Dynamic,
    pub previous_dynamic: Option<Dynamic>,
    /// True when the marking differs from the previous one in scan order
    pub triggers_new_dynamic: bool,
}

/// Stem direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemDirection {
    Up,
    Down,
}

/// Stem annotation, recording the resolved direction and its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemInfo {
    pub direction: StemDirection,
    pub beam_influenced: bool,
    pub voice: u8,
    pub in_beam_group: bool,
    pub beam_group_id: Option<u32>,
    /// Semitone offset from the middle line of the note's staff
    pub staff_position: i8,
}
