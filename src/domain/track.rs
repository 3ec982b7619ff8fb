//! Input container for a parsed multi-track MIDI performance.
//!
//! This is the boundary format between the external MIDI parser and the
//! conversion core; it is serde-serializable so tools can hand it over as
//! JSON.

use crate::domain::events::key_signature::KeySignatureEvent;
use crate::domain::events::tempo::TempoEvent;
use crate::domain::events::time_signature::TimeSignatureEvent;
use crate::domain::timed_note::TimedNote;
use serde::{Deserialize, Serialize};

/// Descriptive metadata for one logical part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartMetadata {
    pub name: String,
    /// MIDI channel the part plays on (0-15), if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_channel: Option<u8>,
    /// MIDI program number (0-127), if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_program: Option<u8>,
    #[serde(default)]
    pub is_percussion: bool,
}

impl PartMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            midi_channel: None,
            midi_program: None,
            is_percussion: false,
        }
    }

    /// Set the MIDI channel (builder pattern)
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.midi_channel = Some(channel);
        self
    }

    /// Set the MIDI program (builder pattern)
    pub fn with_program(mut self, program: u8) -> Self {
        self.midi_program = Some(program);
        self
    }
}

/// One parsed MIDI track: its notes plus structural events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub metadata: PartMetadata,
    pub notes: Vec<TimedNote>,
    #[serde(default)]
    pub tempo_events: Vec<TempoEvent>,
    #[serde(default)]
    pub time_signature_events: Vec<TimeSignatureEvent>,
    #[serde(default)]
    pub key_signature_events: Vec<KeySignatureEvent>,
}

impl Track {
    pub fn new(metadata: PartMetadata) -> Self {
        Self {
            metadata,
            notes: Vec::new(),
            tempo_events: Vec::new(),
            time_signature_events: Vec::new(),
            key_signature_events: Vec::new(),
        }
    }
}

/// Complete parsed performance: all tracks plus the source resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTrackContainer {
    /// Pulses per quarter note of the MIDI source
    pub ppq: u32,
    pub tracks: Vec<Track>,
}

impl MultiTrackContainer {
    pub fn new(ppq: u32) -> Self {
        Self {
            ppq,
            tracks: Vec::new(),
        }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Total note count across all tracks
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// First tempo event across all tracks, by tick
    pub fn initial_tempo(&self) -> Option<&TempoEvent> {
        self.tracks
            .iter()
            .flat_map(|t| t.tempo_events.iter())
            .min_by_key(|e| e.tick)
    }

    /// First time signature across all tracks, by tick
    pub fn initial_time_signature(&self) -> Option<&TimeSignatureEvent> {
        self.tracks
            .iter()
            .flat_map(|t| t.time_signature_events.iter())
            .min_by_key(|e| e.tick)
    }

    /// First key signature across all tracks, by tick
    pub fn initial_key_signature(&self) -> Option<&KeySignatureEvent> {
        self.tracks
            .iter()
            .flat_map(|t| t.key_signature_events.iter())
            .min_by_key(|e| e.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Bpm, TimeSignature};

    #[test]
    fn test_container_note_count() {
        let mut container = MultiTrackContainer::new(480);
        let mut track = Track::new(PartMetadata::new("Piano"));
        track.notes.push(TimedNote::note(60, 80, 0, 480).unwrap());
        track.notes.push(TimedNote::note(64, 80, 480, 480).unwrap());
        container.add_track(track);

        assert_eq!(container.note_count(), 2);
    }

    #[test]
    fn test_initial_events_pick_earliest() {
        let mut container = MultiTrackContainer::new(480);
        let mut t0 = Track::new(PartMetadata::new("A"));
        t0.tempo_events.push(TempoEvent::new(960, Bpm::new(90).unwrap()));
        let mut t1 = Track::new(PartMetadata::new("B"));
        t1.tempo_events.push(TempoEvent::new(0, Bpm::new(120).unwrap()));
        t1.time_signature_events
            .push(TimeSignatureEvent::new(0, TimeSignature::new(3, 4).unwrap()));
        container.add_track(t0);
        container.add_track(t1);

        assert_eq!(container.initial_tempo().unwrap().bpm.value(), 120);
        assert_eq!(
            container.initial_time_signature().unwrap().time_signature.beats,
            3
        );
        assert!(container.initial_key_signature().is_none());
    }

    #[test]
    fn test_part_metadata_builders() {
        let meta = PartMetadata::new("Flute").with_channel(2).with_program(73);
        assert_eq!(meta.midi_channel, Some(2));
        assert_eq!(meta.midi_program, Some(73));
        assert!(!meta.is_percussion);
    }
}
