use serde::{Deserialize, Serialize};

/// MIDI pitch value (0-127); 0 is reserved for rests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pitch(u8);

impl Pitch {
    /// MIDI note number of middle C, the treble/bass staff split point
    pub const MIDDLE_C: u8 = 60;

    pub fn new(value: u8) -> Result<Self, &'static str> {
        if value > 127 {
            return Err("Pitch must be in range 0-127");
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// MIDI velocity (0-127); 0 is reserved for rests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Velocity(u8);

impl Velocity {
    pub fn new(value: u8) -> Result<Self, &'static str> {
        if value > 127 {
            return Err("Velocity must be in range 0-127");
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// MIDI channel (0-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel(u8);

impl Channel {
    pub fn new(value: u8) -> Result<Self, &'static str> {
        if value > 15 {
            return Err("Channel must be in range 0-15");
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Tempo value in beats per minute (BPM).
///
/// Only zero is rejected: a metronome marking must be positive, but the
/// source MIDI tempo map is otherwise passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bpm(u16);

impl Bpm {
    pub fn new(value: u16) -> Result<Self, &'static str> {
        if value == 0 {
            return Err("BPM must be greater than 0");
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Key signature represented as sharps/flats count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature(i8);

impl KeySignature {
    pub fn new(fifths: i8) -> Result<Self, &'static str> {
        if !(-7..=7).contains(&fifths) {
            return Err("KeySignature must be in range -7 (flats) to 7 (sharps)");
        }
        Ok(Self(fifths))
    }

    pub fn fifths(&self) -> i8 {
        self.0
    }
}

impl Default for KeySignature {
    fn default() -> Self {
        Self(0)
    }
}

/// Time signature (beats per measure over beat type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl TimeSignature {
    pub fn new(beats: u8, beat_type: u8) -> Result<Self, &'static str> {
        if beats == 0 {
            return Err("Time signature beats must be greater than 0");
        }
        if !matches!(beat_type, 1 | 2 | 4 | 8 | 16 | 32) {
            return Err("Time signature beat type must be a power of two up to 32");
        }
        Ok(Self { beats, beat_type })
    }

    /// Total measure capacity in ticks at the given divisions-per-quarter.
    ///
    /// `beats * (4 / beat_type) * divisions`, computed without intermediate
    /// truncation so 6/8 at 480 divisions yields 1440, not 0.
    pub fn measure_ticks(&self, divisions: u32) -> u32 {
        (self.beats as u32 * 4 * divisions) / self.beat_type as u32
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { beats: 4, beat_type: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_range() {
        assert!(Pitch::new(0).is_ok());
        assert!(Pitch::new(127).is_ok());
        assert!(Pitch::new(128).is_err());
    }

    #[test]
    fn test_bpm_rejects_only_zero() {
        assert!(Bpm::new(120).is_ok());
        assert!(Bpm::new(0).is_err());
        assert!(Bpm::new(15).is_ok(), "extreme but real tempos pass through");
        assert!(Bpm::new(960).is_ok());
    }

    #[test]
    fn test_key_signature_range() {
        assert!(KeySignature::new(-7).is_ok());
        assert!(KeySignature::new(7).is_ok());
        assert!(KeySignature::new(8).is_err());
    }

    #[test]
    fn test_measure_ticks() {
        let four_four = TimeSignature::new(4, 4).unwrap();
        assert_eq!(four_four.measure_ticks(480), 1920);

        let six_eight = TimeSignature::new(6, 8).unwrap();
        assert_eq!(six_eight.measure_ticks(480), 1440);

        let three_two = TimeSignature::new(3, 2).unwrap();
        assert_eq!(three_two.measure_ticks(480), 2880);
    }

    #[test]
    fn test_time_signature_rejects_invalid() {
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 3).is_err());
    }
}
