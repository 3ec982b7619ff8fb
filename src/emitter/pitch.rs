//! MIDI pitch to MusicXML pitch mapping.

use crate::domain::value_objects::{KeySignature, Pitch};

/// MusicXML pitch spelling: step letter, chromatic alteration, octave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpelledPitch {
    pub step: char,
    pub alter: i8,
    pub octave: i8,
}

/// Sharp spellings per chromatic step
const SHARP_SPELLINGS: [(char, i8); 12] = [
    ('C', 0),
    ('C', 1),
    ('D', 0),
    ('D', 1),
    ('E', 0),
    ('F', 0),
    ('F', 1),
    ('G', 0),
    ('G', 1),
    ('A', 0),
    ('A', 1),
    ('B', 0),
];

/// Flat spellings per chromatic step
const FLAT_SPELLINGS: [(char, i8); 12] = [
    ('C', 0),
    ('D', -1),
    ('D', 0),
    ('E', -1),
    ('E', 0),
    ('F', 0),
    ('G', -1),
    ('G', 0),
    ('A', -1),
    ('A', 0),
    ('B', -1),
    ('B', 0),
];

/// Spell a MIDI pitch, preferring flats in flat keys
pub fn spell_pitch(pitch: u8, key: KeySignature) -> SpelledPitch {
    let semitone = (pitch % 12) as usize;
    let octave = (pitch / 12) as i8 - 1;
    let (step, alter) = if key.fifths() < 0 {
        FLAT_SPELLINGS[semitone]
    } else {
        SHARP_SPELLINGS[semitone]
    };
    SpelledPitch {
        step,
        alter,
        octave,
    }
}

/// Grand staff assignment: treble staff for middle C and above
pub fn staff_number(pitch: u8) -> u8 {
    if pitch >= Pitch::MIDDLE_C { 1 } else { 2 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c_major() -> KeySignature {
        KeySignature::default()
    }

    #[test]
    fn test_middle_c() {
        let spelled = spell_pitch(60, c_major());
        assert_eq!(spelled.step, 'C');
        assert_eq!(spelled.alter, 0);
        assert_eq!(spelled.octave, 4);
    }

    #[test]
    fn test_sharp_spelling_in_sharp_keys() {
        let spelled = spell_pitch(61, c_major());
        assert_eq!((spelled.step, spelled.alter), ('C', 1));
    }

    #[test]
    fn test_flat_spelling_in_flat_keys() {
        let f_major = KeySignature::new(-1).unwrap();
        let spelled = spell_pitch(61, f_major);
        assert_eq!((spelled.step, spelled.alter), ('D', -1));
    }

    #[test]
    fn test_octave_boundaries() {
        assert_eq!(spell_pitch(59, c_major()).octave, 3); // B3
        assert_eq!(spell_pitch(60, c_major()).octave, 4); // C4
        assert_eq!(spell_pitch(0, c_major()).octave, -1);
        assert_eq!(spell_pitch(127, c_major()).octave, 9); // G9
    }

    #[test]
    fn test_staff_split_at_middle_c() {
        assert_eq!(staff_number(60), 1);
        assert_eq!(staff_number(59), 2);
        assert_eq!(staff_number(72), 1);
        assert_eq!(staff_number(40), 2);
    }
}
