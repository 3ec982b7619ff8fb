//! Tick-to-division conversion and note type classification.
//!
//! Conversion between the MIDI tick domain and MusicXML divisions uses a
//! gcd-reduced integer ratio so equal inputs always convert equally; inexact
//! quotients are rounded and flagged so the caller can surface a precision
//! warning.

use serde::{Deserialize, Serialize};

/// Integer ratio converter from MIDI ticks to MusicXML divisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionConverter {
    numerator: u32,
    denominator: u32,
}

impl DivisionConverter {
    /// Build the reduced `target_divisions / midi_ppq` ratio
    pub fn new(target_divisions: u32, midi_ppq: u32) -> Result<Self, &'static str> {
        if target_divisions == 0 || midi_ppq == 0 {
            return Err("divisions and PPQ must be positive");
        }
        let divisor = gcd(target_divisions, midi_ppq);
        Ok(Self {
            numerator: target_divisions / divisor,
            denominator: midi_ppq / divisor,
        })
    }

    /// Convert a tick count; the bool is true when the result was exact
    pub fn convert(&self, ticks: u32) -> (u32, bool) {
        let scaled = ticks as u64 * self.numerator as u64;
        let exact = scaled % self.denominator as u64 == 0;
        let rounded = (scaled + self.denominator as u64 / 2) / self.denominator as u64;
        (rounded as u32, exact)
    }

    /// True when every conversion is exact (PPQ divides the target evenly)
    pub fn is_identity_safe(&self) -> bool {
        self.denominator == 1
    }
}

/// Compute greatest common divisor using the Euclidean algorithm
fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// MusicXML note type plus dot flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteType {
    pub name: &'static str,
    pub dotted: bool,
}

/// Standard type names paired with their length in quarter notes
const STANDARD_TYPES: [(&str, f64); 10] = [
    ("breve", 8.0),
    ("whole", 4.0),
    ("half", 2.0),
    ("quarter", 1.0),
    ("eighth", 0.5),
    ("16th", 0.25),
    ("32nd", 0.125),
    ("64th", 0.0625),
    ("128th", 0.03125),
    ("256th", 0.015625),
];

/// Classify a duration (in divisions) into a MusicXML note type.
///
/// An exact 1.5x multiple of a standard value classifies as that value
/// dotted (720 at 480 divisions is a dotted quarter, not a half); everything
/// else falls through to the plain threshold ladder.
pub fn classify_note_type(duration: u32, divisions: u32) -> NoteType {
    if divisions > 0 {
        for (name, quarters) in STANDARD_TYPES {
            let base = quarters * divisions as f64;
            if base >= 1.0 && duration as f64 == 1.5 * base {
                return NoteType { name, dotted: true };
            }
        }
    }

    let ratio = if divisions == 0 {
        1.0
    } else {
        duration as f64 / divisions as f64
    };
    let name = if ratio >= 6.0 {
        "breve"
    } else if ratio >= 3.0 {
        "whole"
    } else if ratio >= 1.5 {
        "half"
    } else if ratio >= 0.75 {
        "quarter"
    } else if ratio >= 0.375 {
        "eighth"
    } else if ratio >= 0.1875 {
        "16th"
    } else if ratio >= 0.09375 {
        "32nd"
    } else if ratio >= 0.046875 {
        "64th"
    } else if ratio >= 0.0234375 {
        "128th"
    } else {
        "256th"
    };
    NoteType { name, dotted: false }
}
