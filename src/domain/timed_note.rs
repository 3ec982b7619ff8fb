use serde::{Deserialize, Serialize};

/// A single timed note (or rest) from a parsed MIDI performance.
///
/// Rests are encoded as `pitch == 0 && velocity == 0`. Voice 0 means
/// "unassigned" and is treated as voice 1 throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedNote {
    pub pitch: u8,
    pub channel: u8,
    pub velocity: u8,
    pub start_tick: u32,
    pub duration: u32,
    pub voice: u8,
    pub track: u8,
}

impl TimedNote {
    pub fn new(
        pitch: u8,
        channel: u8,
        velocity: u8,
        start_tick: u32,
        duration: u32,
        voice: u8,
        track: u8,
    ) -> Result<Self, &'static str> {
        if pitch > 127 {
            return Err("pitch must be in range 0-127");
        }
        if channel > 15 {
            return Err("channel must be in range 0-15");
        }
        if velocity > 127 {
            return Err("velocity must be in range 0-127");
        }
        if voice > 8 {
            return Err("voice must be in range 0-8");
        }
        if start_tick.checked_add(duration).is_none() {
            return Err("start_tick + duration overflows u32");
        }
        Ok(Self {
            pitch,
            channel,
            velocity,
            start_tick,
            duration,
            voice,
            track,
        })
    }

    /// Convenience constructor for a sounding note on channel 0, track 0
    pub fn note(pitch: u8, velocity: u8, start_tick: u32, duration: u32) -> Result<Self, &'static str> {
        Self::new(pitch, 0, velocity, start_tick, duration, 0, 0)
    }

    /// Convenience constructor for a rest
    pub fn rest(start_tick: u32, duration: u32) -> Result<Self, &'static str> {
        Self::new(0, 0, 0, start_tick, duration, 0, 0)
    }

    pub fn is_rest(&self) -> bool {
        self.pitch == 0 && self.velocity == 0
    }

    pub fn end_tick(&self) -> u32 {
        self.start_tick + self.duration
    }

    /// Voice number with the unassigned sentinel resolved to voice 1
    pub fn effective_voice(&self) -> u8 {
        if self.voice == 0 { 1 } else { self.voice }
    }
}
