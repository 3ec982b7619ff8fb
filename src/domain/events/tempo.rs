use crate::domain::value_objects::Bpm;
use serde::{Deserialize, Serialize};

/// Tempo event defines BPM at a specific tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub tick: u32,
    pub bpm: Bpm,
}

impl TempoEvent {
    pub fn new(tick: u32, bpm: Bpm) -> Self {
        Self { tick, bpm }
    }
}
