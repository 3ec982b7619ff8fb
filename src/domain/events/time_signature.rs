use crate::domain::value_objects::TimeSignature;
use serde::{Deserialize, Serialize};

/// Time signature event defines meter at a specific tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignatureEvent {
    pub tick: u32,
    pub time_signature: TimeSignature,
}

impl TimeSignatureEvent {
    pub fn new(tick: u32, time_signature: TimeSignature) -> Self {
        Self {
            tick,
            time_signature,
        }
    }
}
