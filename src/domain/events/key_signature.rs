use crate::domain::value_objects::KeySignature;
use serde::{Deserialize, Serialize};

/// Key signature event defines key at a specific tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignatureEvent {
    pub tick: u32,
    pub key: KeySignature,
}

impl KeySignatureEvent {
    pub fn new(tick: u32, key: KeySignature) -> Self {
        Self { tick, key }
    }
}
