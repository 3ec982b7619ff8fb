pub mod key_signature;
pub mod tempo;
pub mod time_signature;
