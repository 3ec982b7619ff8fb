pub mod annotations;
pub mod chord;
pub mod errors;
pub mod events;
pub mod measure;
pub mod timed_note;
pub mod track;
pub mod value_objects;
