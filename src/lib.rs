//! MIDI performance to educational MusicXML conversion core.
//!
//! Consumes parsed MIDI track events (a [`MultiTrackContainer`]) and emits a
//! MusicXML 4.0 partwise text stream enriched with tuplet brackets, beam
//! groups, consolidated rests, dynamics markings, stem directions, and
//! multi-voice layout. MIDI byte parsing and MXL zip packaging are the
//! caller's concern.
//!
//! ```no_run
//! use midi2mxl::config::ConverterConfig;
//! use midi2mxl::domain::track::{MultiTrackContainer, PartMetadata, Track};
//! use midi2mxl::Converter;
//!
//! let mut container = MultiTrackContainer::new(480);
//! container.add_track(Track::new(PartMetadata::new("Piano")));
//!
//! let mut converter = Converter::new(ConverterConfig::default());
//! let result = converter.convert(&container)?;
//! println!("{}", result.musicxml);
//! # Ok::<(), midi2mxl::domain::errors::ConvertError>(())
//! ```

pub mod config;
pub mod domain;
pub mod emitter;
pub mod pipeline;

pub use config::ConverterConfig;
pub use domain::errors::{ConversionWarning, ConvertError};
pub use domain::timed_note::TimedNote;
pub use domain::track::MultiTrackContainer;
pub use pipeline::{AnnotationPipeline, PipelineMetrics};

use domain::value_objects::KeySignature;
use emitter::{Part, ScoreHeader};

/// Divisions-per-quarter written into emitted documents
pub const TARGET_DIVISIONS: u32 = 480;

/// Output of one conversion: the document plus diagnostics
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub musicxml: String,
    pub warnings: Vec<ConversionWarning>,
    pub metrics: PipelineMetrics,
}

/// The conversion facade: one annotation pipeline reused across calls.
///
/// Each `convert` call is one pipeline batch; the arena is reset after
/// emission, so metrics accumulate while annotations never leak between
/// scores.
pub struct Converter {
    pipeline: AnnotationPipeline,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            pipeline: AnnotationPipeline::new(config),
        }
    }

    /// Convert a parsed performance into MusicXML text.
    pub fn convert(
        &mut self,
        container: &MultiTrackContainer,
    ) -> Result<ConversionResult, ConvertError> {
        if container.ppq == 0 {
            return Err(ConvertError::InvalidInput("PPQ must be positive"));
        }

        let header = ScoreHeader {
            key: container
                .initial_key_signature()
                .map(|e| e.key)
                .unwrap_or_else(KeySignature::default),
            time_signature: container
                .initial_time_signature()
                .map(|e| e.time_signature)
                .unwrap_or_default(),
            tempo: container.initial_tempo().map(|e| e.bpm),
        };

        // Merge all tracks into one batch, stamping the track index so the
        // per-part split survives the pipeline's sort
        let mut all_notes: Vec<TimedNote> = Vec::with_capacity(container.note_count());
        for (index, track) in container.tracks.iter().enumerate() {
            for note in &track.notes {
                let mut tagged = *note;
                tagged.track = index.min(u8::MAX as usize) as u8;
                all_notes.push(tagged);
            }
        }

        let enhanced = match self
            .pipeline
            .process(&all_notes, container.ppq, header.time_signature)
        {
            Ok(enhanced) => enhanced,
            Err(err) => {
                self.pipeline.reset_for_next_cycle();
                return Err(err);
            }
        };

        let mut warnings: Vec<ConversionWarning> = Vec::new();
        let mut parts: Vec<Part> = Vec::new();
        for (index, track) in container.tracks.iter().enumerate() {
            let track_notes: Vec<_> = enhanced
                .iter()
                .filter(|n| n.note.track as usize == index)
                .copied()
                .collect();
            let measures = emitter::partition_measures(
                &track_notes,
                header.time_signature,
                container.ppq,
                &mut warnings,
            );
            parts.push(Part {
                metadata: track.metadata.clone(),
                measures,
            });
        }

        let emit_result = emitter::emit_score(
            &parts,
            self.pipeline.arena(),
            container.ppq,
            TARGET_DIVISIONS,
            header,
        );

        let result = match emit_result {
            Ok((musicxml, emit_warnings)) => {
                warnings.extend(emit_warnings);
                Ok(ConversionResult {
                    musicxml,
                    warnings,
                    metrics: self.pipeline.get_metrics(),
                })
            }
            Err(err) => Err(err),
        };
        self.pipeline.reset_for_next_cycle();
        result
    }

    /// Metrics snapshot accumulated over every conversion so far
    pub fn get_metrics(&self) -> PipelineMetrics {
        self.pipeline.get_metrics()
    }

    pub fn config(&self) -> &ConverterConfig {
        self.pipeline.config()
    }
}
