//! Notation annotation pipeline.
//!
//! Runs the educational phases in a fixed order over one batch of timed
//! notes: tuplet detection, beam grouping, rest optimization, dynamics
//! mapping, cross-feature coordination, stem resolution. Phases are
//! feature-gated, sequential, and single-threaded; every annotation lives in
//! the batch's arena until `reset_for_next_cycle`.

pub mod arena;
pub mod beams;
pub mod coordinator;
pub mod dynamics;
pub mod enhanced;
pub mod metrics;
pub mod rests;
pub mod stems;
pub mod tuplets;

pub use arena::{ArenaRef, Phase, ScopedArena};
pub use enhanced::{EnhancedTimedNote, ProcessingFlags};
pub use metrics::PipelineMetrics;

use crate::config::ConverterConfig;
use crate::domain::errors::ConvertError;
use crate::domain::timed_note::TimedNote;
use crate::domain::value_objects::TimeSignature;
use dynamics::DynamicsMapper;
use metrics::MetricsRecorder;
use std::time::Instant;

/// Result counters shared by the detection phases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// Annotations attached by the phase
    pub annotated: usize,
    /// An iteration cap terminated the scan early
    pub capped: bool,
    /// An allocation failure degraded the phase in recovery mode
    pub degraded: bool,
}

/// Lifecycle of one phase within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseState {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

/// The annotation pipeline. Owns the arena and metrics for its lifetime;
/// one `process` call handles one batch.
pub struct AnnotationPipeline {
    config: ConverterConfig,
    arena: ScopedArena,
    recorder: MetricsRecorder,
    mapper: DynamicsMapper,
    phase_states: [PhaseState; Phase::COUNT],
    conflicts_resolved: u64,
    base_note_bytes: usize,
}

impl AnnotationPipeline {
    pub fn new(config: ConverterConfig) -> Self {
        let mapper = DynamicsMapper::new(config.dynamics_config);
        Self {
            config,
            arena: ScopedArena::new(),
            recorder: MetricsRecorder::new(),
            mapper,
            phase_states: [PhaseState::Pending; Phase::COUNT],
            conflicts_resolved: 0,
            base_note_bytes: 0,
        }
    }

    /// Run every enabled phase over one batch.
    ///
    /// `beat_unit` is the duration of one quarter note in the batch's tick
    /// domain (the MIDI PPQ). Notes are stably sorted by start tick first;
    /// annotations attach to the returned enhanced notes and stay valid
    /// until the next `reset_for_next_cycle`.
    pub fn process(
        &mut self,
        notes: &[TimedNote],
        beat_unit: u32,
        time_signature: TimeSignature,
    ) -> Result<Vec<EnhancedTimedNote>, ConvertError> {
        self.check_entry_guards(notes.len())?;
        self.phase_states = [PhaseState::Pending; Phase::COUNT];
        self.base_note_bytes = std::mem::size_of_val(notes);

        let started = Instant::now();
        let mut sorted: Vec<TimedNote> = notes.to_vec();
        sorted.sort_by_key(|n| n.start_tick);
        let mut enhanced: Vec<EnhancedTimedNote> =
            sorted.into_iter().map(EnhancedTimedNote::new).collect();

        let features = self.config.features;
        let quality = self.config.quality;
        let performance = self.config.performance;
        let coordination = self.config.coordination;
        let measure_ticks = time_signature.measure_ticks(beat_unit);

        if features.tuplet {
            self.check_time_guard(&started)?;
            self.enter(Phase::Tuplet);
            let result = tuplets::annotate_tuplets(
                &mut enhanced,
                &mut self.arena,
                beat_unit,
                &quality,
                &performance,
            );
            self.leave(Phase::Tuplet, result)?;
        }

        if features.beam {
            self.check_time_guard(&started)?;
            self.enter(Phase::Beam);
            let result = beams::annotate_beams(
                &mut enhanced,
                &mut self.arena,
                beat_unit,
                &quality,
                &performance,
            );
            self.leave(Phase::Beam, result)?;
        }

        if features.rest {
            self.check_time_guard(&started)?;
            self.enter(Phase::Rest);
            let result = rests::annotate_rests(
                &mut enhanced,
                &mut self.arena,
                beat_unit,
                &quality,
                &performance,
            );
            self.leave(Phase::Rest, result)?;
        }

        if features.dynamics {
            self.check_time_guard(&started)?;
            self.enter(Phase::Dynamics);
            let result = dynamics::annotate_dynamics(
                &mut enhanced,
                &mut self.arena,
                &self.mapper,
                &performance,
            );
            self.leave(Phase::Dynamics, result)?;
        }

        self.conflicts_resolved = 0;
        if features.coordination {
            self.check_time_guard(&started)?;
            self.enter(Phase::Coordination);
            self.phase_states[Phase::Coordination.index()] = PhaseState::Running;
            match coordinator::coordinate(
                &mut enhanced,
                &mut self.arena,
                beat_unit,
                measure_ticks,
                &quality,
                &coordination,
            ) {
                Ok(outcome) => {
                    self.conflicts_resolved = outcome.conflicts_resolved;
                    self.arena.end_phase();
                    self.phase_states[Phase::Coordination.index()] = PhaseState::Done;
                }
                Err(err) => {
                    self.arena.end_phase();
                    self.phase_states[Phase::Coordination.index()] = PhaseState::Failed;
                    self.recorder.record_error();
                    return Err(err);
                }
            }
        }

        // Stems always run: every pitched note needs a direction at emission
        self.check_time_guard(&started)?;
        self.enter(Phase::Stem);
        let result = stems::annotate_stems(&mut enhanced, &mut self.arena, &performance);
        self.leave(Phase::Stem, result)?;

        let elapsed_ns = started.elapsed().as_nanos() as u64;
        self.recorder
            .record_cycle(enhanced.len(), elapsed_ns, self.conflicts_resolved);
        self.check_performance_targets()?;

        Ok(enhanced)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase_states[phase.index()] = PhaseState::Running;
        self.arena.begin_phase(phase);
    }

    fn leave(
        &mut self,
        phase: Phase,
        result: Result<PhaseOutcome, ConvertError>,
    ) -> Result<(), ConvertError> {
        self.arena.end_phase();
        match result {
            Ok(outcome) if outcome.capped || outcome.degraded => {
                self.phase_states[phase.index()] = PhaseState::Failed;
                self.recorder.record_error();
                Ok(())
            }
            Ok(_) => {
                self.phase_states[phase.index()] = PhaseState::Done;
                Ok(())
            }
            Err(err) => {
                self.phase_states[phase.index()] = PhaseState::Failed;
                self.recorder.record_error();
                Err(err)
            }
        }
    }

    /// Entry guards of the emergency circuit breaker
    fn check_entry_guards(&self, note_count: usize) -> Result<(), ConvertError> {
        let performance = &self.config.performance;
        if !performance.enable_emergency_circuit_breaker {
            return Ok(());
        }
        if note_count > performance.complexity_threshold {
            return Err(ConvertError::SystemStabilityRisk {
                notes: note_count,
                threshold: performance.complexity_threshold,
            });
        }
        if note_count > performance.max_notes_per_batch {
            return Err(ConvertError::SystemStabilityRisk {
                notes: note_count,
                threshold: performance.max_notes_per_batch,
            });
        }
        Ok(())
    }

    /// Between-phase wall-clock guard
    fn check_time_guard(&self, started: &Instant) -> Result<(), ConvertError> {
        let performance = &self.config.performance;
        if !performance.enable_emergency_circuit_breaker {
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed.as_secs() > performance.max_total_processing_time_seconds {
            return Err(ConvertError::ProcessingTimeout {
                elapsed_seconds: elapsed.as_secs_f64(),
                limit_seconds: performance.max_total_processing_time_seconds,
            });
        }
        Ok(())
    }

    /// Post-hoc performance target checks
    fn check_performance_targets(&mut self) -> Result<(), ConvertError> {
        let performance = &self.config.performance;
        let avg = self.recorder.avg_ns_per_note();
        if avg > performance.max_processing_time_per_note_ns {
            if performance.enable_performance_fallback {
                log::warn!(
                    "pipeline averaged {} ns/note against a {} ns target",
                    avg,
                    performance.max_processing_time_per_note_ns
                );
            } else {
                self.recorder.record_error();
                return Err(ConvertError::PerformanceTargetExceeded {
                    actual_ns: avg,
                    target_ns: performance.max_processing_time_per_note_ns,
                });
            }
        }

        if self.base_note_bytes > 0 {
            let overhead =
                (self.arena.stats().used_bytes as u64 * 100) / self.base_note_bytes as u64;
            if overhead > performance.max_memory_overhead_percent as u64 {
                log::warn!(
                    "annotation memory at {}% of the note footprint, target is {}%",
                    overhead,
                    performance.max_memory_overhead_percent
                );
            }
        }
        Ok(())
    }

    /// Read access for annotation resolution during emission
    pub fn arena(&self) -> &ScopedArena {
        &self.arena
    }

    /// Conflicts resolved in the most recent cycle
    pub fn conflicts_resolved(&self) -> u64 {
        self.conflicts_resolved
    }

    pub fn phase_state(&self, phase: Phase) -> PhaseState {
        self.phase_states[phase.index()]
    }

    /// Current metrics snapshot
    pub fn get_metrics(&self) -> PipelineMetrics {
        self.recorder
            .snapshot(self.arena.stats(), self.base_note_bytes)
    }

    /// Invalidate every annotation handed out for the last batch
    pub fn reset_for_next_cycle(&mut self) {
        self.arena.reset_for_next_cycle();
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }
}
