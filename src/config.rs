//! Converter configuration.
//!
//! Grouped the way callers reason about it: which phases run, how picky the
//! detectors are, what the safety envelope looks like, and how conflicts are
//! handled. Every knob has a serde-friendly default.

use serde::{Deserialize, Serialize};

/// Per-phase enable switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub tuplet: bool,
    pub beam: bool,
    pub rest: bool,
    pub dynamics: bool,
    pub coordination: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            tuplet: true,
            beam: true,
            rest: true,
            dynamics: true,
            coordination: true,
        }
    }
}

/// Detection quality thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum tuplet classification confidence in [0, 1]
    pub tuplet_min_confidence: f64,
    /// Break beams at tuplet boundaries (conflict rules 2 and 3)
    pub enable_beam_tuplet_coordination: bool,
    /// Keep optimized rests from splitting beam groups (conflict rule 4)
    pub enable_rest_beam_coordination: bool,
    /// Small alignment-score bonus for rests that do not conflict with beams
    pub prioritize_readability: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            tuplet_min_confidence: 0.70,
            enable_beam_tuplet_coordination: true,
            enable_rest_beam_coordination: true,
            prioritize_readability: false,
        }
    }
}

/// Safety and performance envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Post-hoc average cost target per note
    pub max_processing_time_per_note_ns: u64,
    /// Post-hoc arena overhead target vs. the raw note footprint
    pub max_memory_overhead_percent: u32,
    /// Degrade gracefully on missed targets instead of surfacing an error
    pub enable_performance_fallback: bool,
    /// Wall-clock circuit breaker for one batch
    pub max_total_processing_time_seconds: u64,
    /// Outer-loop iteration cap inside each phase
    pub max_iterations_per_loop: u32,
    /// Largest batch the pipeline accepts
    pub max_notes_per_batch: usize,
    /// Refusal threshold for pathological inputs
    pub complexity_threshold: usize,
    /// Master switch for the entry/between-phase guards
    pub enable_emergency_circuit_breaker: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_processing_time_per_note_ns: 100,
            max_memory_overhead_percent: 20,
            enable_performance_fallback: true,
            max_total_processing_time_seconds: 30,
            max_iterations_per_loop: 10_000,
            max_notes_per_batch: 50_000,
            complexity_threshold: 100_000,
            enable_emergency_circuit_breaker: true,
        }
    }
}

/// Policy applied when the coordinator hits a conflict no rule resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationFailureMode {
    /// Surface the conflict as a batch error
    Strict,
    /// Clear the conflicting annotation pair and continue
    #[default]
    Fallback,
    /// Leave the annotations inconsistent; the emitter tolerates them
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CoordinationConfig {
    pub coordination_failure_mode: CoordinationFailureMode,
}

/// Velocity-to-dynamic mapping preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsPreset {
    /// Even thresholds across the full velocity range
    #[default]
    Classical,
    /// Wider extremes: soft playing maps further down, loud further up
    Romantic,
    /// Compressed center: most velocities land between mp and f
    Modern,
}

/// Top-level converter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConverterConfig {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub dynamics_config: DynamicsPreset,
}
