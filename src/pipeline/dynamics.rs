//! Velocity-to-dynamic mapping.
//!
//! Each preset is a precomputed 128-entry lookup table built once and shared.
//! The mapping itself is context-free; the scan only threads the previously
//! seen marking through so `triggers_new_dynamic` can be set on changes.
//! Collapsing repeated identical markings into a single printed direction is
//! the emitter's job.

use crate::config::{DynamicsPreset, PerformanceConfig};
use crate::domain::annotations::{Dynamic, DynamicsInfo};
use crate::domain::errors::ConvertError;
use crate::pipeline::arena::ScopedArena;
use crate::pipeline::enhanced::EnhancedTimedNote;
use crate::pipeline::PhaseOutcome;
use once_cell::sync::Lazy;

type VelocityTable = [Option<Dynamic>; 128];

/// Upper velocity bound per marking, softest first
type PresetThresholds = [(u8, Dynamic); 8];

const CLASSICAL_THRESHOLDS: PresetThresholds = [
    (15, Dynamic::Ppp),
    (31, Dynamic::Pp),
    (47, Dynamic::P),
    (63, Dynamic::Mp),
    (79, Dynamic::Mf),
    (95, Dynamic::F),
    (111, Dynamic::Ff),
    (127, Dynamic::Fff),
];

const ROMANTIC_THRESHOLDS: PresetThresholds = [
    (20, Dynamic::Ppp),
    (36, Dynamic::Pp),
    (51, Dynamic::P),
    (63, Dynamic::Mp),
    (75, Dynamic::Mf),
    (91, Dynamic::F),
    (107, Dynamic::Ff),
    (127, Dynamic::Fff),
];

const MODERN_THRESHOLDS: PresetThresholds = [
    (10, Dynamic::Ppp),
    (25, Dynamic::Pp),
    (45, Dynamic::P),
    (62, Dynamic::Mp),
    (80, Dynamic::Mf),
    (100, Dynamic::F),
    (115, Dynamic::Ff),
    (127, Dynamic::Fff),
];

fn build_table(thresholds: &PresetThresholds) -> VelocityTable {
    let mut table = [None; 128];
    for velocity in 1u8..=127 {
        let marking = thresholds
            .iter()
            .find(|(upper, _)| velocity <= *upper)
            .map(|(_, dynamic)| *dynamic);
        table[velocity as usize] = marking;
    }
    table
}

static CLASSICAL_TABLE: Lazy<VelocityTable> = Lazy::new(|| build_table(&CLASSICAL_THRESHOLDS));
static ROMANTIC_TABLE: Lazy<VelocityTable> = Lazy::new(|| build_table(&ROMANTIC_THRESHOLDS));
static MODERN_TABLE: Lazy<VelocityTable> = Lazy::new(|| build_table(&MODERN_THRESHOLDS));

/// Preset-bound velocity lookup
#[derive(Debug, Clone, Copy)]
pub struct DynamicsMapper {
    table: &'static VelocityTable,
}

impl DynamicsMapper {
    pub fn new(preset: DynamicsPreset) -> Self {
        let table: &'static VelocityTable = match preset {
            DynamicsPreset::Classical => &CLASSICAL_TABLE,
            DynamicsPreset::Romantic => &ROMANTIC_TABLE,
            DynamicsPreset::Modern => &MODERN_TABLE,
        };
        Self { table }
    }

    /// Marking for a velocity; `None` for 0 (rests)
    pub fn lookup(&self, velocity: u8) -> Option<Dynamic> {
        self.table.get(velocity as usize).copied().flatten()
    }
}

/// Attach `DynamicsInfo` to every sounding note with a mappable velocity.
///
/// Rests and zero velocities are left untouched: their `dynamics_processed`
/// flag stays clear and they carry no annotation.
pub fn annotate_dynamics(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    mapper: &DynamicsMapper,
    performance: &PerformanceConfig,
) -> Result<PhaseOutcome, ConvertError> {
    let mut outcome = PhaseOutcome::default();
    let mut previous: Option<Dynamic> = None;

    for note in notes.iter_mut() {
        if note.note.is_rest() {
            continue;
        }
        let Some(dynamic) = mapper.lookup(note.note.velocity) else {
            continue;
        };

        let info = DynamicsInfo {
            time_position: note.note.start_tick,
            dynamic,
            previous_dynamic: previous,
            triggers_new_dynamic: previous != Some(dynamic),
        };
        match arena.alloc(info) {
            Ok(handle) => {
                note.dynamics = Some(handle);
                note.flags.mark_dynamics_processed();
                outcome.annotated += 1;
            }
            Err(err) if performance.enable_performance_fallback => {
                log::warn!("dynamics phase degraded: {}", err);
                outcome.degraded = true;
                break;
            }
            Err(err) => return Err(err),
        }
        previous = Some(dynamic);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timed_note::TimedNote;

    #[test]
    fn test_classical_table_boundaries() {
        let mapper = DynamicsMapper::new(DynamicsPreset::Classical);
        assert_eq!(mapper.lookup(0), None);
        assert_eq!(mapper.lookup(1), Some(Dynamic::Ppp));
        assert_eq!(mapper.lookup(15), Some(Dynamic::Ppp));
        assert_eq!(mapper.lookup(16), Some(Dynamic::Pp));
        assert_eq!(mapper.lookup(64), Some(Dynamic::Mf));
        assert_eq!(mapper.lookup(80), Some(Dynamic::F));
        assert_eq!(mapper.lookup(127), Some(Dynamic::Fff));
    }

    #[test]
    fn test_presets_disagree_at_extremes() {
        let classical = DynamicsMapper::new(DynamicsPreset::Classical);
        let romantic = DynamicsMapper::new(DynamicsPreset::Romantic);
        // Velocity 18: classical calls it pp, romantic still ppp
        assert_eq!(classical.lookup(18), Some(Dynamic::Pp));
        assert_eq!(romantic.lookup(18), Some(Dynamic::Ppp));
    }

    #[test]
    fn test_triggers_only_on_change() {
        let mut notes: Vec<EnhancedTimedNote> = [(0u32, 80u8), (480, 80), (960, 110)]
            .iter()
            .map(|&(start, vel)| {
                EnhancedTimedNote::new(TimedNote::note(60, vel, start, 480).unwrap())
            })
            .collect();

        let mut arena = ScopedArena::new();
        let mapper = DynamicsMapper::new(DynamicsPreset::Classical);
        let outcome = annotate_dynamics(
            &mut notes,
            &mut arena,
            &mapper,
            &PerformanceConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.annotated, 3);
        let first = arena.get(notes[0].dynamics.unwrap()).unwrap();
        assert!(first.triggers_new_dynamic);
        assert_eq!(first.previous_dynamic, None);

        let second = arena.get(notes[1].dynamics.unwrap()).unwrap();
        assert!(!second.triggers_new_dynamic, "same marking repeats silently");

        let third = arena.get(notes[2].dynamics.unwrap()).unwrap();
        assert!(third.triggers_new_dynamic);
        assert_eq!(third.previous_dynamic, Some(Dynamic::F));
        assert_eq!(third.dynamic, Dynamic::Ff);
    }

    #[test]
    fn test_rests_left_unprocessed() {
        let mut notes = vec![EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap())];
        let mut arena = ScopedArena::new();
        let mapper = DynamicsMapper::new(DynamicsPreset::Classical);
        annotate_dynamics(
            &mut notes,
            &mut arena,
            &mapper,
            &PerformanceConfig::default(),
        )
        .unwrap();

        assert!(notes[0].dynamics.is_none());
        assert!(
            !notes[0].flags.dynamics_processed(),
            "rests are invisible to the dynamics phase"
        );
    }
}
