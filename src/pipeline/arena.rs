//! Phase-scoped annotation arena.
//!
//! Annotations are bump-appended into typed pools and addressed through
//! generational handles. There is no per-allocation free: a batch either
//! flows into emission or the whole arena is reset. `reset_for_next_cycle`
//! advances the generation, so any handle that escaped the batch resolves to
//! `None` afterwards instead of aliasing recycled slots.

use crate::domain::annotations::{BeamingInfo, DynamicsInfo, RestInfo, StemInfo, TupletInfo};
use crate::domain::errors::ConvertError;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Tuplet,
    Beam,
    Rest,
    Dynamics,
    Coordination,
    Stem,
}

impl Phase {
    pub const COUNT: usize = 6;

    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Tuplet,
        Phase::Beam,
        Phase::Rest,
        Phase::Dynamics,
        Phase::Coordination,
        Phase::Stem,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Tuplet => "tuplet",
            Phase::Beam => "beam",
            Phase::Rest => "rest",
            Phase::Dynamics => "dynamics",
            Phase::Coordination => "coordination",
            Phase::Stem => "stem",
        }
    }
}

/// Generational handle into one of the arena's typed pools.
///
/// Copyable and cheap; resolves to `None` once the arena has been reset.
pub struct ArenaRef<T> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> ArenaRef<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }
}

impl<T> Clone for ArenaRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaRef<T> {}

impl<T> PartialEq for ArenaRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for ArenaRef<T> {}

impl<T> std::fmt::Debug for ArenaRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ArenaRef({}@g{})", self.index, self.generation)
    }
}

/// Annotation types the arena can hold
pub trait ArenaSlot: Sized {
    fn pool(arena: &ScopedArena) -> &Vec<Self>;
    fn pool_mut(arena: &mut ScopedArena) -> &mut Vec<Self>;
}

macro_rules! arena_slot {
    ($ty:ty, $field:ident) => {
        impl ArenaSlot for $ty {
            fn pool(arena: &ScopedArena) -> &Vec<Self> {
                &arena.$field
            }
            fn pool_mut(arena: &mut ScopedArena) -> &mut Vec<Self> {
                &mut arena.$field
            }
        }
    };
}

arena_slot!(TupletInfo, tuplets);
arena_slot!(BeamingInfo, beams);
arena_slot!(RestInfo, rests);
arena_slot!(DynamicsInfo, dynamics);
arena_slot!(StemInfo, stems);

/// Snapshot of arena accounting, reported through the pipeline metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    pub used_bytes: usize,
    pub peak_bytes: usize,
    pub byte_budget: usize,
    pub bytes_per_phase: [usize; Phase::COUNT],
    pub total_allocations: u64,
    pub reset_count: u64,
}

/// Typed annotation arena with per-phase accounting
pub struct ScopedArena {
    tuplets: Vec<TupletInfo>,
    beams: Vec<BeamingInfo>,
    rests: Vec<RestInfo>,
    dynamics: Vec<DynamicsInfo>,
    stems: Vec<StemInfo>,
    generation: u32,
    active_phase: Option<Phase>,
    byte_budget: usize,
    used_bytes: usize,
    peak_bytes: usize,
    bytes_per_phase: [usize; Phase::COUNT],
    total_allocations: u64,
    reset_count: u64,
}

impl ScopedArena {
    /// Default budget: enough for every note of a maximum-size batch to carry
    /// all five annotations, with headroom
    pub const DEFAULT_BYTE_BUDGET: usize = 32 * 1024 * 1024;

    pub fn new() -> Self {
        Self::with_budget(Self::DEFAULT_BYTE_BUDGET)
    }

    pub fn with_budget(byte_budget: usize) -> Self {
        Self {
            tuplets: Vec::new(),
            beams: Vec::new(),
            rests: Vec::new(),
            dynamics: Vec::new(),
            stems: Vec::new(),
            generation: 0,
            active_phase: None,
            byte_budget,
            used_bytes: 0,
            peak_bytes: 0,
            bytes_per_phase: [0; Phase::COUNT],
            total_allocations: 0,
            reset_count: 0,
        }
    }

    /// Record the phase that owns subsequent allocations
    pub fn begin_phase(&mut self, phase: Phase) {
        self.active_phase = Some(phase);
    }

    /// Close phase accounting; nothing is freed
    pub fn end_phase(&mut self) {
        self.active_phase = None;
    }

    /// Append an annotation and return its handle.
    ///
    /// Fails with `OutOfMemory` once the byte budget is exhausted; already
    /// allocated annotations stay valid.
    pub fn alloc<T: ArenaSlot>(&mut self, value: T) -> Result<ArenaRef<T>, ConvertError> {
        let size = std::mem::size_of::<T>();
        if self.used_bytes + size > self.byte_budget {
            return Err(ConvertError::OutOfMemory {
                phase: self
                    .active_phase
                    .map(|p| p.name())
                    .unwrap_or("unscoped")
                    .to_string(),
                requested: size,
                available: self.byte_budget - self.used_bytes,
            });
        }

        let pool = T::pool_mut(self);
        let index = pool.len() as u32;
        pool.push(value);

        self.used_bytes += size;
        self.peak_bytes = self.peak_bytes.max(self.used_bytes);
        self.total_allocations += 1;
        if let Some(phase) = self.active_phase {
            self.bytes_per_phase[phase.index()] += size;
        }

        Ok(ArenaRef::new(index, self.generation))
    }

    /// Resolve a handle; `None` if it is stale or out of range
    pub fn get<T: ArenaSlot>(&self, handle: ArenaRef<T>) -> Option<&T> {
        if handle.generation != self.generation {
            return None;
        }
        T::pool(self).get(handle.index as usize)
    }

    /// Mutable resolve; `None` if the handle is stale or out of range
    pub fn get_mut<T: ArenaSlot>(&mut self, handle: ArenaRef<T>) -> Option<&mut T> {
        if handle.generation != self.generation {
            return None;
        }
        let index = handle.index as usize;
        T::pool_mut(self).get_mut(index)
    }

    /// Drop every annotation allocated since construction or the last reset.
    ///
    /// Pool capacity is retained so the next batch allocates without growing;
    /// accounting counters that describe lifetime totals carry forward.
    pub fn reset_for_next_cycle(&mut self) {
        self.tuplets.clear();
        self.beams.clear();
        self.rests.clear();
        self.dynamics.clear();
        self.stems.clear();
        self.generation = self.generation.wrapping_add(1);
        self.active_phase = None;
        self.used_bytes = 0;
        self.bytes_per_phase = [0; Phase::COUNT];
        self.reset_count += 1;
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            used_bytes: self.used_bytes,
            peak_bytes: self.peak_bytes,
            byte_budget: self.byte_budget,
            bytes_per_phase: self.bytes_per_phase,
            total_allocations: self.total_allocations,
            reset_count: self.reset_count,
        }
    }
}

impl Default for ScopedArena {
    fn default() -> Self {
        Self::new()
    }
}
