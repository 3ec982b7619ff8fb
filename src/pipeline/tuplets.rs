//! Window-based tuplet detection.
//!
//! Scans overlapping two-beat windows of the note sequence. A window whose
//! note count matches a known tuplet size is classified by fitting its
//! inter-onset intervals against an even division of the nearest whole-beat
//! span; the fit quality becomes the confidence score. Classification is
//! best-effort: windows that fail any gate simply leave their notes
//! unannotated.

use crate::config::{PerformanceConfig, QualityConfig};
use crate::domain::annotations::{TupletInfo, TupletKind};
use crate::domain::errors::ConvertError;
use crate::pipeline::arena::ScopedArena;
use crate::pipeline::enhanced::EnhancedTimedNote;
use crate::pipeline::PhaseOutcome;

/// Maximum deviation between inter-onset intervals before a window is
/// considered irregularly spaced, in ticks
const SPACING_TOLERANCE: u32 = 20;

/// Maximum fractional timing error for a successful classification
const MAX_TIMING_ERROR: f64 = 0.15;

/// Hard cap on notes collected into a single window
const INNER_ITERATION_CAP: usize = 1_000;

/// A classified tuplet span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedTuplet {
    pub kind: TupletKind,
    pub start_tick: u32,
    pub end_tick: u32,
    pub beat_unit: u32,
    pub note_count: u8,
    pub confidence: f64,
}

/// Detect tuplets and attach `TupletInfo` to every member note.
///
/// Notes must already be sorted by start tick. Window stride is
/// `max(1, window_len / 2)` so straddling tuplets are reconsidered while the
/// scan still always advances.
pub fn annotate_tuplets(
    notes: &mut [EnhancedTimedNote],
    arena: &mut ScopedArena,
    divisions: u32,
    quality: &QualityConfig,
    performance: &PerformanceConfig,
) -> Result<PhaseOutcome, ConvertError> {
    let mut outcome = PhaseOutcome::default();
    let window_span = divisions.saturating_mul(2);

    let mut detected: Vec<DetectedTuplet> = Vec::new();
    let mut i = 0usize;
    let mut outer_iterations = 0u32;

    while i < notes.len() {
        outer_iterations += 1;
        if outer_iterations > performance.max_iterations_per_loop {
            log::warn!(
                "tuplet scan hit iteration cap {} at note {}",
                performance.max_iterations_per_loop,
                i
            );
            outcome.capped = true;
            break;
        }

        let window_start = notes[i].note.start_tick;
        let mut j = i;
        while j < notes.len()
            && j - i < INNER_ITERATION_CAP
            && notes[j].note.start_tick < window_start.saturating_add(window_span)
        {
            j += 1;
        }

        if let Some(tuplet) =
            classify_window(&notes[i..j], divisions, quality.tuplet_min_confidence)
        {
            let duplicate = detected
                .iter()
                .any(|t| t.start_tick == tuplet.start_tick && t.end_tick == tuplet.end_tick);
            if !duplicate {
                detected.push(tuplet);
            }
        }

        let window_len = j - i;
        i += (window_len / 2).max(1);
    }

    // Assignment pass: every note whose onset lies inside a detected span
    // gets a TupletInfo; the first member is flagged as the span opener.
    for tuplet in &detected {
        let members: Vec<usize> = notes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                n.note.start_tick >= tuplet.start_tick && n.note.start_tick < tuplet.end_tick
            })
            .map(|(idx, _)| idx)
            .collect();

        for (position, &idx) in members.iter().enumerate() {
            if notes[idx].tuplet.is_some() {
                continue;
            }
            let info = TupletInfo {
                kind: tuplet.kind,
                start_tick: tuplet.start_tick,
                end_tick: tuplet.end_tick,
                beat_unit: tuplet.beat_unit,
                position: position as u8,
                confidence: tuplet.confidence,
                starts_tuplet: notes[idx].note.start_tick == tuplet.start_tick,
                ends_tuplet: position == members.len() - 1,
            };
            match arena.alloc(info) {
                Ok(handle) => {
                    notes[idx].tuplet = Some(handle);
                    outcome.annotated += 1;
                }
                Err(err) if performance.enable_performance_fallback => {
                    log::warn!("tuplet phase degraded: {}", err);
                    outcome.degraded = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        if outcome.degraded {
            break;
        }
    }

    for note in notes.iter_mut() {
        note.flags.mark_tuplet_processed();
    }

    Ok(outcome)
}

/// Try to classify a tuplet starting at the head of the window.
///
/// Each known tuplet size that fits in the window is tried as a prefix (so a
/// triplet followed by unrelated notes in the same two beats still
/// classifies); the best-fitting candidate wins.
fn classify_window(
    window: &[EnhancedTimedNote],
    divisions: u32,
    min_confidence: f64,
) -> Option<DetectedTuplet> {
    if window.len() < 3 || divisions == 0 {
        return None;
    }

    let mut best: Option<DetectedTuplet> = None;
    for kind in TupletKind::ALL {
        let count = kind.note_count() as usize;
        if count > window.len() {
            continue;
        }
        if let Some(candidate) = classify_prefix(&window[..count], kind, divisions, min_confidence)
        {
            let better = best
                .map(|b| candidate.confidence > b.confidence)
                .unwrap_or(true);
            if better {
                best = Some(candidate);
            }
        }
    }
    best
}

/// Fit one exact-count prefix against an even division of its snapped span.
///
/// Gates, in order: no chordal (zero) onset intervals; span within timing
/// tolerance of a whole number of beats; intervals within tolerance of an
/// even division of that span; confidence above the configured minimum.
fn classify_prefix(
    prefix: &[EnhancedTimedNote],
    kind: TupletKind,
    divisions: u32,
    min_confidence: f64,
) -> Option<DetectedTuplet> {
    let intervals: Vec<u32> = prefix
        .windows(2)
        .map(|pair| pair[1].note.start_tick.saturating_sub(pair[0].note.start_tick))
        .collect();
    if intervals.iter().any(|&iv| iv == 0) {
        // Chordal onsets inside the prefix; not a rhythmic tuplet
        return None;
    }
    let spacing_is_even = intervals
        .iter()
        .all(|&iv| iv.abs_diff(intervals[0]) <= SPACING_TOLERANCE);
    if !spacing_is_even {
        return None;
    }

    let first = &prefix[0].note;
    let last = &prefix[prefix.len() - 1].note;
    let span = last.end_tick().saturating_sub(first.start_tick);
    if span == 0 {
        return None;
    }

    // A tuplet occupies a whole number of beats; snap the observed span and
    // reject prefixes that are just on-grid subdivisions (e.g. six straight
    // sixteenths spanning a beat and a half).
    let beats = ((span as f64 / divisions as f64).round() as u32).max(1);
    let snapped_span = beats * divisions;
    let span_error = (span as f64 - snapped_span as f64).abs() / snapped_span as f64;
    if span_error > MAX_TIMING_ERROR {
        return None;
    }

    let expected_interval = snapped_span as f64 / kind.note_count() as f64;
    let interval_error = intervals
        .iter()
        .map(|&iv| (iv as f64 - expected_interval).abs())
        .sum::<f64>()
        / intervals.len() as f64
        / expected_interval;
    let timing_error = interval_error.max(span_error);
    if timing_error > MAX_TIMING_ERROR {
        return None;
    }

    let confidence = 1.0 - timing_error;
    if confidence < min_confidence {
        return None;
    }

    Some(DetectedTuplet {
        kind,
        start_tick: first.start_tick,
        end_tick: first.start_tick + snapped_span,
        beat_unit: divisions,
        note_count: kind.note_count(),
        confidence,
    })
}
