//! Criterion benchmarks for the annotation pipeline.
//!
//! Tests per-note processing cost for various batch sizes.
//! Success criterion: <100 ns/note average across the full phase sequence.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use midi2mxl::config::ConverterConfig;
use midi2mxl::domain::timed_note::TimedNote;
use midi2mxl::domain::value_objects::TimeSignature;
use midi2mxl::pipeline::AnnotationPipeline;

/// Build a mixed batch: beamed eighth runs, triplets, rests, and chords
fn build_batch(notes: usize) -> Vec<TimedNote> {
    let mut batch = Vec::with_capacity(notes);
    let mut tick = 0u32;
    let mut i = 0usize;
    while batch.len() < notes {
        match i % 7 {
            0 | 1 => {
                batch.push(TimedNote::note(60 + (i % 12) as u8, 80, tick, 240).unwrap());
                tick += 240;
            }
            2 => {
                batch.push(TimedNote::rest(tick, 240).unwrap());
                tick += 240;
            }
            3 | 4 | 5 => {
                batch.push(TimedNote::note(64 + (i % 7) as u8, 96, tick, 160).unwrap());
                tick += 160;
            }
            _ => {
                batch.push(TimedNote::note(48, 64, tick, 480).unwrap());
                tick += 480;
            }
        }
        i += 1;
    }
    batch
}

fn bench_pipeline_1k_notes(c: &mut Criterion) {
    let batch = build_batch(1_000);

    c.bench_function("pipeline_1k_notes", |b| {
        b.iter(|| {
            let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
            let enhanced = pipeline
                .process(black_box(&batch), 480, TimeSignature::default())
                .unwrap();
            black_box(enhanced.len())
        });
    });
}

fn bench_pipeline_10k_notes(c: &mut Criterion) {
    let batch = build_batch(10_000);

    c.bench_function("pipeline_10k_notes", |b| {
        b.iter(|| {
            let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
            let enhanced = pipeline
                .process(black_box(&batch), 480, TimeSignature::default())
                .unwrap();
            black_box(enhanced.len())
        });
    });
}

/// Arena reuse across cycles: the steady-state cost a long-running caller
/// actually pays
fn bench_pipeline_reused_arena(c: &mut Criterion) {
    let batch = build_batch(1_000);
    let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());

    c.bench_function("pipeline_1k_notes_reused_arena", |b| {
        b.iter(|| {
            let enhanced = pipeline
                .process(black_box(&batch), 480, TimeSignature::default())
                .unwrap();
            let count = enhanced.len();
            pipeline.reset_for_next_cycle();
            black_box(count)
        });
    });
}

criterion_group!(
    benches,
    bench_pipeline_1k_notes,
    bench_pipeline_10k_notes,
    bench_pipeline_reused_arena
);
criterion_main!(benches);
