//! End-to-end pipeline scenarios at 480 divisions.

use midi2mxl::config::ConverterConfig;
use midi2mxl::domain::annotations::{BeamState, TupletKind};
use midi2mxl::domain::timed_note::TimedNote;
use midi2mxl::domain::track::{MultiTrackContainer, PartMetadata, Track};
use midi2mxl::domain::value_objects::TimeSignature;
use midi2mxl::pipeline::AnnotationPipeline;
use midi2mxl::{ConvertError, Converter};

fn container_with_notes(notes: Vec<TimedNote>) -> MultiTrackContainer {
    let mut container = MultiTrackContainer::new(480);
    let mut track = Track::new(PartMetadata::new("Piano"));
    track.notes = notes;
    container.add_track(track);
    container
}

#[test]
fn test_three_note_triplet_detection() {
    let notes = vec![
        TimedNote::note(60, 80, 0, 160).unwrap(),
        TimedNote::note(62, 80, 160, 160).unwrap(),
        TimedNote::note(64, 80, 320, 160).unwrap(),
    ];

    // Pipeline-level expectations
    let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
    let enhanced = pipeline
        .process(&notes, 480, TimeSignature::default())
        .unwrap();
    let arena = pipeline.arena();

    let first = arena.get(enhanced[0].tuplet.expect("triplet annotated")).unwrap();
    assert_eq!(first.kind, TupletKind::Triplet);
    assert_eq!(first.start_tick, 0);
    assert_eq!(first.end_tick, 480);
    assert!(first.starts_tuplet);
    for note in &enhanced {
        assert!(note.tuplet.is_some(), "every triplet member is annotated");
    }

    // Emission-level expectations
    let mut converter = Converter::new(ConverterConfig::default());
    let result = converter.convert(&container_with_notes(notes)).unwrap();
    assert!(result.musicxml.contains(
        "<time-modification><actual-notes>3</actual-notes><normal-notes>2</normal-notes></time-modification>"
    ));
    assert!(result.musicxml.contains("<tuplet type=\"start\""));
    assert!(result.musicxml.contains("<tuplet type=\"stop\""));
}

#[test]
fn test_beam_across_four_sixteenths() {
    let notes = vec![
        TimedNote::note(60, 80, 0, 120).unwrap(),
        TimedNote::note(62, 80, 120, 120).unwrap(),
        TimedNote::note(64, 80, 240, 120).unwrap(),
        TimedNote::note(65, 80, 360, 120).unwrap(),
    ];

    let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
    let enhanced = pipeline
        .process(&notes, 480, TimeSignature::default())
        .unwrap();
    let arena = pipeline.arena();

    let infos: Vec<_> = enhanced
        .iter()
        .map(|n| *arena.get(n.beaming.expect("beamed")).unwrap())
        .collect();
    assert_eq!(infos[0].state, BeamState::Begin);
    assert_eq!(infos[1].state, BeamState::Continue);
    assert_eq!(infos[2].state, BeamState::Continue);
    assert_eq!(infos[3].state, BeamState::End);
    assert!(infos.iter().all(|i| i.level == 2), "sixteenths are level 2");
    let group = infos[0].group_id;
    assert!(infos.iter().all(|i| i.group_id == group), "one group id");
}

#[test]
fn test_rest_consolidation_to_single_rest() {
    let notes = vec![
        TimedNote::note(60, 80, 0, 480).unwrap(),
        TimedNote::rest(480, 240).unwrap(),
        TimedNote::rest(720, 240).unwrap(),
    ];

    let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
    let enhanced = pipeline
        .process(&notes, 480, TimeSignature::default())
        .unwrap();
    let arena = pipeline.arena();

    let info = arena.get(enhanced[1].rest.expect("run head annotated")).unwrap();
    assert_eq!(info.duration, 480);
    assert!(info.is_optimized_rest);
    assert!(enhanced[2].rest.is_none(), "second rest swallowed");
    assert!(enhanced[2].flags.rest_processed());

    let mut converter = Converter::new(ConverterConfig::default());
    let result = converter.convert(&container_with_notes(notes)).unwrap();
    assert!(
        result
            .musicxml
            .contains("<note><rest/><duration>480</duration><voice>1</voice><type>quarter</type></note>"),
        "consolidated run emits one beat-long rest: {}",
        result.musicxml
    );
    assert_eq!(
        result.musicxml.matches("<rest/>").count(),
        2,
        "the consolidated rest plus the closing pad, never the swallowed rest"
    );
}

#[test]
fn test_multi_voice_measure_backup() {
    let mut notes = Vec::new();
    for i in 0..4u32 {
        notes.push(TimedNote::new(72, 0, 80, i * 480, 480, 1, 0).unwrap());
    }
    notes.push(TimedNote::new(60, 0, 80, 0, 960, 2, 0).unwrap());
    notes.push(TimedNote::new(60, 0, 80, 960, 960, 2, 0).unwrap());

    let mut converter = Converter::new(ConverterConfig::default());
    let result = converter.convert(&container_with_notes(notes)).unwrap();
    let xml = &result.musicxml;

    assert!(
        xml.contains("<backup><duration>1920</duration></backup>"),
        "voice 1 fills the measure before the backup: {}",
        xml
    );

    // Voice 1 content precedes the backup; voice 2 follows it
    let backup_pos = xml.find("<backup>").unwrap();
    let first_voice2 = xml.find("<voice>2</voice>").unwrap();
    let last_voice1 = xml.rfind("<voice>1</voice>").unwrap();
    assert!(last_voice1 < backup_pos, "all voice-1 notes come first");
    assert!(backup_pos < first_voice2, "voice 2 comes after the backup");
}

#[test]
fn test_dynamics_on_rest_cleared_by_coordinator() {
    use midi2mxl::config::{CoordinationConfig, QualityConfig};
    use midi2mxl::domain::annotations::{Dynamic, DynamicsInfo};
    use midi2mxl::pipeline::coordinator;
    use midi2mxl::pipeline::{EnhancedTimedNote, Phase, ScopedArena};

    // A rest that some earlier stage wrongly annotated with a dynamic
    let mut arena = ScopedArena::new();
    arena.begin_phase(Phase::Dynamics);
    let handle = arena
        .alloc(DynamicsInfo {
            time_position: 0,
            dynamic: Dynamic::P,
            previous_dynamic: None,
            triggers_new_dynamic: true,
        })
        .unwrap();
    arena.end_phase();

    let mut rest = EnhancedTimedNote::new(TimedNote::rest(0, 480).unwrap());
    rest.dynamics = Some(handle);
    let mut notes = vec![rest];

    let outcome = coordinator::coordinate(
        &mut notes,
        &mut arena,
        480,
        1920,
        &QualityConfig::default(),
        &CoordinationConfig::default(),
    )
    .unwrap();

    assert!(notes[0].dynamics.is_none());
    assert_eq!(outcome.conflicts_resolved, 1);
}

#[test]
fn test_beam_tuplet_coherence_after_coordination() {
    // A triplet and straight sixteenths sharing a beat region: after the
    // pipeline, no beam group may span two tuplet identities
    let notes = vec![
        TimedNote::note(60, 80, 0, 160).unwrap(),
        TimedNote::note(62, 80, 160, 160).unwrap(),
        TimedNote::note(64, 80, 320, 160).unwrap(),
        TimedNote::note(65, 80, 480, 120).unwrap(),
        TimedNote::note(67, 80, 600, 120).unwrap(),
    ];

    let mut pipeline = AnnotationPipeline::new(ConverterConfig::default());
    let enhanced = pipeline
        .process(&notes, 480, TimeSignature::default())
        .unwrap();
    let arena = pipeline.arena();

    // Collect (group_id, tuplet identity) pairs
    let mut group_identity: Vec<(u32, Option<u32>)> = Vec::new();
    for note in &enhanced {
        if let Some(beam) = note.beaming.and_then(|h| arena.get(h)) {
            let identity = note.tuplet.and_then(|h| arena.get(h)).map(|t| t.start_tick);
            group_identity.push((beam.group_id, identity));
        }
    }
    for window in group_identity.windows(2) {
        if window[0].0 == window[1].0 {
            assert_eq!(
                window[0].1, window[1].1,
                "a beam group must hold a single tuplet identity"
            );
        }
    }
}

#[test]
fn test_circuit_breaker_rejects_pathological_input() {
    let mut notes = Vec::with_capacity(200_000);
    for i in 0..200_000u32 {
        notes.push(TimedNote::note(60, 80, i * 10, 10).unwrap());
    }

    let mut converter = Converter::new(ConverterConfig::default());
    let result = converter.convert(&container_with_notes(notes));
    match result {
        Err(ConvertError::SystemStabilityRisk { notes, threshold }) => {
            assert_eq!(notes, 200_000);
            assert_eq!(threshold, 100_000);
        }
        other => panic!("expected SystemStabilityRisk, got {:?}", other.map(|r| r.musicxml.len())),
    }
}

#[test]
fn test_voice_groups_emitted_in_ascending_order() {
    let notes = vec![
        TimedNote::new(60, 0, 80, 0, 1920, 3, 0).unwrap(),
        TimedNote::new(72, 0, 80, 0, 1920, 1, 0).unwrap(),
    ];

    let mut converter = Converter::new(ConverterConfig::default());
    let result = converter.convert(&container_with_notes(notes)).unwrap();
    let xml = &result.musicxml;

    let voice1 = xml.find("<voice>1</voice>").unwrap();
    let voice3 = xml.find("<voice>3</voice>").unwrap();
    assert!(voice1 < voice3, "voices emit in ascending numeric order");
}

#[test]
fn test_idempotent_across_cycles() {
    let notes = vec![
        TimedNote::note(60, 80, 0, 160).unwrap(),
        TimedNote::note(62, 80, 160, 160).unwrap(),
        TimedNote::note(64, 80, 320, 160).unwrap(),
        TimedNote::rest(480, 480).unwrap(),
        TimedNote::note(67, 90, 960, 960).unwrap(),
    ];
    let container = container_with_notes(notes);

    let mut converter = Converter::new(ConverterConfig::default());
    let first = converter.convert(&container).unwrap();
    let second = converter.convert(&container).unwrap();
    assert_eq!(
        first.musicxml, second.musicxml,
        "same input and config must emit byte-identical MusicXML"
    );
}

#[test]
fn test_all_features_disabled_still_partitions() {
    let mut config = ConverterConfig::default();
    config.features.tuplet = false;
    config.features.beam = false;
    config.features.rest = false;
    config.features.dynamics = false;
    config.features.coordination = false;

    let notes = vec![
        TimedNote::note(60, 80, 0, 160).unwrap(),
        TimedNote::note(62, 80, 160, 160).unwrap(),
        TimedNote::note(64, 80, 320, 160).unwrap(),
        TimedNote::rest(480, 240).unwrap(),
        TimedNote::rest(720, 240).unwrap(),
    ];

    let mut converter = Converter::new(config);
    let result = converter.convert(&container_with_notes(notes)).unwrap();
    let xml = &result.musicxml;

    assert!(!xml.contains("<beam"), "no beams without the beam phase");
    assert!(
        !xml.contains("time-modification"),
        "no tuplets without the tuplet phase"
    );
    assert!(!xml.contains("<dynamics>"), "no dynamics without the phase");
    // The raw rests emit separately instead of consolidating
    assert_eq!(xml.matches("<rest/>").count(), 2 + 1, "two raw rests plus pad");
    assert!(xml.contains("<measure number=\"1\">"));
}
