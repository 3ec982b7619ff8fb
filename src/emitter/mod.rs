//! MusicXML 4.0 partwise emission.
//!
//! Produces a deterministic UTF-8 text stream: element and attribute order
//! is fixed in code, so identical inputs emit byte-identical documents. The
//! emitter never aborts on a malformed annotation; incomplete records are
//! skipped and the plain note is still written.

pub mod duration;
pub mod partition;
pub mod pitch;

pub use partition::{EngravedMeasure, group_voices, partition_measures};

use crate::domain::annotations::{BeamState, Dynamic};
use crate::domain::errors::{ConversionWarning, ConvertError, WarningCategory, WarningSeverity};
use crate::domain::track::PartMetadata;
use crate::domain::value_objects::{Bpm, KeySignature, Pitch, TimeSignature};
use crate::pipeline::{EnhancedTimedNote, ScopedArena};
use duration::{DivisionConverter, classify_note_type};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::io::Cursor;

/// One part ready for emission
#[derive(Debug, Clone)]
pub struct Part {
    pub metadata: PartMetadata,
    pub measures: Vec<EngravedMeasure>,
}

/// Score-wide emission inputs
#[derive(Debug, Clone, Copy)]
pub struct ScoreHeader {
    pub key: KeySignature,
    pub time_signature: TimeSignature,
    pub tempo: Option<Bpm>,
}

struct EmitterContext<'a> {
    arena: &'a ScopedArena,
    converter: DivisionConverter,
    divisions: u32,
    key: KeySignature,
    warnings: Vec<ConversionWarning>,
}

impl<'a> EmitterContext<'a> {
    /// Convert ticks to divisions, surfacing precision loss as a warning
    fn convert(&mut self, ticks: u32, measure_number: u32) -> u32 {
        let (value, exact) = self.converter.convert(ticks);
        if !exact {
            self.warnings.push(
                ConversionWarning::new(
                    WarningSeverity::Warning,
                    WarningCategory::PrecisionLoss,
                    format!("{} ticks rounded to {} divisions", ticks, value),
                )
                .with_measure(measure_number),
            );
        }
        value
    }
}

/// Emit a complete partwise score.
///
/// `ppq` is the tick resolution of the incoming notes; `target_divisions`
/// is the divisions-per-quarter written into the document.
pub fn emit_score(
    parts: &[Part],
    arena: &ScopedArena,
    ppq: u32,
    target_divisions: u32,
    header: ScoreHeader,
) -> Result<(String, Vec<ConversionWarning>), ConvertError> {
    let converter = DivisionConverter::new(target_divisions, ppq)?;
    let mut ctx = EmitterContext {
        arena,
        converter,
        divisions: target_divisions,
        key: header.key,
        warnings: Vec::new(),
    };

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.get_mut().get_mut().extend_from_slice(
        b"<!DOCTYPE score-partwise PUBLIC \"-//Recordare//DTD MusicXML 4.0 Partwise//EN\" \"http://www.musicxml.org/dtds/partwise.dtd\">",
    );

    let mut root = BytesStart::new("score-partwise");
    root.push_attribute(("version", "4.0"));
    writer.write_event(Event::Start(root))?;

    write_part_list(&mut writer, parts)?;

    for (index, part) in parts.iter().enumerate() {
        let mut part_elem = BytesStart::new("part");
        let part_id = format!("P{}", index + 1);
        part_elem.push_attribute(("id", part_id.as_str()));
        writer.write_event(Event::Start(part_elem))?;

        let grand_staff = uses_grand_staff(part);
        let mut previous_dynamic: Option<Dynamic> = None;
        for (m_index, measure) in part.measures.iter().enumerate() {
            write_measure(
                &mut writer,
                &mut ctx,
                measure,
                m_index == 0,
                grand_staff,
                header,
                &mut previous_dynamic,
            )?;
        }

        writer.write_event(Event::End(BytesEnd::new("part")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("score-partwise")))?;

    let bytes = writer.into_inner().into_inner();
    let text = String::from_utf8(bytes).map_err(|e| ConvertError::EmitError {
        message: e.to_string(),
    })?;
    Ok((text, ctx.warnings))
}

/// A part gets a piano grand staff when it sounds on both sides of middle C
fn uses_grand_staff(part: &Part) -> bool {
    let mut has_treble = false;
    let mut has_bass = false;
    for measure in &part.measures {
        for note in &measure.notes {
            if note.note.is_rest() {
                continue;
            }
            if note.note.pitch >= Pitch::MIDDLE_C {
                has_treble = true;
            } else {
                has_bass = true;
            }
        }
    }
    has_treble && has_bass
}

fn write_part_list<W: std::io::Write>(
    writer: &mut Writer<W>,
    parts: &[Part],
) -> Result<(), ConvertError> {
    writer.write_event(Event::Start(BytesStart::new("part-list")))?;
    for (index, part) in parts.iter().enumerate() {
        let part_id = format!("P{}", index + 1);
        let mut score_part = BytesStart::new("score-part");
        score_part.push_attribute(("id", part_id.as_str()));
        writer.write_event(Event::Start(score_part))?;
        write_text_element(writer, "part-name", &part.metadata.name)?;

        if part.metadata.midi_channel.is_some() || part.metadata.midi_program.is_some() {
            let instrument_id = format!("{}-I1", part_id);
            let mut score_instrument = BytesStart::new("score-instrument");
            score_instrument.push_attribute(("id", instrument_id.as_str()));
            writer.write_event(Event::Start(score_instrument))?;
            write_text_element(writer, "instrument-name", &part.metadata.name)?;
            writer.write_event(Event::End(BytesEnd::new("score-instrument")))?;

            let mut midi_instrument = BytesStart::new("midi-instrument");
            midi_instrument.push_attribute(("id", instrument_id.as_str()));
            writer.write_event(Event::Start(midi_instrument))?;
            if let Some(channel) = part.metadata.midi_channel {
                // MusicXML channels are 1-based
                write_text_element(writer, "midi-channel", &(channel + 1).to_string())?;
            }
            if let Some(program) = part.metadata.midi_program {
                write_text_element(writer, "midi-program", &(program as u16 + 1).to_string())?;
            }
            writer.write_event(Event::End(BytesEnd::new("midi-instrument")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("score-part")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("part-list")))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn write_measure<W: std::io::Write>(
    writer: &mut Writer<W>,
    ctx: &mut EmitterContext<'_>,
    measure: &EngravedMeasure,
    is_first: bool,
    grand_staff: bool,
    header: ScoreHeader,
    previous_dynamic: &mut Option<Dynamic>,
) -> Result<(), ConvertError> {
    let number = measure.measure.number;
    let mut measure_elem = BytesStart::new("measure");
    measure_elem.push_attribute(("number", number.to_string().as_str()));
    writer.write_event(Event::Start(measure_elem))?;

    if is_first {
        write_attributes(writer, ctx, grand_staff, header)?;
        if let Some(tempo) = header.tempo {
            write_tempo_direction(writer, tempo)?;
        }
    }

    let groups = group_voices(&measure.notes);
    for (g_index, group) in groups.iter().enumerate() {
        let mut emitted_divs: u32 = 0;
        for (n_index, note) in group.notes.iter().enumerate() {
            let chord_member = n_index > 0
                && group.notes[n_index - 1].note.start_tick == note.note.start_tick
                && !note.note.is_rest();
            emitted_divs += write_note(
                writer,
                ctx,
                note,
                group.voice,
                number,
                measure.measure.end_tick,
                grand_staff,
                chord_member,
                previous_dynamic,
            )?;
        }

        // Rewind to the start of the measure before the next voice
        if g_index + 1 < groups.len() && emitted_divs > 0 {
            writer.write_event(Event::Start(BytesStart::new("backup")))?;
            write_text_element(writer, "duration", &emitted_divs.to_string())?;
            writer.write_event(Event::End(BytesEnd::new("backup")))?;
        }
    }

    let mut barline = BytesStart::new("barline");
    barline.push_attribute(("location", "right"));
    writer.write_event(Event::Start(barline))?;
    write_text_element(writer, "bar-style", "regular")?;
    writer.write_event(Event::End(BytesEnd::new("barline")))?;

    writer.write_event(Event::End(BytesEnd::new("measure")))?;
    Ok(())
}

fn write_attributes<W: std::io::Write>(
    writer: &mut Writer<W>,
    ctx: &EmitterContext<'_>,
    grand_staff: bool,
    header: ScoreHeader,
) -> Result<(), ConvertError> {
    writer.write_event(Event::Start(BytesStart::new("attributes")))?;
    write_text_element(writer, "divisions", &ctx.divisions.to_string())?;

    writer.write_event(Event::Start(BytesStart::new("key")))?;
    write_text_element(writer, "fifths", &header.key.fifths().to_string())?;
    write_text_element(writer, "mode", "major")?;
    writer.write_event(Event::End(BytesEnd::new("key")))?;

    writer.write_event(Event::Start(BytesStart::new("time")))?;
    write_text_element(writer, "beats", &header.time_signature.beats.to_string())?;
    write_text_element(
        writer,
        "beat-type",
        &header.time_signature.beat_type.to_string(),
    )?;
    writer.write_event(Event::End(BytesEnd::new("time")))?;

    if grand_staff {
        write_text_element(writer, "staves", "2")?;
        write_clef(writer, Some(1), "G", 2)?;
        write_clef(writer, Some(2), "F", 4)?;
    } else {
        write_clef(writer, None, "G", 2)?;
    }

    writer.write_event(Event::End(BytesEnd::new("attributes")))?;
    Ok(())
}

fn write_clef<W: std::io::Write>(
    writer: &mut Writer<W>,
    number: Option<u8>,
    sign: &str,
    line: u8,
) -> Result<(), ConvertError> {
    let mut clef = BytesStart::new("clef");
    if let Some(n) = number {
        clef.push_attribute(("number", n.to_string().as_str()));
    }
    writer.write_event(Event::Start(clef))?;
    write_text_element(writer, "sign", sign)?;
    write_text_element(writer, "line", &line.to_string())?;
    writer.write_event(Event::End(BytesEnd::new("clef")))?;
    Ok(())
}

fn write_tempo_direction<W: std::io::Write>(
    writer: &mut Writer<W>,
    tempo: Bpm,
) -> Result<(), ConvertError> {
    let mut direction = BytesStart::new("direction");
    direction.push_attribute(("placement", "above"));
    writer.write_event(Event::Start(direction))?;
    writer.write_event(Event::Start(BytesStart::new("direction-type")))?;
    writer.write_event(Event::Start(BytesStart::new("metronome")))?;
    write_text_element(writer, "beat-unit", "quarter")?;
    write_text_element(writer, "per-minute", &tempo.value().to_string())?;
    writer.write_event(Event::End(BytesEnd::new("metronome")))?;
    writer.write_event(Event::End(BytesEnd::new("direction-type")))?;
    let mut sound = BytesStart::new("sound");
    sound.push_attribute(("tempo", tempo.value().to_string().as_str()));
    writer.write_event(Event::Empty(sound))?;
    writer.write_event(Event::End(BytesEnd::new("direction")))?;
    Ok(())
}

fn write_dynamics_direction<W: std::io::Write>(
    writer: &mut Writer<W>,
    dynamic: Dynamic,
) -> Result<(), ConvertError> {
    let mut direction = BytesStart::new("direction");
    direction.push_attribute(("placement", "below"));
    writer.write_event(Event::Start(direction))?;
    writer.write_event(Event::Start(BytesStart::new("direction-type")))?;
    writer.write_event(Event::Start(BytesStart::new("dynamics")))?;
    writer.write_event(Event::Empty(BytesStart::new(dynamic.element_name())))?;
    writer.write_event(Event::End(BytesEnd::new("dynamics")))?;
    writer.write_event(Event::End(BytesEnd::new("direction-type")))?;
    let mut sound = BytesStart::new("sound");
    sound.push_attribute(("dynamics", dynamic.nominal_velocity().to_string().as_str()));
    writer.write_event(Event::Empty(sound))?;
    writer.write_event(Event::End(BytesEnd::new("direction")))?;
    Ok(())
}

/// Write one note (or rest) and return the divisions the cursor advanced
#[allow(clippy::too_many_arguments)]
fn write_note<W: std::io::Write>(
    writer: &mut Writer<W>,
    ctx: &mut EmitterContext<'_>,
    enhanced: &EnhancedTimedNote,
    voice: u8,
    measure_number: u32,
    measure_end: u32,
    grand_staff: bool,
    chord_member: bool,
    previous_dynamic: &mut Option<Dynamic>,
) -> Result<u32, ConvertError> {
    let note = &enhanced.note;

    if note.is_rest() {
        return write_rest(
            writer,
            ctx,
            enhanced,
            voice,
            measure_number,
            measure_end,
            grand_staff,
        );
    }

    // Dynamics direction precedes the note it attaches to; repeats of the
    // same marking collapse into nothing
    if let Some(info) = enhanced.dynamics.and_then(|h| ctx.arena.get(h)) {
        if info.triggers_new_dynamic && *previous_dynamic != Some(info.dynamic) {
            write_dynamics_direction(writer, info.dynamic)?;
            *previous_dynamic = Some(info.dynamic);
        }
    }

    let divs = ctx.convert(note.duration, measure_number);

    writer.write_event(Event::Start(BytesStart::new("note")))?;
    if chord_member {
        writer.write_event(Event::Empty(BytesStart::new("chord")))?;
    }

    let spelled = pitch::spell_pitch(note.pitch, ctx.key);
    writer.write_event(Event::Start(BytesStart::new("pitch")))?;
    write_text_element(writer, "step", &spelled.step.to_string())?;
    if spelled.alter != 0 {
        write_text_element(writer, "alter", &spelled.alter.to_string())?;
    }
    write_text_element(writer, "octave", &spelled.octave.to_string())?;
    writer.write_event(Event::End(BytesEnd::new("pitch")))?;

    write_text_element(writer, "duration", &divs.to_string())?;

    // Playback ties for notes the partitioner split at a barline
    if enhanced.tie_stop {
        let mut tie = BytesStart::new("tie");
        tie.push_attribute(("type", "stop"));
        writer.write_event(Event::Empty(tie))?;
    }
    if enhanced.tie_start {
        let mut tie = BytesStart::new("tie");
        tie.push_attribute(("type", "start"));
        writer.write_event(Event::Empty(tie))?;
    }

    write_text_element(writer, "voice", &voice.to_string())?;

    // Tuplet members classify by their written value: a triplet eighth
    // lasts 2/3 of an eighth but still prints as an eighth
    let nominal_divs = match enhanced.tuplet.and_then(|h| ctx.arena.get(h)) {
        Some(info) => {
            let (actual, normal) = info.kind.ratio();
            divs.saturating_mul(actual as u32) / normal as u32
        }
        None => divs,
    };
    let note_type = classify_note_type(nominal_divs, ctx.divisions);
    write_text_element(writer, "type", note_type.name)?;
    if note_type.dotted {
        writer.write_event(Event::Empty(BytesStart::new("dot")))?;
    }

    if let Some(info) = enhanced.tuplet.and_then(|h| ctx.arena.get(h)) {
        let (actual, normal) = info.kind.ratio();
        writer.write_event(Event::Start(BytesStart::new("time-modification")))?;
        write_text_element(writer, "actual-notes", &actual.to_string())?;
        write_text_element(writer, "normal-notes", &normal.to_string())?;
        writer.write_event(Event::End(BytesEnd::new("time-modification")))?;
    }

    if let Some(info) = enhanced.stem.and_then(|h| ctx.arena.get(h)) {
        let direction = match info.direction {
            crate::domain::annotations::StemDirection::Up => "up",
            crate::domain::annotations::StemDirection::Down => "down",
        };
        write_text_element(writer, "stem", direction)?;
    }

    if grand_staff {
        write_text_element(writer, "staff", &pitch::staff_number(note.pitch).to_string())?;
    }

    if let Some(info) = enhanced.beaming.and_then(|h| ctx.arena.get(h)) {
        if info.state != BeamState::None {
            let text = match info.state {
                BeamState::Begin => "begin",
                BeamState::Continue => "continue",
                BeamState::End => "end",
                BeamState::None => unreachable!(),
            };
            for level in 1..=info.level.max(1) {
                let mut beam = BytesStart::new("beam");
                beam.push_attribute(("number", level.to_string().as_str()));
                writer.write_event(Event::Start(beam))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new("beam")))?;
            }
        }
    }

    let (starts_tuplet, ends_tuplet) = enhanced
        .tuplet
        .and_then(|h| ctx.arena.get(h))
        .map(|info| (info.starts_tuplet, info.ends_tuplet))
        .unwrap_or((false, false));
    if starts_tuplet || ends_tuplet || enhanced.tie_start || enhanced.tie_stop {
        writer.write_event(Event::Start(BytesStart::new("notations")))?;
        if enhanced.tie_stop {
            let mut tied = BytesStart::new("tied");
            tied.push_attribute(("type", "stop"));
            writer.write_event(Event::Empty(tied))?;
        }
        if enhanced.tie_start {
            let mut tied = BytesStart::new("tied");
            tied.push_attribute(("type", "start"));
            writer.write_event(Event::Empty(tied))?;
        }
        if starts_tuplet {
            let mut tuplet = BytesStart::new("tuplet");
            tuplet.push_attribute(("type", "start"));
            tuplet.push_attribute(("bracket", "yes"));
            tuplet.push_attribute(("number", "1"));
            writer.write_event(Event::Empty(tuplet))?;
        }
        if ends_tuplet {
            let mut tuplet = BytesStart::new("tuplet");
            tuplet.push_attribute(("type", "stop"));
            tuplet.push_attribute(("number", "1"));
            writer.write_event(Event::Empty(tuplet))?;
        }
        writer.write_event(Event::End(BytesEnd::new("notations")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("note")))?;

    Ok(if chord_member { 0 } else { divs })
}

/// Write a rest, honoring consolidation: swallowed rests emit nothing, run
/// heads emit their whole span, tiny residues are suppressed
fn write_rest<W: std::io::Write>(
    writer: &mut Writer<W>,
    ctx: &mut EmitterContext<'_>,
    enhanced: &EnhancedTimedNote,
    voice: u8,
    measure_number: u32,
    measure_end: u32,
    grand_staff: bool,
) -> Result<u32, ConvertError> {
    let note = &enhanced.note;
    let duration_ticks = match enhanced.rest.and_then(|h| ctx.arena.get(h)) {
        // A consolidated span never spills past its measure's barline
        Some(info) => info
            .duration
            .min(measure_end.saturating_sub(note.start_tick)),
        None if enhanced.flags.rest_processed() => {
            // Swallowed into a preceding consolidated rest
            return Ok(0);
        }
        None => note.duration,
    };

    let divs = ctx.convert(duration_ticks, measure_number);
    if divs < ctx.divisions / 20 {
        log::debug!(
            "suppressing {}-division residual rest in measure {}",
            divs,
            measure_number
        );
        return Ok(divs);
    }

    writer.write_event(Event::Start(BytesStart::new("note")))?;
    writer.write_event(Event::Empty(BytesStart::new("rest")))?;
    write_text_element(writer, "duration", &divs.to_string())?;
    write_text_element(writer, "voice", &voice.to_string())?;
    let note_type = classify_note_type(divs, ctx.divisions);
    write_text_element(writer, "type", note_type.name)?;
    if note_type.dotted {
        writer.write_event(Event::Empty(BytesStart::new("dot")))?;
    }
    if grand_staff {
        write_text_element(writer, "staff", "1")?;
    }
    writer.write_event(Event::End(BytesEnd::new("note")))?;

    Ok(divs)
}

/// Helper to write a simple text element
fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), ConvertError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
