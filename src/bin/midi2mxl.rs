// Conversion CLI: parsed-MIDI JSON container in, MusicXML text out.

use clap::Parser;
use midi2mxl::config::ConverterConfig;
use midi2mxl::domain::errors::WarningSeverity;
use midi2mxl::{Converter, MultiTrackContainer};
use std::fs;
use std::path::PathBuf;
use std::process;

/// CLI arguments for the converter
#[derive(Parser, Debug)]
#[command(
    name = "midi2mxl",
    about = "Convert a parsed MIDI performance (JSON container) into educational MusicXML",
    version
)]
struct Cli {
    /// Path to the JSON-serialized MultiTrackContainer
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to a JSON converter configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.file.exists() {
        eprintln!("Error: File not found: {}", cli.file.display());
        process::exit(1);
    }

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(message) => {
                eprintln!("Error: {}", message);
                process::exit(1);
            }
        },
        None => ConverterConfig::default(),
    };

    let container = match load_container(&cli.file) {
        Ok(container) => container,
        Err(message) => {
            eprintln!("Error: {}", message);
            process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!(
            "Converting {} notes across {} tracks at {} PPQ",
            container.note_count(),
            container.tracks.len(),
            container.ppq
        );
    }

    let mut converter = Converter::new(config);
    let result = match converter.convert(&container) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: Conversion failed: {}", e);
            process::exit(2);
        }
    };

    if !cli.quiet {
        print_statistics(&result.metrics, cli.verbose);
        print_warnings(&result.warnings);
    }

    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, &result.musicxml) {
                eprintln!("Error: Cannot write {}: {}", path.display(), e);
                process::exit(1);
            }
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
        }
        None => println!("{}", result.musicxml),
    }
}

fn load_config(path: &PathBuf) -> Result<ConverterConfig, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid config: {}", e))
}

fn load_container(path: &PathBuf) -> Result<MultiTrackContainer, String> {
    let text =
        fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid container JSON: {}", e))
}

fn print_statistics(metrics: &midi2mxl::PipelineMetrics, verbose: bool) {
    eprintln!(
        "Processed {} notes in {} cycle(s), {} ns/note average",
        metrics.total_notes, metrics.cycles, metrics.avg_ns_per_note
    );
    if verbose {
        eprintln!(
            "Arena: {} peak bytes, {} allocations, {} conflicts resolved, {} errors",
            metrics.arena.peak_bytes,
            metrics.arena.total_allocations,
            metrics.conflicts_resolved,
            metrics.error_count
        );
    }
}

fn print_warnings(warnings: &[midi2mxl::ConversionWarning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("\nWarnings:");
    for warning in warnings {
        let mut context_parts = Vec::new();
        if let Some(measure) = warning.measure_number {
            context_parts.push(format!("measure {}", measure));
        }
        if let Some(voice) = warning.voice_number {
            context_parts.push(format!("voice {}", voice));
        }

        let severity_marker = match warning.severity {
            WarningSeverity::Info => "i",
            WarningSeverity::Warning => "!",
            WarningSeverity::Error => "x",
        };

        if context_parts.is_empty() {
            eprintln!("  {} {}", severity_marker, warning.message);
        } else {
            eprintln!(
                "  {} [{}] {}",
                severity_marker,
                context_parts.join(", "),
                warning.message
            );
        }
    }
}
