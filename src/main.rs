// Monoscribe command line

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use monoscribe::pipeline::TraceWriter;
use monoscribe::{convert_file_traced, TranscriberConfig};

#[derive(Parser)]
#[command(name = "monoscribe")]
#[command(about = "Transcribe a monophonic WAV recording to a MIDI file")]
#[command(version)]
struct Cli {
    /// Input WAV file
    input: PathBuf,

    /// Output MIDI file
    output: PathBuf,

    /// Optional JSON configuration
    config: Option<PathBuf>,

    /// Write a JSONL pipeline trace to this path
    #[arg(long)]
    trace: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match TranscriberConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => TranscriberConfig::default(),
    };

    let writer = cli.trace.map(TraceWriter::new);
    match convert_file_traced(&cli.input, &cli.output, &config, writer.as_ref()) {
        Ok(conversion) => {
            log::info!(
                "Wrote {} notes at {:.2} BPM to {}",
                conversion.track.notes.len(),
                conversion.bpm,
                cli.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Conversion failed at {}: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_positional_and_trace() {
        let cli = Cli::try_parse_from([
            "monoscribe",
            "in.wav",
            "out.mid",
            "config.json",
            "--trace",
            "trace.jsonl",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("in.wav"));
        assert_eq!(cli.output, PathBuf::from("out.mid"));
        assert_eq!(cli.config, Some(PathBuf::from("config.json")));
        assert_eq!(cli.trace, Some(PathBuf::from("trace.jsonl")));
    }

    #[test]
    fn test_cli_requires_output() {
        assert!(Cli::try_parse_from(["monoscribe", "in.wav"]).is_err());
        assert!(Cli::try_parse_from(["monoscribe", "in.wav", "out.mid", "--trace"]).is_err());
    }
}
