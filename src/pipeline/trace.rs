// Conversion tracing
// Per-stage record of one conversion, optionally appended to a JSONL file

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of a conversion, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Config,
    Ingest,
    PitchTracking,
    OnsetDetection,
    Evidence,
    Transition,
    Emission,
    Decode,
    Segment,
    TempoEstimation,
    Quantize,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Ingest => "ingest",
            Stage::PitchTracking => "pitch_tracking",
            Stage::OnsetDetection => "onset_detection",
            Stage::Evidence => "evidence",
            Stage::Transition => "transition",
            Stage::Emission => "emission",
            Stage::Decode => "decode",
            Stage::Segment => "segment",
            Stage::TempoEstimation => "tempo_estimation",
            Stage::Quantize => "quantize",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339 timestamp of when the stage finished
    pub timestamp: String,

    pub stage: Stage,

    /// Human-readable summary of the stage output
    pub message: String,

    /// Optional structured data (frame counts, tempo, note counts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            stage,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(stage: Stage, message: impl Into<String>, data: serde_json::Value) -> Self {
        TraceEntry {
            data: Some(data),
            ..Self::new(stage, message)
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Append-only JSONL trace file
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry, creating the file if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        self.write_batch(std::slice::from_ref(entry))
    }

    pub fn write_batch(&self, entries: &[TraceEntry]) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        for entry in entries {
            file.write_all(entry.to_json_line()?.as_bytes())?;
        }

        file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

/// Collects the entries of one conversion and forwards them to a writer
pub struct TraceRecorder<'a> {
    entries: Vec<TraceEntry>,
    sink: Option<&'a TraceWriter>,
}

impl<'a> TraceRecorder<'a> {
    pub fn new(sink: Option<&'a TraceWriter>) -> Self {
        TraceRecorder {
            entries: Vec::new(),
            sink,
        }
    }

    pub fn record(&mut self, entry: TraceEntry) -> Result<(), TraceError> {
        log::debug!("[{}] {}", entry.stage, entry.message);
        if let Some(writer) = self.sink {
            writer.write(&entry)?;
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}
