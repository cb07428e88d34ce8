//! Transcript sinks: one ordered record per executed turn.
//!
//! Sinks are side-effect only. A failing sink must never abort a run: the
//! runner logs the failure and keeps going.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Receives one record per command exchanged with the interpreter.
pub trait TranscriptSink {
    fn record(&mut self, turn: u32, command: &str, response: &str) -> Result<()>;
}

impl<T: TranscriptSink + ?Sized> TranscriptSink for Box<T> {
    fn record(&mut self, turn: u32, command: &str, response: &str) -> Result<()> {
        (**self).record(turn, command, response)
    }
}

/// Sink that discards everything.
pub struct NullTranscript;

impl TranscriptSink for NullTranscript {
    fn record(&mut self, _turn: u32, _command: &str, _response: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct TurnRecord<'a> {
    turn: u32,
    command: &'a str,
    response: &'a str,
}

/// JSON Lines transcript, flushed per record so a crashed run still leaves
/// every completed turn on disk.
pub struct JsonlTranscript {
    writer: BufWriter<File>,
}

impl JsonlTranscript {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create transcript dir {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("create transcript {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TranscriptSink for JsonlTranscript {
    fn record(&mut self, turn: u32, command: &str, response: &str) -> Result<()> {
        let line = serde_json::to_string(&TurnRecord {
            turn,
            command,
            response,
        })
        .context("serialize turn record")?;
        writeln!(self.writer, "{line}").context("write turn record")?;
        self.writer.flush().context("flush transcript")
    }
}
