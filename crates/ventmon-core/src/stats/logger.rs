//! Per-session sample log
//!
//! ## File Format
//!
//! One ASCII line per tick, ten space-separated fields with six decimals:
//!
//! `timestamp flow volume tidal in_pressure_a in_pressure_b in_flow ex_pressure_a ex_pressure_b ex_flow`
//!
//! Files are named after the session start, `YYYY-MM-DD-HH-MM-SS.out`.
//! Each record is handed to the OS in a single unbuffered write, so a crash
//! loses at most the record in flight.

use super::store::DerivedSample;
use crate::breath::valve::{EXPIRE, INSPIRE};
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of fields per log record
pub const LOG_FIELDS: usize = 10;

/// Errors from writing or reading session logs
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Failed to create log file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write log record: {0}")]
    Write(std::io::Error),

    #[error("Failed to read log: {0}")]
    Read(std::io::Error),

    #[error("Malformed log record: {0}")]
    Malformed(String),
}

/// One decoded log line
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogRecord {
    pub timestamp: f64,
    pub flow: f64,
    pub volume: f64,
    pub tidal: f64,
    pub in_pressure_a: f64,
    pub in_pressure_b: f64,
    pub in_flow: f64,
    pub ex_pressure_a: f64,
    pub ex_pressure_b: f64,
    pub ex_flow: f64,
}

impl From<&DerivedSample> for LogRecord {
    fn from(s: &DerivedSample) -> Self {
        Self {
            timestamp: s.timestamp,
            flow: s.flow,
            volume: s.volume,
            tidal: s.tidal,
            in_pressure_a: s.in_pressure_a,
            in_pressure_b: s.in_pressure_b,
            in_flow: s.in_flow,
            ex_pressure_a: s.ex_pressure_a,
            ex_pressure_b: s.ex_pressure_b,
            ex_flow: s.ex_flow,
        }
    }
}

impl LogRecord {
    /// Valve state the record was computed under
    ///
    /// Inspiratory ticks log `flow == in_flow` and expiratory ticks log
    /// `flow == -ex_flow`. `None` when both hold, as when no air moved.
    pub fn valve_state(&self) -> Option<u8> {
        let inspiring = self.flow == self.in_flow;
        let expiring = self.flow == -self.ex_flow;
        match (inspiring, expiring) {
            (true, false) => Some(INSPIRE),
            (false, true) => Some(EXPIRE),
            _ => None,
        }
    }
}

/// Format one sample as a newline-terminated log line
pub fn format_record(sample: &DerivedSample) -> String {
    format!(
        "{:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}\n",
        sample.timestamp,
        sample.flow,
        sample.volume,
        sample.tidal,
        sample.in_pressure_a,
        sample.in_pressure_b,
        sample.in_flow,
        sample.ex_pressure_a,
        sample.ex_pressure_b,
        sample.ex_flow
    )
}

/// Decode one log line
pub fn parse_log_line(line: &str) -> Result<LogRecord, LogError> {
    let mut values = [0.0f64; LOG_FIELDS];
    let mut count = 0usize;
    for token in line.split_whitespace() {
        if count == LOG_FIELDS {
            return Err(LogError::Malformed(format!(
                "expected {} fields, found more",
                LOG_FIELDS
            )));
        }
        values[count] = token
            .parse()
            .map_err(|_| LogError::Malformed(format!("invalid number {:?}", token)))?;
        count += 1;
    }
    if count != LOG_FIELDS {
        return Err(LogError::Malformed(format!(
            "expected {} fields, found {}",
            LOG_FIELDS, count
        )));
    }

    let [
        timestamp,
        flow,
        volume,
        tidal,
        in_pressure_a,
        in_pressure_b,
        in_flow,
        ex_pressure_a,
        ex_pressure_b,
        ex_flow,
    ] = values;
    Ok(LogRecord {
        timestamp,
        flow,
        volume,
        tidal,
        in_pressure_a,
        in_pressure_b,
        in_flow,
        ex_pressure_a,
        ex_pressure_b,
        ex_flow,
    })
}

/// Read every record of a session log, skipping blank lines
pub fn read_log(path: &Path) -> Result<Vec<LogRecord>, LogError> {
    let file = File::open(path).map_err(LogError::Read)?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(LogError::Read)?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_log_line(&line).map_err(|e| match e {
            LogError::Malformed(reason) => {
                LogError::Malformed(format!("line {}: {}", n + 1, reason))
            }
            other => other,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Session log file name for a start time
pub fn session_file_name(started: &DateTime<Local>) -> String {
    started.format("%Y-%m-%d-%H-%M-%S.out").to_string()
}

/// Appends one line per derived sample
#[derive(Debug)]
pub struct SampleLogger<W: Write = File> {
    writer: W,
    path: Option<PathBuf>,
    records: u64,
}

impl SampleLogger<File> {
    /// Open the session log in `dir`, named after `started`
    pub fn create(dir: &Path, started: &DateTime<Local>) -> Result<Self, LogError> {
        let path = dir.join(session_file_name(started));
        fs::create_dir_all(dir).map_err(|source| LogError::Create {
            path: path.clone(),
            source,
        })?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| LogError::Create {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), "Session log opened");

        Ok(Self {
            writer: file,
            path: Some(path),
            records: 0,
        })
    }
}

impl<W: Write> SampleLogger<W> {
    /// Log into an arbitrary writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            path: None,
            records: 0,
        }
    }

    /// Write one record and flush it through
    pub fn append(&mut self, sample: &DerivedSample) -> Result<(), LogError> {
        let line = format_record(sample);
        self.writer
            .write_all(line.as_bytes())
            .map_err(LogError::Write)?;
        self.writer.flush().map_err(LogError::Write)?;
        self.records += 1;
        Ok(())
    }

    /// Path of the session file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
