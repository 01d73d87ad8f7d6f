//! Append-only durable logs: consumed voter tokens and committed votes.
//!
//! Both logs are append-only by design. A crash mid-append can at worst
//! drop the line being written; it can never corrupt prior history, and a
//! torn final line is ignored on read.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::Local;
use log::info;

use crate::error::{Error, Result};
use crate::model::VoteRecord;

/// Append-only record of consumed voter-authorization tokens, one
/// `timestamp,token_id` line per entry.
pub struct TokenLedger {
    path: PathBuf,
}

impl TokenLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether this token has ever been recorded. Malformed lines are
    /// skipped.
    pub fn is_used(&self, token_id: &str) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let file = File::open(&self.path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Some((_, logged_id)) = line.split_once(',') {
                if logged_id.trim() == token_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Append a consumption record. Recording the same token twice leaves
    /// the `is_used` verdict unchanged.
    pub fn record(&self, token_id: &str) -> Result<()> {
        let timestamp = Local::now().to_rfc3339();
        append_line(&self.path, &format!("{timestamp},{token_id}"))?;
        info!("Token {token_id} recorded as used");
        Ok(())
    }
}

/// Append-only vote log, one serialized [`VoteRecord`] per line. A vote is
/// committed only once its line is durably on disk.
pub struct VoteLog {
    path: PathBuf,
}

impl VoteLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, record: &VoteRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        append_line(&self.path, &line)?;
        info!("Vote committed for election {}", record.election_id);
        Ok(())
    }
}

/// Durable append: the line is flushed and fsynced before success is
/// reported. Failures are persistence failures, never silently dropped.
fn append_line(path: &PathBuf, line: &str) -> Result<()> {
    let persistence = |err: std::io::Error| Error::Persistence(err.to_string());
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(persistence)?;
    writeln!(file, "{line}").map_err(persistence)?;
    file.sync_data().map_err(persistence)?;
    Ok(())
}
