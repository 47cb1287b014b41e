//! Append-only JSONL audit log of executions.
//!
//! One line per run at `~/.harvest/audit/runs.jsonl`, rotated by size with a
//! bounded chain of old files. Logging is a side effect: callers treat a
//! write failure as a warning, never as a run failure.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const LOG_FILE: &str = "runs.jsonl";
const MAX_LOG_BYTES: u64 = 100 * 1024 * 1024;
const ROTATED_KEEP: u32 = 5;

/// One audited execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// RFC 3339 completion time.
    pub timestamp: String,
    pub run_id: String,
    pub agent: String,
    /// `complete`, `partial`, or `failed`.
    pub status: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RunRecord {
    pub fn now(run_id: &str, agent: &str, status: &str, duration_ms: u64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            agent: agent.to_string(),
            status: status.to_string(),
            duration_ms,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// JSONL writer with size-based rotation.
pub struct AuditLogger {
    path: PathBuf,
    max_bytes: u64,
}

impl AuditLogger {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating audit directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join(LOG_FILE),
            max_bytes: MAX_LOG_BYTES,
        })
    }

    /// Logger at the default location, `~/.harvest/audit`.
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir().context("cannot determine home directory")?;
        Self::new(&home.join(".harvest").join("audit"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Append one record as a JSON line.
    pub fn log(&self, record: &RunRecord) -> Result<()> {
        self.rotate_if_needed()?;
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Shift `runs.jsonl` → `.1` → … → `.{ROTATED_KEEP}` once the live file
    /// exceeds the size threshold; the oldest file falls off the end.
    fn rotate_if_needed(&self) -> Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.max_bytes {
            return Ok(());
        }

        let rotated = |n: u32| PathBuf::from(format!("{}.{n}", self.path.display()));
        let _ = fs::remove_file(rotated(ROTATED_KEEP));
        for n in (1..ROTATED_KEEP).rev() {
            let _ = fs::rename(rotated(n), rotated(n + 1));
        }
        fs::rename(&self.path, rotated(1))
            .with_context(|| format!("rotating {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_append_as_parseable_lines() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap();

        logger
            .log(&RunRecord::now("r-1", "futuretools", "complete", 1800))
            .unwrap();
        logger
            .log(
                &RunRecord::now("r-2", "betalist", "partial", 50)
                    .with_detail("deadline of 0.1s exceeded"),
            )
            .unwrap();

        let text = fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: RunRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.agent, "betalist");
        assert_eq!(second.status, "partial");
        assert!(second.detail.unwrap().contains("deadline"));
    }

    #[test]
    fn oversized_log_rotates_into_numbered_chain() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(dir.path()).unwrap().with_max_bytes(64);

        for i in 0..4 {
            logger
                .log(&RunRecord::now(&format!("r-{i}"), "appsumo_hot", "complete", 900))
                .unwrap();
        }

        assert!(dir.path().join("runs.jsonl.1").exists());
        // The live file only ever holds writes since the last rotation.
        let live = fs::read_to_string(logger.path()).unwrap();
        assert!(live.lines().count() < 4);
    }
}
