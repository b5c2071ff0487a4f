use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;

use crate::reading::Reading;

/// Appends accepted readings to a file, one JSON object per line, for offline
/// inspection. Nothing ever reads the file back.
pub struct ReadingLog {
    path: PathBuf,
}

impl ReadingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, reading: &Reading) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(reading)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(&line)
            .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        Ok(())
    }
}

#[test]
fn test_append_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log = ReadingLog::new(dir.path().join("readings.jsonl"));
    let decoder = crate::message::Decoder::default();
    for raw in ["fd7800460041", "fd9600500048"] {
        let raw = hex::decode(raw).unwrap();
        let reading = Reading::decode(&decoder, &raw, chrono::Local::now()).unwrap();
        log.append(&reading).unwrap();
    }

    let contents = std::fs::read_to_string(log.path()).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["systolic"], 120);
    assert_eq!(lines[1]["systolic"], 150);
    assert_eq!(lines[1]["classification"]["level"], "high1");
}

#[test]
fn test_append_to_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let log = ReadingLog::new(dir.path().join("missing").join("readings.jsonl"));
    let raw = hex::decode("fd9600500048").unwrap();
    let reading = Reading::decode(&crate::message::Decoder::default(), &raw, chrono::Local::now()).unwrap();
    assert!(log.append(&reading).is_err());
}
