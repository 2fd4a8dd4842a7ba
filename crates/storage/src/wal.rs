// SPDX-License-Identifier: MIT

//! JSONL event write-ahead log with group commit.
//!
//! Events are durably stored before being reflected in `MaterializedState`,
//! so a crash between "event happened" and "state updated" replays cleanly
//! on the next startup. Each line is `{"seq":N,"event":{...}}\n`.

use scaorch_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit.
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);
/// Maximum buffered entries before a flush is forced regardless of interval.
const FLUSH_THRESHOLD: usize = 100;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct WalRecordRef<'a> {
    seq: u64,
    event: &'a Event,
}

#[derive(Deserialize)]
struct WalRecord {
    seq: u64,
    event: Event,
}

/// A single WAL entry with its assigned sequence number.
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only JSONL log with buffered group commit.
///
/// Writes are batched in memory and flushed together (interval or buffer
/// threshold, whichever comes first); `flush()` is the durability point —
/// only after it returns are buffered events guaranteed to be on disk. A
/// corrupt trailing line (partially written during a crash) is detected on
/// open and the WAL is truncated back to its last complete entry.
pub struct Wal {
    file: File,
    read_file: File,
    path: PathBuf,
    write_seq: u64,
    processed_seq: u64,
    write_buffer: Vec<Vec<u8>>,
    last_flush: Instant,
    read_offset: u64,
}

impl Wal {
    /// Open or create a WAL at `path`. `processed_seq` should come from the
    /// last checkpoint (or `0` if none exists).
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let (write_seq, read_offset) = Self::recover(path, &file, processed_seq)?;
        let read_file = file.try_clone()?;

        Ok(Self {
            file,
            read_file,
            path: path.to_owned(),
            write_seq,
            processed_seq,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
            read_offset,
        })
    }

    /// Scan for the max sequence number and the offset of the first
    /// unprocessed entry; truncate a corrupt trailing line if found.
    fn recover(path: &Path, file: &File, processed_seq: u64) -> Result<(u64, u64), WalError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut max_seq = 0u64;
        let mut read_offset = 0u64;
        let mut current_offset = 0u64;
        let mut corrupt_at: Option<u64> = None;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => {
                    corrupt_at = Some(current_offset);
                    break;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                current_offset += bytes_read as u64;
                continue;
            }
            if !line.ends_with('\n') {
                // Trailing partial write from a crash mid-append.
                corrupt_at = Some(current_offset);
                break;
            }

            let record: WalRecord = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(_) => {
                    corrupt_at = Some(current_offset);
                    break;
                }
            };

            max_seq = max_seq.max(record.seq);
            if record.seq > processed_seq && read_offset == 0 {
                read_offset = current_offset;
            }
            current_offset += bytes_read as u64;
        }

        if let Some(offset) = corrupt_at {
            warn!(
                path = %path.display(),
                offset,
                "truncating WAL at first corrupt or incomplete entry",
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
        }

        if read_offset == 0 {
            read_offset = current_offset;
        }
        Ok((max_seq, read_offset))
    }

    /// Buffer an event and return its assigned sequence number. Not durable
    /// until `flush()` succeeds.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let mut bytes = serde_json::to_vec(&WalRecordRef { seq, event })?;
        bytes.push(b'\n');
        self.write_buffer.push(bytes);
        Ok(seq)
    }

    /// Whether buffered writes are due for a flush (interval elapsed or
    /// buffer full).
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Flush buffered entries with a single `fsync`. The durability point.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        for bytes in self.write_buffer.drain(..) {
            self.file.write_all(&bytes)?;
        }
        self.file.sync_all()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Read and return the next unprocessed entry, if any. Flushes pending
    /// writes first so they're visible to the read handle.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        self.flush()?;

        let mut reader = BufReader::new(&self.read_file);
        reader.seek(SeekFrom::Start(self.read_offset))?;

        let mut line = String::new();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(_) => return Ok(None),
        };
        if !line.ends_with('\n') {
            return Ok(None);
        }

        let trimmed = line.trim();
        let record: WalRecord = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(offset = self.read_offset, error = %e, "skipping corrupt WAL entry");
                self.read_offset += bytes_read as u64;
                return Ok(None);
            }
        };

        self.read_offset += bytes_read as u64;
        Ok(Some(WalEntry {
            seq: record.seq,
            event: record.event,
        }))
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = seq;
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Replay every entry with `seq > seq`, in order (startup recovery).
    pub fn entries_after(&self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: WalRecord = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(_) => break,
            };
            if record.seq > seq {
                entries.push(WalEntry {
                    seq: record.seq,
                    event: record.event,
                });
            }
        }
        Ok(entries)
    }

    /// Path of the underlying file, for diagnostics.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
