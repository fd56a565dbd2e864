// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only, newline-delimited JSON write-ahead log.
//!
//! Generic over the operation type `Op` so every team's store (and any
//! future log-structured subsystem) can reuse the same durability and
//! corruption-recovery machinery instead of re-deriving it per domain.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Entries are flushed once this many are buffered...
const FLUSH_ENTRY_THRESHOLD: usize = 100;
/// ...or once this much time has passed since the last flush, whichever first.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// How many rotated `.bak` generations to keep on corruption recovery.
const MAX_BAK_GENERATIONS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One logged operation plus the monotonic sequence number it was assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry<Op> {
    pub seq: u64,
    pub op: Op,
}

/// An append-only log of `Op` values, one JSON object per line.
///
/// `Wal::open` replays the file into memory, stopping at (and rotating
/// away) the first corrupt or non-UTF-8 line it finds — a torn write from
/// a crash mid-append must never prevent recovery of everything before it.
pub struct Wal<Op> {
    path: PathBuf,
    file: BufWriter<File>,
    entries: Vec<WalEntry<Op>>,
    write_seq: u64,
    processed_seq: u64,
    read_cursor: usize,
    unflushed: usize,
    last_flush: Instant,
}

impl<Op> Wal<Op>
where
    Op: Serialize + DeserializeOwned + Clone,
{
    /// Open (creating if absent) the WAL at `path`, replaying valid entries.
    ///
    /// `processed_seq` is the watermark recovered from the last snapshot:
    /// `read_cursor` starts past every entry at or below it so
    /// [`Wal::next_unprocessed`] only yields what the snapshot didn't cover.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }

        let (entries, corrupt_at) = Self::replay(&path)?;
        if let Some(valid_len) = corrupt_at {
            Self::rotate_and_truncate(&path, &entries[..valid_len])?;
        }
        let entries = match corrupt_at {
            Some(valid_len) => entries[..valid_len].to_vec(),
            None => entries,
        };

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);
        let read_cursor = entries.iter().take_while(|e| e.seq <= processed_seq).count();

        let file = BufWriter::new(OpenOptions::new().append(true).open(&path)?);
        Ok(Self {
            path,
            file,
            entries,
            write_seq,
            processed_seq,
            read_cursor,
            unflushed: 0,
            last_flush: Instant::now(),
        })
    }

    /// Replay every line in `path`. Returns the entries read and, if a
    /// corrupt or non-UTF-8 line was hit, the count of entries that
    /// preceded it (everything from that point on is discarded).
    fn replay(path: &Path) -> Result<(Vec<WalEntry<Op>>, Option<usize>), WalError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.split(b'\n') {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&line) else {
                return Ok((entries.clone(), Some(entries.len())));
            };
            match serde_json::from_str::<WalEntry<Op>>(text) {
                Ok(entry) => entries.push(entry),
                Err(_) => return Ok((entries.clone(), Some(entries.len()))),
            }
        }
        Ok((entries, None))
    }

    /// Rewrite `path` to contain only `valid`, rotating the prior (corrupt)
    /// contents into `.bak`, keeping at most [`MAX_BAK_GENERATIONS`].
    fn rotate_and_truncate(path: &Path, valid: &[WalEntry<Op>]) -> Result<(), WalError> {
        rotate_bak_generations(path, MAX_BAK_GENERATIONS)?;
        std::fs::rename(path, path.with_extension("bak"))?;
        let mut file = BufWriter::new(File::create(path)?);
        for entry in valid {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        file.flush()?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append `op`, returning its assigned sequence number. Buffered until
    /// [`Wal::flush`] or the auto-flush threshold is reached by the caller.
    pub fn append(&mut self, op: &Op) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, op: op.clone() };
        writeln!(self.file, "{}", serde_json::to_string(&entry)?)?;
        self.entries.push(entry);
        self.unflushed += 1;
        Ok(self.write_seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.unflushed = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Whether buffered writes should be flushed now: entry-count threshold
    /// or the flush interval has elapsed, whichever comes first.
    pub fn needs_flush(&self) -> bool {
        self.unflushed > 0
            && (self.unflushed >= FLUSH_ENTRY_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL)
    }

    /// Return the next entry past `processed_seq`, if any, without marking
    /// it processed. A corrupt line encountered mid-read yields `None`
    /// rather than an error — the caller retries once more has been
    /// appended past it.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry<Op>>, WalError> {
        if self.read_cursor >= self.entries.len() {
            return Ok(None);
        }
        let entry = self.entries[self.read_cursor].clone();
        self.read_cursor += 1;
        Ok(Some(entry))
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// All entries with `seq > after`, in order.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry<Op>>, WalError> {
        Ok(self.entries.iter().filter(|e| e.seq > after).cloned().collect())
    }

    /// Drop entries with `seq < keep_from` from memory and rewrite the
    /// on-disk file to match, normally called right after a snapshot so
    /// the WAL doesn't grow without bound.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        self.entries.retain(|e| e.seq >= keep_from);
        self.read_cursor = self.entries.iter().take_while(|e| e.seq <= self.processed_seq).count();

        let mut file = BufWriter::new(File::create(&self.path)?);
        for entry in &self.entries {
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
        }
        file.flush()?;
        self.file = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        Ok(())
    }
}

/// Rotate `path.bak -> path.bak.2 -> path.bak.3 -> (evicted)`, making room
/// for a fresh `path.bak`. `generations` counts the kept backups besides
/// the unsuffixed `.bak` itself (so 3 total: `.bak`, `.bak.2`, `.bak.3`).
fn rotate_bak_generations(path: &Path, generations: u32) -> std::io::Result<()> {
    for gen in (2..=generations).rev() {
        let from = if gen == 2 { path.with_extension("bak") } else { path.with_extension(format!("bak.{}", gen - 1)) };
        let to = path.with_extension(format!("bak.{gen}"));
        if from.exists() {
            std::fs::rename(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
