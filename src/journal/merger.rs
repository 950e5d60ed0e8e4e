// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multi-stream, timestamp-ordered replay (spec §4.9).
//!
//! Used by tooling and recovery paths that need a single
//! chronological view across every session's journal stream (e.g.
//! reconstructing a cross-session audit trail). Ties between records
//! with the same `timestamp_epoch_ms` are broken by stream name so
//! replay order is deterministic across runs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::PathBuf;

use super::{JournalError, JournalRecord, JournalTailer};

/// One record tagged with the stream it came from, in chronological
/// merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub stream: String,
    pub record: JournalRecord,
}

struct HeapEntry {
    stream: String,
    record: JournalRecord,
    stream_index: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.timestamp_epoch_ms == other.record.timestamp_epoch_ms && self.stream == other.stream
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest timestamp
        // (then lexicographically smallest stream name) pops first.
        other
            .record
            .timestamp_epoch_ms
            .cmp(&self.record.timestamp_epoch_ms)
            .then_with(|| other.stream.cmp(&self.stream))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges every stream file under a base path into one
/// timestamp-ordered sequence. Holds one open [`JournalTailer`] per
/// stream and only ever keeps one pending record per stream in
/// memory.
pub struct JournalMerger {
    tailers: Vec<JournalTailer>,
    names: Vec<String>,
    heap: BinaryHeap<HeapEntry>,
    primed: bool,
}

impl JournalMerger {
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let base_path = base_path.into();
        let paths = super::discover_streams(&base_path)?;
        let mut tailers = Vec::with_capacity(paths.len());
        let mut names = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            tailers.push(JournalTailer::open(&path)?);
            names.push(name);
        }
        Ok(Self {
            tailers,
            names,
            heap: BinaryHeap::new(),
            primed: false,
        })
    }

    fn prime(&mut self) -> Result<(), JournalError> {
        for idx in 0..self.tailers.len() {
            self.refill(idx)?;
        }
        self.primed = true;
        Ok(())
    }

    fn refill(&mut self, stream_index: usize) -> Result<(), JournalError> {
        if let Some(record) = self.tailers[stream_index].next_record()? {
            self.heap.push(HeapEntry {
                stream: self.names[stream_index].clone(),
                record,
                stream_index,
            });
        }
        Ok(())
    }

    /// Returns the next record in global timestamp order, or `None`
    /// once every stream is exhausted (as of the moment this method
    /// is called — a live writer appending afterward is not observed
    /// by an exhausted merge).
    pub fn next(&mut self) -> Result<Option<MergedRecord>, JournalError> {
        if !self.primed {
            self.prime()?;
        }
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(entry.stream_index)?;
        Ok(Some(MergedRecord {
            stream: entry.stream,
            record: entry.record,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Direction, JournalWriter};
    use tempfile::tempdir;

    fn rec(seq: u32, ts: u64, payload: &[u8]) -> JournalRecord {
        JournalRecord {
            timestamp_epoch_ms: ts,
            sequence_number: seq,
            direction: Direction::Outbound,
            metadata: Vec::new(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn merges_two_streams_in_timestamp_order() {
        let dir = tempdir().unwrap();
        {
            let mut a = JournalWriter::create(dir.path().join("alpha.log"), true, "x").unwrap();
            a.append(&rec(1, 100, b"a1")).unwrap();
            a.append(&rec(2, 300, b"a2")).unwrap();
            a.flush().unwrap();
        }
        {
            let mut b = JournalWriter::create(dir.path().join("beta.log"), true, "x").unwrap();
            b.append(&rec(1, 200, b"b1")).unwrap();
            b.flush().unwrap();
        }

        let mut merger = JournalMerger::open(dir.path()).unwrap();
        let mut order = Vec::new();
        while let Some(rec) = merger.next().unwrap() {
            order.push((rec.stream, rec.record.timestamp_epoch_ms));
        }
        assert_eq!(
            order,
            vec![
                ("alpha".to_string(), 100),
                ("beta".to_string(), 200),
                ("alpha".to_string(), 300),
            ]
        );
    }

    #[test]
    fn tie_broken_by_stream_name() {
        let dir = tempdir().unwrap();
        {
            let mut z = JournalWriter::create(dir.path().join("zeta.log"), true, "x").unwrap();
            z.append(&rec(1, 500, b"z")).unwrap();
            z.flush().unwrap();
        }
        {
            let mut a = JournalWriter::create(dir.path().join("alpha.log"), true, "x").unwrap();
            a.append(&rec(1, 500, b"a")).unwrap();
            a.flush().unwrap();
        }
        let mut merger = JournalMerger::open(dir.path()).unwrap();
        let first = merger.next().unwrap().unwrap();
        assert_eq!(first.stream, "alpha");
    }
}
