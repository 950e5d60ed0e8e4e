// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only, memory-mapped per-stream journal (C10, spec §4.9).
//!
//! Every inbound and outbound application message, plus every FIX
//! sequence-number change, is appended to a journal stream before the
//! engine considers it durable. A stream is one file; a session's
//! journal is one stream named after the session identity (see
//! [`stream_name`]). On restart the engine replays the tail of the
//! relevant stream(s) to recover sequence numbers and resend buffers
//! (spec §4.5, §4.8).
//!
//! # On-disk format (v2)
//!
//! ```text
//! header (144B): magic "LOGSTORE" (8B)
//!                | version: u32 LE (8..12, = 2)
//!                | decoder-class-name length: u32 LE (12..16)
//!                | decoder-class-name, NUL-padded (16..144, 128B)
//!                | entry-count: u64 LE (128..136, aliased with the
//!                  tail of decoder-class-name above)
//!                | write-position: u64 LE (136..144, aliased too)
//! entry:         timestamp-epoch-ms: u64 LE
//!                | sequence-number: u32 LE
//!                | direction: u8 (0 = IN, 1 = OUT)
//!                | metadata-length: u16 LE | metadata
//!                | payload-length: u32 LE | payload
//! ```
//!
//! The entry-count/write-position fields occupy the same 16 bytes as
//! the last 16 bytes of the decoder-class-name region — this is the
//! on-disk layout spec'd for this journal version, not a bug this
//! crate introduced. A decoder class name longer than 112 bytes will
//! have its tail overwritten by the first append; nothing in this
//! crate relies on decoder-class-name for correctness (it is
//! informational only, read back by external tooling), and recovery
//! of `write_offset` is done by scanning records rather than trusting
//! the header counters, so the aliasing cannot corrupt replay.
//!
//! `*.log` streams carry the v2 header and are read-write. `*.fixlog`
//! streams are a legacy v1 format — a 64-byte header with no magic or
//! decoder-class-name (entry-count at offset 0, write-position at
//! offset 8, the rest reserved) — and are opened read-only for replay
//! only; nothing writes v1 streams anymore (spec §9 Design Notes).

pub mod merger;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

pub use merger::JournalMerger;

const MAGIC_V2: &[u8; 8] = b"LOGSTORE";
const HEADER_LEN_V2: u64 = 144;
const HEADER_LEN_V1: u64 = 64;
const DECODER_NAME_OFFSET: usize = 16;
const DECODER_NAME_LEN: usize = 128;
const ENTRY_COUNT_OFFSET: usize = 128;
const WRITE_POSITION_OFFSET: usize = 136;
const INITIAL_FILE_LEN: u64 = 1 << 20;

/// Maximum sizes spec §3 places on a journal entry's variable parts.
pub const MAX_METADATA_LEN: usize = u16::MAX as usize;
pub const MAX_PAYLOAD_LEN: usize = i32::MAX as usize;

#[derive(Debug)]
pub enum JournalError {
    Io(io::Error),
    CorruptHeader { path: PathBuf },
    Truncated { path: PathBuf, offset: u64, needed: usize },
    MetadataTooLarge { len: usize },
    PayloadTooLarge { len: usize },
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "journal I/O error: {e}"),
            Self::CorruptHeader { path } => write!(f, "corrupt journal header: {}", path.display()),
            Self::Truncated { path, offset, needed } => write!(
                f,
                "journal record truncated at {} offset {offset}: needed {needed} more bytes",
                path.display()
            ),
            Self::MetadataTooLarge { len } => write!(f, "metadata length {len} exceeds {MAX_METADATA_LEN}"),
            Self::PayloadTooLarge { len } => write!(f, "payload length {len} exceeds {MAX_PAYLOAD_LEN}"),
        }
    }
}

impl std::error::Error for JournalError {}

impl From<io::Error> for JournalError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Which on-disk layout a stream file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    V1Legacy,
    V2,
}

/// Direction of one journal entry relative to this process (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    fn to_byte(self) -> u8 {
        match self {
            Self::Inbound => 0,
            Self::Outbound => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Inbound),
            1 => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// One decoded record read back from a stream (spec §3 "Journal
/// entry").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub timestamp_epoch_ms: u64,
    pub sequence_number: u32,
    pub direction: Direction,
    pub metadata: Vec<u8>,
    pub payload: Vec<u8>,
}

fn data_start(format: StreamFormat) -> u64 {
    match format {
        StreamFormat::V1Legacy => HEADER_LEN_V1,
        StreamFormat::V2 => HEADER_LEN_V2,
    }
}

/// Sanitizes a session identity (e.g. `"EX->CL"`) into a filesystem-safe
/// stream name (spec §3): `->` becomes `_to_`, and any remaining
/// character that isn't ASCII alphanumeric, `_`, `-`, or `.` becomes
/// `_`.
pub fn stream_name(identity: &str) -> String {
    let replaced = identity.replace("->", "_to_");
    replaced
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Appends records to one `*.log` stream. Grows the backing file (and
/// remaps) on demand rather than pre-committing a hard cap, since a
/// session's lifetime message volume is not known up front.
pub struct JournalWriter {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    file_len: u64,
    write_offset: u64,
    entry_count: u64,
    sync_on_write: bool,
}

impl JournalWriter {
    /// Opens (creating if absent) a v2 stream file for append.
    /// `decoder_class_name` is carried in the header for external
    /// tooling only — OmniBridge itself never reads it back.
    pub fn create(
        path: impl AsRef<Path>,
        sync_on_write: bool,
        decoder_class_name: &str,
    ) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        let existing_len = file.metadata()?.len();

        if existing_len == 0 {
            file.set_len(INITIAL_FILE_LEN)?;
            let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
            write_v2_header(&mut mmap, decoder_class_name);
            mmap.flush()?;
            return Ok(Self {
                path,
                file,
                mmap,
                file_len: INITIAL_FILE_LEN,
                write_offset: HEADER_LEN_V2,
                entry_count: 0,
                sync_on_write,
            });
        }

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        if mmap.len() < HEADER_LEN_V2 as usize || &mmap[0..8] != MAGIC_V2 {
            return Err(JournalError::CorruptHeader { path });
        }
        let (write_offset, entry_count) = scan_to_end(&mmap, existing_len, StreamFormat::V2)?;
        Ok(Self {
            path,
            file,
            mmap,
            file_len: existing_len,
            write_offset,
            entry_count,
            sync_on_write,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn ensure_capacity(&mut self, needed: u64) -> Result<(), JournalError> {
        if self.write_offset + needed <= self.file_len {
            return Ok(());
        }
        let mut new_len = self.file_len.max(INITIAL_FILE_LEN);
        while self.write_offset + needed > new_len {
            new_len *= 2;
        }
        self.file.set_len(new_len)?;
        self.mmap = unsafe { MmapOptions::new().map_mut(&self.file)? };
        self.file_len = new_len;
        Ok(())
    }

    /// Appends one record and returns its byte offset, usable with
    /// [`JournalTailer::set_position`] for fast recovery.
    pub fn append(&mut self, record: &JournalRecord) -> Result<u64, JournalError> {
        if record.metadata.len() > MAX_METADATA_LEN {
            return Err(JournalError::MetadataTooLarge { len: record.metadata.len() });
        }
        if record.payload.len() > MAX_PAYLOAD_LEN {
            return Err(JournalError::PayloadTooLarge { len: record.payload.len() });
        }
        let total = ENTRY_FIXED_PREFIX
            + record.metadata.len()
            + 4
            + record.payload.len();
        self.ensure_capacity(total as u64)?;

        let offset = self.write_offset as usize;
        let mut o = offset;
        self.mmap[o..o + 8].copy_from_slice(&record.timestamp_epoch_ms.to_le_bytes());
        o += 8;
        self.mmap[o..o + 4].copy_from_slice(&record.sequence_number.to_le_bytes());
        o += 4;
        self.mmap[o] = record.direction.to_byte();
        o += 1;
        self.mmap[o..o + 2].copy_from_slice(&(record.metadata.len() as u16).to_le_bytes());
        o += 2;
        self.mmap[o..o + record.metadata.len()].copy_from_slice(&record.metadata);
        o += record.metadata.len();
        self.mmap[o..o + 4].copy_from_slice(&(record.payload.len() as u32).to_le_bytes());
        o += 4;
        self.mmap[o..o + record.payload.len()].copy_from_slice(&record.payload);

        let record_offset = self.write_offset;
        self.write_offset += total as u64;
        self.entry_count += 1;

        // Maintained per the on-disk layout even though it aliases
        // the decoder-class-name tail (see module docs) and is not
        // consulted by this crate's own recovery path.
        self.mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8]
            .copy_from_slice(&self.entry_count.to_le_bytes());
        self.mmap[WRITE_POSITION_OFFSET..WRITE_POSITION_OFFSET + 8]
            .copy_from_slice(&self.write_offset.to_le_bytes());

        if self.sync_on_write {
            self.mmap.flush_async_range(offset, total)?;
        }
        Ok(record_offset)
    }

    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// Fixed-size portion of an entry before its variable metadata and
/// payload: timestamp(8) + sequence(4) + direction(1) + meta_len(2).
const ENTRY_FIXED_PREFIX: usize = 15;

fn write_v2_header(mmap: &mut MmapMut, decoder_class_name: &str) {
    mmap[0..8].copy_from_slice(MAGIC_V2);
    mmap[8..12].copy_from_slice(&2u32.to_le_bytes());
    let name_bytes = decoder_class_name.as_bytes();
    let name_len = name_bytes.len().min(DECODER_NAME_LEN);
    mmap[12..16].copy_from_slice(&(name_len as u32).to_le_bytes());
    mmap[DECODER_NAME_OFFSET..DECODER_NAME_OFFSET + DECODER_NAME_LEN].fill(0);
    mmap[DECODER_NAME_OFFSET..DECODER_NAME_OFFSET + name_len].copy_from_slice(&name_bytes[..name_len]);
    mmap[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 8].copy_from_slice(&0u64.to_le_bytes());
    mmap[WRITE_POSITION_OFFSET..WRITE_POSITION_OFFSET + 8]
        .copy_from_slice(&HEADER_LEN_V2.to_le_bytes());
}

/// Recovers `(write_offset, entry_count)` by scanning every record
/// from the start of the data region rather than trusting the
/// header's (possibly decoder-name-aliased) counters.
fn scan_to_end(data: &[u8], file_len: u64, format: StreamFormat) -> Result<(u64, u64), JournalError> {
    let mut offset = data_start(format);
    let mut count = 0u64;
    loop {
        if offset + ENTRY_FIXED_PREFIX as u64 > file_len {
            return Ok((offset, count));
        }
        let o = offset as usize;
        let meta_len = u16::from_le_bytes(data[o + 12..o + 14].try_into().unwrap()) as u64;
        if meta_len == 0 && data[o..o + 8].iter().all(|&b| b == 0) {
            // unwritten tail (zero-filled preallocation): timestamp of
            // zero with no metadata is indistinguishable from an
            // unwritten slot, so treat it as end-of-data.
            return Ok((offset, count));
        }
        let payload_len_at = o + ENTRY_FIXED_PREFIX + meta_len as usize;
        if payload_len_at + 4 > file_len as usize {
            return Ok((offset, count));
        }
        let payload_len = u32::from_le_bytes(data[payload_len_at..payload_len_at + 4].try_into().unwrap()) as u64;
        let total = ENTRY_FIXED_PREFIX as u64 + meta_len + 4 + payload_len;
        if offset + total > file_len {
            return Ok((offset, count));
        }
        offset += total;
        count += 1;
    }
}

/// Sequential or positioned reader over one stream, used both for
/// startup replay and for live tailing of a stream another process or
/// thread is still appending to.
pub struct JournalTailer {
    path: PathBuf,
    file: File,
    format: StreamFormat,
    position: u64,
}

impl JournalTailer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let format = detect_format(&path);
        let mut file = File::open(&path)?;
        let position = data_start(format);
        file.seek(SeekFrom::Start(position))?;
        Ok(Self { path, file, format, position })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Repositions to an absolute byte offset, the start of the data
    /// region, or (approximately) the end by scanning forward.
    pub fn set_position(&mut self, offset: u64) -> Result<(), JournalError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    pub fn seek_to_start(&mut self) -> Result<(), JournalError> {
        self.set_position(data_start(self.format))
    }

    /// Scans every record to the end of the file and parks the
    /// position there. Acceptable cost: recovery-path only.
    pub fn seek_to_end(&mut self) -> Result<(), JournalError> {
        while self.next_record()?.is_some() {}
        Ok(())
    }

    /// Linear scan from the start of the data region for the first
    /// record carrying `sequence_number`, then positions the tailer
    /// there. Acceptable cost: only used on session recovery, not the
    /// hot path.
    pub fn seek_by_seqnum(&mut self, sequence_number: u32) -> Result<bool, JournalError> {
        self.seek_to_start()?;
        loop {
            let before = self.position;
            match self.next_record()? {
                Some(rec) if rec.sequence_number == sequence_number => {
                    self.set_position(before)?;
                    return Ok(true);
                }
                Some(_) => continue,
                None => {
                    self.set_position(before)?;
                    return Ok(false);
                }
            }
        }
    }

    /// Reads the next complete record, if one is available. Returns
    /// `Ok(None)` (not an error) when the writer hasn't appended past
    /// the current position yet — callers poll again later.
    pub fn next_record(&mut self) -> Result<Option<JournalRecord>, JournalError> {
        let mut fixed = [0u8; ENTRY_FIXED_PREFIX];
        match self.file.read_exact(&mut fixed) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.file.seek(SeekFrom::Start(self.position))?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
        let timestamp_epoch_ms = u64::from_le_bytes(fixed[0..8].try_into().unwrap());
        let sequence_number = u32::from_le_bytes(fixed[8..12].try_into().unwrap());
        let meta_len = u16::from_le_bytes(fixed[13..15].try_into().unwrap()) as usize;
        if meta_len == 0 && timestamp_epoch_ms == 0 && sequence_number == 0 && fixed[12] == 0 {
            // Unwritten (zero-filled) tail: nothing more to read yet.
            self.file.seek(SeekFrom::Start(self.position))?;
            return Ok(None);
        }
        let direction = Direction::from_byte(fixed[12]).ok_or(JournalError::CorruptHeader { path: self.path.clone() })?;

        let mut metadata = vec![0u8; meta_len];
        if let Err(e) = self.file.read_exact(&mut metadata) {
            self.file.seek(SeekFrom::Start(self.position))?;
            return if e.kind() == io::ErrorKind::UnexpectedEof {
                Ok(None)
            } else {
                Err(e.into())
            };
        }

        let mut payload_len_buf = [0u8; 4];
        if let Err(e) = self.file.read_exact(&mut payload_len_buf) {
            self.file.seek(SeekFrom::Start(self.position))?;
            return if e.kind() == io::ErrorKind::UnexpectedEof {
                Ok(None)
            } else {
                Err(e.into())
            };
        }
        let payload_len = u32::from_le_bytes(payload_len_buf) as usize;

        let mut payload = vec![0u8; payload_len];
        if let Err(e) = self.file.read_exact(&mut payload) {
            self.file.seek(SeekFrom::Start(self.position))?;
            return if e.kind() == io::ErrorKind::UnexpectedEof {
                Ok(None)
            } else {
                Err(JournalError::Truncated {
                    path: self.path.clone(),
                    offset: self.position,
                    needed: payload_len,
                })
            };
        }

        self.position += (ENTRY_FIXED_PREFIX + meta_len + 4 + payload_len) as u64;
        Ok(Some(JournalRecord {
            timestamp_epoch_ms,
            sequence_number,
            direction,
            metadata,
            payload,
        }))
    }

    /// Drains every record currently available without blocking.
    /// `poll(0)` and `poll(Some(timeout))` both resolve synchronously
    /// here since the underlying file has no blocking-wait primitive;
    /// callers wanting cross-thread wakeup drive this from their own
    /// timer the way the engine's reactor task queue does (spec
    /// §4.9 `poll(timeout_ms)`).
    pub fn poll(&mut self) -> Result<Vec<JournalRecord>, JournalError> {
        let mut records = Vec::new();
        while let Some(rec) = self.next_record()? {
            records.push(rec);
        }
        Ok(records)
    }
}

fn detect_format(path: &Path) -> StreamFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("fixlog") => StreamFormat::V1Legacy,
        _ => StreamFormat::V2,
    }
}

/// Discovers stream files under `base_path`: `*.log` (current, r/w)
/// and `*.fixlog` (legacy, read-only) per spec §4.9.
pub fn discover_streams(base_path: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut streams = Vec::new();
    for entry in std::fs::read_dir(base_path)? {
        let entry = entry?;
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("log") | Some("fixlog") => streams.push(path),
            _ => {}
        }
    }
    streams.sort();
    Ok(streams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(seq: u32, ts: u64, dir: Direction, payload: &[u8]) -> JournalRecord {
        JournalRecord {
            timestamp_epoch_ms: ts,
            sequence_number: seq,
            direction: dir,
            metadata: Vec::new(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn write_then_tail_roundtrips_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-a.log");
        let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
        writer.append(&rec(1, 1000, Direction::Outbound, b"hello")).unwrap();
        writer.append(&rec(2, 2000, Direction::Inbound, b"world")).unwrap();
        writer.flush().unwrap();

        let mut tailer = JournalTailer::open(&path).unwrap();
        let first = tailer.next_record().unwrap().unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.direction, Direction::Outbound);
        assert_eq!(first.payload, b"hello");
        let second = tailer.next_record().unwrap().unwrap();
        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.direction, Direction::Inbound);
        assert_eq!(second.payload, b"world");
        assert!(tailer.next_record().unwrap().is_none());
    }

    #[test]
    fn metadata_round_trips_alongside_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-meta.log");
        let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
        let mut with_meta = rec(1, 500, Direction::Outbound, b"payload-bytes");
        with_meta.metadata = b"orig-sending-time=20260101".to_vec();
        writer.append(&with_meta).unwrap();
        writer.flush().unwrap();

        let mut tailer = JournalTailer::open(&path).unwrap();
        let got = tailer.next_record().unwrap().unwrap();
        assert_eq!(got.metadata, b"orig-sending-time=20260101");
        assert_eq!(got.payload, b"payload-bytes");
    }

    #[test]
    fn tailer_sees_records_appended_after_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-b.log");
        let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
        writer.append(&rec(1, 1000, Direction::Outbound, b"first")).unwrap();
        writer.flush().unwrap();

        let mut tailer = JournalTailer::open(&path).unwrap();
        assert_eq!(tailer.poll().unwrap().len(), 1);
        assert!(tailer.poll().unwrap().is_empty());

        writer.append(&rec(2, 2000, Direction::Outbound, b"second")).unwrap();
        writer.flush().unwrap();
        let more = tailer.poll().unwrap();
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].sequence_number, 2);
    }

    #[test]
    fn reopen_resumes_append_at_correct_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-c.log");
        {
            let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
            writer.append(&rec(1, 1000, Direction::Outbound, b"abc")).unwrap();
            writer.flush().unwrap();
        }
        {
            let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
            assert_eq!(writer.entry_count(), 1);
            writer.append(&rec(2, 2000, Direction::Outbound, b"def")).unwrap();
            writer.flush().unwrap();
        }
        let mut tailer = JournalTailer::open(&path).unwrap();
        let all = tailer.poll().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].sequence_number, 2);
    }

    #[test]
    fn seek_by_seqnum_locates_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session-d.log");
        let mut writer = JournalWriter::create(&path, true, "omnibridge.FixEntry").unwrap();
        for i in 1..=5u32 {
            writer
                .append(&rec(i, i as u64 * 10, Direction::Outbound, format!("msg{i}").as_bytes()))
                .unwrap();
        }
        writer.flush().unwrap();

        let mut tailer = JournalTailer::open(&path).unwrap();
        assert!(tailer.seek_by_seqnum(3).unwrap());
        let rec = tailer.next_record().unwrap().unwrap();
        assert_eq!(rec.sequence_number, 3);
    }

    #[test]
    fn legacy_fixlog_is_read_only_tolerant() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.fixlog");
        let mut raw = File::create(&path).unwrap();
        raw.write_all(&[0u8; HEADER_LEN_V1 as usize]).unwrap();
        let payload = b"legacy-record";
        raw.write_all(&9u64.to_le_bytes()).unwrap(); // timestamp
        raw.write_all(&7u32.to_le_bytes()).unwrap(); // sequence_number
        raw.write_all(&[1u8]).unwrap(); // direction: outbound
        raw.write_all(&0u16.to_le_bytes()).unwrap(); // metadata length
        raw.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
        raw.write_all(payload).unwrap();
        drop(raw);

        let mut tailer = JournalTailer::open(&path).unwrap();
        let rec = tailer.next_record().unwrap().unwrap();
        assert_eq!(rec.sequence_number, 7);
        assert_eq!(rec.direction, Direction::Outbound);
        assert_eq!(rec.payload, payload);
    }

    #[test]
    fn stream_name_sanitizes_arrow_and_invalid_chars() {
        assert_eq!(stream_name("EX->CL"), "EX_to_CL");
        assert_eq!(stream_name("FIX.4.4:SENDER/TARGET"), "FIX.4.4_SENDER_TARGET");
    }

    #[test]
    fn corrupt_magic_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.log");
        std::fs::write(&path, vec![0u8; 200]).unwrap();
        assert!(matches!(
            JournalWriter::create(&path, false, "x"),
            Err(JournalError::CorruptHeader { .. })
        ));
    }
}
