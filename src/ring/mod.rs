// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Many-producer single-consumer ring buffer of variable-length
//! records (C3, spec §4.2).
//!
//! This is the central concurrency primitive of the engine: every
//! outbound message crosses from an application thread to the
//! reactor thread through one of these, and no other path writes
//! directly to a socket (spec §3 invariants, §5).
//!
//! # Record layout
//!
//! Each record occupies an 8-byte-aligned region:
//!
//! ```text
//! +----------------+----------------+------------------------+
//! | length: u32 LE | type_id: i32   | payload (length bytes) |
//! +----------------+----------------+------------------------+
//! ```
//!
//! `type_id` doubles as the commit flag: `0` means "claimed but not
//! yet committed" (the consumer must stop here), `PADDING_TYPE_ID`
//! means "skip — this is an end-of-buffer or aborted record", and any
//! positive value is an application-assigned record type handed back
//! to the drain callback.
//!
//! # Ordering
//!
//! Producers reserve space with a single compare-and-swap on a
//! monotonic claim counter (never wrapped — only the byte index into
//! the backing array wraps via a power-of-two mask). `commit` writes
//! `type_id` with `Release` ordering; the consumer's `read` loads it
//! with `Acquire` and stops at the first record that is still `0`,
//! exactly as spec §4.2 requires: a producer that claimed first but
//! has not yet committed must not be skipped over by a faster
//! producer's already-committed record.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

const HEADER_LEN: usize = 8;
const ALIGNMENT: usize = 8;
const UNCOMMITTED_TYPE_ID: i32 = 0;
const PADDING_TYPE_ID: i32 = -1;

/// Ring buffer has no room for the requested claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Not enough free space right now; caller should retry, drop, or
    /// apply backpressure (spec §5: no implicit blocking).
    Full,
    /// `payload_len` can never fit even in an empty ring of this
    /// capacity.
    TooLarge { requested: usize, capacity: usize },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "ring buffer full (backpressure)"),
            Self::TooLarge { requested, capacity } => write!(
                f,
                "claim of {requested} bytes exceeds ring capacity {capacity}"
            ),
        }
    }
}

impl std::error::Error for RingError {}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Opaque handle returned by [`Ring::try_claim`]. Must be passed to
/// exactly one of [`Ring::commit`] or [`Ring::abort`].
#[derive(Debug, Clone, Copy)]
pub struct ClaimIndex {
    index: usize,
    payload_len: usize,
}

/// Many-producer single-consumer bounded queue of variable-length
/// byte records.
pub struct Ring {
    buffer: UnsafeCell<Vec<u8>>,
    capacity: usize,
    mask: usize,
    /// Monotonic count of bytes reserved by producers so far.
    claim: AtomicU64,
    /// Monotonic count of bytes freed by the consumer so far.
    tail: AtomicU64,
}

// SAFETY: all mutable access to `buffer` is gated either by the
// producer-side claim CAS (each byte range is claimed by exactly one
// producer) or by the single-consumer discipline of `read` (only one
// thread may call it, enforced by the caller per spec §4.2/§5).
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    /// `capacity` is rounded up to the next power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be > 0");
        let capacity = capacity.next_power_of_two();
        Self {
            buffer: UnsafeCell::new(vec![0u8; capacity]),
            capacity,
            mask: capacity - 1,
            claim: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate bytes currently claimed-but-unread. Racy by
    /// design (informational only — see spec §4.2 `read`).
    pub fn len(&self) -> usize {
        let claim = self.claim.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        (claim - tail) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn buf_mut(&self) -> &mut [u8] {
        // SAFETY: see the impl-level Send/Sync justification above.
        unsafe { &mut *self.buffer.get() }
    }

    fn type_id_ptr(&self, index: usize) -> *const AtomicI32 {
        // SAFETY: `index` is always 8-byte aligned (claims are
        // reserved in ALIGNMENT-rounded chunks starting from an
        // aligned origin), so the 4-byte type field at `index + 4`
        // satisfies AtomicI32's alignment requirement.
        unsafe { self.buf_mut().as_mut_ptr().add(index + 4).cast::<AtomicI32>() }
    }

    fn store_type_id(&self, index: usize, type_id: i32, order: Ordering) {
        // SAFETY: pointer is valid and aligned per `type_id_ptr`; the
        // claim/commit/abort protocol ensures no other thread writes
        // this word concurrently.
        unsafe { (*self.type_id_ptr(index)).store(type_id, order) }
    }

    fn load_type_id(&self, index: usize, order: Ordering) -> i32 {
        // SAFETY: see `store_type_id`.
        unsafe { (*self.type_id_ptr(index)).load(order) }
    }

    fn write_length(&self, index: usize, len: u32) {
        self.buf_mut()[index..index + 4].copy_from_slice(&len.to_le_bytes());
    }

    fn read_length(&self, index: usize) -> u32 {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&self.buf_mut()[index..index + 4]);
        u32::from_le_bytes(arr)
    }

    /// Reserves `payload_len + HEADER_LEN` bytes (rounded up to
    /// `ALIGNMENT`) at the producer tail. Pads with a padding record
    /// if the claim would wrap past the end of the backing array.
    pub fn try_claim(&self, payload_len: usize) -> Result<ClaimIndex, RingError> {
        let max_payload = self.capacity.saturating_sub(HEADER_LEN);
        if payload_len > max_payload {
            return Err(RingError::TooLarge {
                requested: payload_len,
                capacity: self.capacity,
            });
        }
        let record_len = align_up(HEADER_LEN + payload_len, ALIGNMENT);

        loop {
            let claim_pos = self.claim.load(Ordering::Relaxed);
            let index = (claim_pos as usize) & self.mask;
            let to_end = self.capacity - index;

            if to_end < record_len {
                // Claim would straddle the end of the array: reserve
                // the remainder as a padding record and retry from
                // the wrapped position.
                let tail = self.tail.load(Ordering::Acquire);
                if claim_pos + to_end as u64 - tail > self.capacity as u64 {
                    return Err(RingError::Full);
                }
                if self
                    .claim
                    .compare_exchange(
                        claim_pos,
                        claim_pos + to_end as u64,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    self.write_length(index, (to_end - HEADER_LEN) as u32);
                    self.store_type_id(index, PADDING_TYPE_ID, Ordering::Release);
                }
                continue;
            }

            let tail = self.tail.load(Ordering::Acquire);
            if claim_pos + record_len as u64 - tail > self.capacity as u64 {
                return Err(RingError::Full);
            }
            if self
                .claim
                .compare_exchange(
                    claim_pos,
                    claim_pos + record_len as u64,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                self.write_length(index, payload_len as u32);
                // type_id left at 0 (uncommitted) from the zero-init
                // buffer / previous abort-clear; set explicitly so a
                // reused slot from a prior wrap can't be mistaken for
                // already-committed.
                self.store_type_id(index, UNCOMMITTED_TYPE_ID, Ordering::Relaxed);
                return Ok(ClaimIndex { index, payload_len });
            }
        }
    }

    /// Returns the writable payload slice for a claimed, not yet
    /// committed region.
    pub fn write_at(&self, claim: ClaimIndex) -> &mut [u8] {
        let start = claim.index + HEADER_LEN;
        &mut self.buf_mut()[start..start + claim.payload_len]
    }

    /// Publishes the record with `Release` ordering so the consumer
    /// sees the payload writes that happened-before this call.
    pub fn commit(&self, claim: ClaimIndex, type_id: i32) {
        debug_assert!(type_id > 0, "application type ids must be positive");
        self.store_type_id(claim.index, type_id, Ordering::Release);
    }

    /// Marks the claimed region as padding; the consumer skips it
    /// without invoking the handler.
    pub fn abort(&self, claim: ClaimIndex) {
        self.store_type_id(claim.index, PADDING_TYPE_ID, Ordering::Release);
    }

    /// Drains all committed records from the published tail up to
    /// the first uncommitted (or not-yet-claimed) record, invoking
    /// `handler(type_id, payload)` for each non-padding record. Only
    /// one thread may call `read` at a time (spec §4.2/§5 single
    /// consumer). Returns the number of records delivered to
    /// `handler`.
    pub fn read<F: FnMut(i32, &[u8])>(&self, mut handler: F) -> usize {
        let mut pos = self.tail.load(Ordering::Relaxed);
        let limit = self.claim.load(Ordering::Acquire);
        let mut delivered = 0usize;

        while pos < limit {
            let index = (pos as usize) & self.mask;
            let type_id = self.load_type_id(index, Ordering::Acquire);
            if type_id == UNCOMMITTED_TYPE_ID {
                break;
            }
            let len = self.read_length(index);
            let record_len = align_up(HEADER_LEN + len as usize, ALIGNMENT) as u64;
            if type_id != PADDING_TYPE_ID {
                let start = index + HEADER_LEN;
                let payload = &self.buf_mut()[start..start + len as usize];
                handler(type_id, payload);
                delivered += 1;
            }
            pos += record_len;
        }

        self.tail.store(pos, Ordering::Release);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn claim_commit_read_roundtrip() {
        let ring = Ring::with_capacity(256);
        let claim = ring.try_claim(5).unwrap();
        ring.write_at(claim).copy_from_slice(b"hello");
        ring.commit(claim, 7);

        let mut seen = Vec::new();
        ring.read(|type_id, payload| seen.push((type_id, payload.to_vec())));
        assert_eq!(seen, vec![(7, b"hello".to_vec())]);
    }

    #[test]
    fn uncommitted_record_blocks_consumer() {
        let ring = Ring::with_capacity(256);
        let a = ring.try_claim(4).unwrap();
        let b = ring.try_claim(4).unwrap();
        ring.write_at(b).copy_from_slice(b"BBBB");
        ring.commit(b, 1); // b commits first, but a was claimed first

        let mut seen = Vec::new();
        let delivered = ring.read(|t, p| seen.push((t, p.to_vec())));
        assert_eq!(delivered, 0, "must not expose b until a commits");

        ring.write_at(a).copy_from_slice(b"AAAA");
        ring.commit(a, 2);
        ring.read(|t, p| seen.push((t, p.to_vec())));
        assert_eq!(seen, vec![(2, b"AAAA".to_vec()), (1, b"BBBB".to_vec())]);
    }

    #[test]
    fn abort_is_skipped_by_reader() {
        let ring = Ring::with_capacity(256);
        let claim = ring.try_claim(4).unwrap();
        ring.write_at(claim).copy_from_slice(b"skip");
        ring.abort(claim);

        let claim2 = ring.try_claim(4).unwrap();
        ring.write_at(claim2).copy_from_slice(b"keep");
        ring.commit(claim2, 3);

        let mut seen = Vec::new();
        ring.read(|t, p| seen.push((t, p.to_vec())));
        assert_eq!(seen, vec![(3, b"keep".to_vec())]);
    }

    #[test]
    fn full_ring_returns_distinct_error() {
        let ring = Ring::with_capacity(32);
        // first claim takes the whole usable capacity
        let claim = ring.try_claim(24).unwrap();
        ring.commit(claim, 1);
        let err = ring.try_claim(8).unwrap_err();
        assert_eq!(err, RingError::Full);
    }

    #[test]
    fn oversized_claim_is_too_large_not_full() {
        let ring = Ring::with_capacity(32);
        let err = ring.try_claim(1000).unwrap_err();
        matches!(err, RingError::TooLarge { .. });
    }

    #[test]
    fn wrap_around_pads_and_continues() {
        let ring = Ring::with_capacity(64);
        // Claim most of the buffer, commit, drain, then claim again
        // so the producer wraps past the end of the array.
        for _ in 0..3 {
            let c = ring.try_claim(16).unwrap();
            ring.write_at(c).copy_from_slice(&[9u8; 16]);
            ring.commit(c, 5);
            let mut count = 0;
            ring.read(|_, _| count += 1);
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn conserved_bytes_across_concurrent_producers() {
        let ring = Arc::new(Ring::with_capacity(1 << 16));
        let producers = 4;
        let per_producer = 200;
        let mut handles = Vec::new();
        for p in 0..producers {
            let ring = ring.clone();
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    loop {
                        if let Ok(c) = ring.try_claim(8) {
                            ring.write_at(c).copy_from_slice(&(p * 1000 + i).to_le_bytes());
                            ring.commit(c, 1);
                            break;
                        }
                        std::thread::yield_now();
                    }
                }
            }));
        }
        let mut total = 0usize;
        while total < producers * per_producer {
            total += ring.read(|_, _| {});
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(total, producers * per_producer);
    }
}
