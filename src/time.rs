// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monotonic and UTC wall-clock time source (C1).
//!
//! Every timestamp that crosses a session, journal, or codec boundary
//! goes through this module so that tests can reason about elapsed
//! time without sleeping and so the hot path never calls
//! `SystemTime::now()` directly in more than one place.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Nanoseconds since an arbitrary but fixed epoch, monotonically
/// non-decreasing for the lifetime of the process. Not comparable
/// across processes or after a suspend/resume; use only for interval
/// measurement (heartbeat timers, timeouts).
pub fn now_nanos() -> u64 {
    MONOTONIC_ORIGIN.elapsed().as_nanos() as u64
}

/// Milliseconds since the UTC epoch. Used for journal entry
/// timestamps and FIX `SendingTime`/`OrigSendingTime`.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Renders `epoch_ms` as FIX's `YYYYMMDD-HH:MM:SS.sss` (21 ASCII
/// bytes, UTC). Pure function of the input so tests can pin exact
/// byte sequences without depending on wall-clock time.
pub fn format_fix_sending_time(epoch_ms: u64) -> [u8; 21] {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch 0 is representable"));
    let formatted = dt.format("%Y%m%d-%H:%M:%S%.3f").to_string();

    let mut out = [0u8; 21];
    let bytes = formatted.as_bytes();
    let n = bytes.len().min(21);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

static MONOTONIC_ORIGIN: once_instant::Lazy = once_instant::Lazy::new();

/// Tiny lazily-initialized `Instant` so `now_nanos()` has a fixed
/// origin without requiring callers to construct a time source.
mod once_instant {
    use super::{Instant, OnceLock};

    pub struct Lazy(OnceLock<Instant>);

    impl Lazy {
        pub const fn new() -> Self {
            Self(OnceLock::new())
        }

        pub fn elapsed(&self) -> std::time::Duration {
            self.0.get_or_init(Instant::now).elapsed()
        }
    }
}

use std::sync::OnceLock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sending_time_format_matches_fix_layout() {
        let epoch_ms: u64 = 1_767_322_845_678;
        let rendered = format_fix_sending_time(epoch_ms);
        let s = std::str::from_utf8(&rendered).unwrap();
        assert_eq!(s.len(), 21);
        assert_eq!(&s[8..9], "-");
        assert_eq!(&s[11..12], ":");
        assert_eq!(&s[14..15], ":");
        assert_eq!(&s[17..18], ".");
        assert_eq!(&s[18..21], "678");
    }

    #[test]
    fn sending_time_roundtrips_known_epoch() {
        // 1970-01-01 00:00:00.000
        let rendered = format_fix_sending_time(0);
        assert_eq!(std::str::from_utf8(&rendered).unwrap(), "19700101-00:00:00.000");
    }

    #[test]
    fn now_nanos_is_monotonic_non_decreasing() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
    }

    #[test]
    fn now_millis_is_plausible_epoch() {
        // Sometime after 2020-01-01; guards against an accidental unit mixup.
        assert!(now_millis() > 1_577_836_800_000);
    }
}
