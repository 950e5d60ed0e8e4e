// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection transport state (C4, spec §4.3).
//!
//! A [`TcpChannel`] is owned by the reactor thread but written to
//! concurrently by any number of producer threads through its
//! outbound [`Ring`]. No other path ever touches the socket: the
//! reactor is the only thread that calls `read`/`write` on the
//! underlying stream (spec §3 invariant).

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use mio::net::TcpStream;

use crate::ring::Ring;

/// Outcome of draining the outbound ring into the socket.
#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Everything claimed-and-committed so far was written.
    Drained,
    /// The socket would block; bytes remain queued in `pending` for
    /// the next writable-readiness notification.
    WouldBlock,
    Closed,
}

/// Outcome of a single readable-readiness poll.
pub enum ReadOutcome<'a> {
    /// New bytes are available at the front of the read buffer.
    Data(&'a [u8]),
    /// The peer has not sent a complete unit of work but the
    /// connection is still open.
    NeedMore,
    Closed,
}

/// Fixed read buffer plus an MPSC outbound ring, bound to one TCP
/// stream. `read_buf` is a flat byte array with a fill cursor rather
/// than a growable `Vec` so steady-state traffic never allocates
/// (spec §4 zero-allocation hot path).
pub struct TcpChannel {
    stream: TcpStream,
    read_buf: Box<[u8]>,
    read_len: usize,
    consumed: usize,
    /// Outbound records claimed by producer threads; drained by the
    /// reactor on writable readiness. Shared so the reactor can hand a
    /// cheap, thread-safe handle to this connection's ring out to the
    /// engine at connection time (spec §4.3) without holding a borrow
    /// of the channel itself.
    pub outbound: Arc<Ring>,
    /// Bytes copied out of `outbound` but not yet accepted by the
    /// kernel socket buffer (a partial `write` left a remainder).
    pending: VecDeque<u8>,
    closed: bool,
}

impl TcpChannel {
    pub fn new(stream: TcpStream, read_capacity: usize, outbound_capacity: usize) -> Self {
        Self {
            stream,
            read_buf: vec![0u8; read_capacity].into_boxed_slice(),
            read_len: 0,
            consumed: 0,
            outbound: Arc::new(Ring::with_capacity(outbound_capacity)),
            pending: VecDeque::with_capacity(outbound_capacity.min(4096)),
            closed: false,
        }
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shifts any unconsumed bytes to the front of the read buffer so
    /// the next `read` has room. Called by the codec once it has
    /// extracted as many complete messages as the current bytes allow
    /// (spec §4.5 framing `feed`).
    pub fn consume(&mut self, n: usize) {
        self.consumed += n;
        if self.consumed >= self.read_len {
            self.consumed = 0;
            self.read_len = 0;
            return;
        }
        if self.consumed > self.read_len / 2 {
            self.read_buf.copy_within(self.consumed..self.read_len, 0);
            self.read_len -= self.consumed;
            self.consumed = 0;
        }
    }

    /// Attempts one non-blocking read into the tail of the buffer.
    pub fn poll_read(&mut self) -> ReadOutcome<'_> {
        if self.closed {
            return ReadOutcome::Closed;
        }
        if self.read_len == self.read_buf.len() {
            // Buffer is full of unconsumed bytes: the codec above us
            // hasn't drained a complete frame. Report what we have;
            // the caller is responsible for treating this as a
            // protocol violation if it persists (oversized message).
            return ReadOutcome::Data(&self.read_buf[self.consumed..self.read_len]);
        }
        match self.stream.read(&mut self.read_buf[self.read_len..]) {
            Ok(0) => {
                self.closed = true;
                ReadOutcome::Closed
            }
            Ok(n) => {
                self.read_len += n;
                ReadOutcome::Data(&self.read_buf[self.consumed..self.read_len])
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::NeedMore,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => ReadOutcome::NeedMore,
            Err(_) => {
                self.closed = true;
                ReadOutcome::Closed
            }
        }
    }

    /// Moves every committed record out of `outbound` into `pending`,
    /// then writes as much of `pending` to the socket as the kernel
    /// will accept right now.
    pub fn drain_outbound(&mut self) -> DrainOutcome {
        if self.closed {
            return DrainOutcome::Closed;
        }
        let pending = &mut self.pending;
        self.outbound.read(|_type_id, payload| {
            pending.extend(payload.iter().copied());
        });

        while !self.pending.is_empty() {
            let (first, _) = self.pending.as_slices();
            let chunk = if first.is_empty() {
                self.pending.make_contiguous()
            } else {
                first
            };
            match self.stream.write(chunk) {
                Ok(0) => return DrainOutcome::WouldBlock,
                Ok(n) => {
                    self.pending.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return DrainOutcome::WouldBlock;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.closed = true;
                    return DrainOutcome::Closed;
                }
            }
        }
        DrainOutcome::Drained
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty() || !self.outbound.is_empty()
    }

    pub fn shutdown(&mut self) {
        self.closed = true;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;
    use std::io::Read as _;
    use std::net::TcpStream as StdTcpStream;

    fn connected_pair() -> (TcpChannel, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        let (server, _) = loop {
            if let Ok(pair) = listener.accept() {
                break pair;
            }
        };
        let channel = TcpChannel::new(server, 4096, 4096);
        (channel, client)
    }

    #[test]
    fn drain_writes_committed_records_in_order() {
        let (mut channel, mut client) = connected_pair();
        let c1 = channel.outbound.try_claim(3).unwrap();
        channel.outbound.write_at(c1).copy_from_slice(b"abc");
        channel.outbound.commit(c1, 1);
        let c2 = channel.outbound.try_claim(3).unwrap();
        channel.outbound.write_at(c2).copy_from_slice(b"def");
        channel.outbound.commit(c2, 1);

        let outcome = channel.drain_outbound();
        assert_eq!(outcome, DrainOutcome::Drained);

        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn consume_compacts_buffer_once_past_halfway() {
        let (mut channel, _client) = connected_pair();
        channel.read_len = 100;
        channel.consume(60);
        assert_eq!(channel.consumed, 0);
        assert_eq!(channel.read_len, 40);
    }
}
