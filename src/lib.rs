// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OmniBridge: an ultra-low-latency FIX/OUCH connectivity engine.
//!
//! This crate owns wire framing, session-level sequencing and
//! recovery, and durable journaling for electronic-trading
//! connectivity. It deliberately does not own an order book, a
//! matching engine, or any business-level validation of message
//! content (spec §2 Non-goals) — every component below the engine
//! boundary treats application payloads as opaque bytes to sequence,
//! journal, and relay.
//!
//! # Layout
//!
//! - [`buf`] — zero-copy buffer primitives (`ByteBuf`/`ByteBufMut`,
//!   `Cursor`/`CursorMut`).
//! - [`ring`] — the lock-free MPSC ring buffer every outbound message
//!   crosses on its way to the reactor thread.
//! - [`transport::tcp`] — the mio-based single-threaded reactor and
//!   its per-connection TCP channels.
//! - [`codec`] — the FIX tag=value codec and the OUCH/SoupBinTCP
//!   binary codec.
//! - [`session`] — the FIX and OUCH session state machines.
//! - [`journal`] — the memory-mapped append-only message journal.
//! - [`engine`] — wires the above together behind the public API a
//!   host process drives.
//! - [`config`] — typed configuration consumed by [`engine::Engine::new`].
//! - [`error`] — the crate-wide error taxonomy.
//! - [`time`] — monotonic timing and FIX `SendingTime` formatting.

pub mod buf;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod journal;
pub mod ring;
pub mod session;
pub mod time;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{Engine, EngineListener, MessageDirection};
pub use error::EngineError;
