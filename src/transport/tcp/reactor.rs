// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded, mio-based I/O reactor (C5, spec §4.4).
//!
//! One `Reactor` runs one event loop on one thread, pinned (outside
//! this module's concern — see spec §4 core-affinity note) for the
//! lifetime of the process. Every socket the engine owns is
//! registered with this loop; there is no per-connection thread.
//! Commands (connect/listen/stop) arrive over a bounded crossbeam
//! channel and are drained once per iteration before polling, so a
//! burst of commands never starves I/O readiness events.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TrySendError};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use super::channel::{DrainOutcome, ReadOutcome, TcpChannel};
use super::config::{ConnectionRole, NetworkConfig};

const WAKER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

#[derive(Debug)]
pub enum ReactorError {
    Io(io::Error),
    CommandQueueFull,
    UnknownConnection(ConnectionId),
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "reactor I/O error: {e}"),
            Self::CommandQueueFull => write!(f, "reactor command queue full"),
            Self::UnknownConnection(id) => write!(f, "unknown connection {id:?}"),
        }
    }
}

impl std::error::Error for ReactorError {}

impl From<io::Error> for ReactorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Identifies one registered connection across its lifetime. Stable
/// even though the underlying `mio::Token` may be reused after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

enum Registration {
    /// `config` is retained so every connection the listener accepts
    /// is sized (`read_buffer_size`/`ring_buffer_capacity`, spec §6)
    /// the same way as the listener's own configuration, since a
    /// listener's acceptor config is what a deployment tunes per
    /// session rather than per accepted socket.
    Listener { listener: TcpListener, config: NetworkConfig },
    Channel { token: Token, channel: TcpChannel },
}

enum Command {
    Connect { id: ConnectionId, config: NetworkConfig },
    Listen { id: ConnectionId, config: NetworkConfig },
    Close { id: ConnectionId },
    Stop,
}

/// Callbacks invoked from the reactor thread. Implementations must
/// not block — this is the same thread draining every other
/// connection's I/O (spec §4.4 reactor contract).
pub trait ReactorCallbacks {
    /// Fired once a connection (accepted or dialed) is registered with
    /// the loop. `outbound` is a clone of the channel's ring handle —
    /// the one opportunity for a callback to stash a thread-safe
    /// sender-side handle for later use, since payloads placed on a
    /// ring are the only path producer threads have into this
    /// connection's socket (spec §4.3).
    fn on_connected(&mut self, id: ConnectionId, outbound: Arc<crate::ring::Ring>);
    fn on_connect_failed(&mut self, id: ConnectionId, error: &io::Error);
    fn on_data_received(&mut self, id: ConnectionId, data: &[u8]) -> usize;
    fn on_disconnected(&mut self, id: ConnectionId);

    /// Invoked once per event-loop iteration, before polling for I/O
    /// readiness (spec §4.4 step 1: "drain the task queue"). This
    /// reactor has no generic cross-thread task submission beyond
    /// [`Command`]; periodic work (heartbeat timers, peer-silence
    /// checks) is instead driven from here, on the reactor thread,
    /// which is what the spec's "periodic scheduled task" ends up
    /// meaning in practice. Default no-op so existing callbacks
    /// compile unchanged.
    fn on_tick(&mut self) {}
}

/// Thread-safe handle used by application threads to drive the
/// reactor without touching its internals directly.
#[derive(Clone)]
pub struct ReactorHandle {
    commands: Sender<Command>,
    waker: Arc<Waker>,
    stop_flag: Arc<AtomicBool>,
}

impl ReactorHandle {
    pub fn connect(&self, id: ConnectionId, config: NetworkConfig) -> Result<(), ReactorError> {
        self.send(Command::Connect { id, config })
    }

    pub fn listen(&self, id: ConnectionId, config: NetworkConfig) -> Result<(), ReactorError> {
        self.send(Command::Listen { id, config })
    }

    pub fn close(&self, id: ConnectionId) -> Result<(), ReactorError> {
        self.send(Command::Close { id })
    }

    /// Requests a graceful stop. `Reactor::run` returns after the
    /// current iteration drains outstanding writes.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        let _ = self.send(Command::Stop);
    }

    fn send(&self, cmd: Command) -> Result<(), ReactorError> {
        match self.commands.try_send(cmd) {
            Ok(()) => {
                self.waker.wake()?;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(ReactorError::CommandQueueFull),
            Err(TrySendError::Disconnected(_)) => Err(ReactorError::CommandQueueFull),
        }
    }
}

/// Event-loop polling discipline (spec §4.4): `busy-spin` never blocks
/// in `poll`, trading CPU for the lowest possible latency; the
/// default cooperative mode blocks up to `poll_timeout`.
#[derive(Debug, Clone, Copy)]
pub enum PollMode {
    BusySpin,
    Cooperative { poll_timeout: Duration },
}

pub struct Reactor {
    poll: Poll,
    events: Events,
    commands: Receiver<Command>,
    waker: Arc<Waker>,
    stop_flag: Arc<AtomicBool>,
    registrations: HashMap<Token, Registration>,
    id_to_token: HashMap<ConnectionId, Token>,
    listener_ids: HashMap<Token, ConnectionId>,
    next_token: usize,
    poll_mode: PollMode,
}

impl Reactor {
    pub fn new(poll_mode: PollMode) -> io::Result<(Self, ReactorHandle)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (tx, rx) = crossbeam::channel::bounded(4096);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let handle = ReactorHandle {
            commands: tx,
            waker: waker.clone(),
            stop_flag: stop_flag.clone(),
        };
        let reactor = Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            commands: rx,
            waker,
            stop_flag,
            registrations: HashMap::new(),
            id_to_token: HashMap::new(),
            listener_ids: HashMap::new(),
            next_token: 0,
            poll_mode,
        };
        Ok((reactor, handle))
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Runs the event loop until [`ReactorHandle::stop`] is called.
    /// `callbacks` is only ever touched from this thread.
    pub fn run<C: ReactorCallbacks>(&mut self, callbacks: &mut C) -> io::Result<()> {
        loop {
            self.drain_commands(callbacks)?;
            callbacks.on_tick();
            if self.stop_flag.load(Ordering::Acquire) && !self.has_pending_writes() {
                return Ok(());
            }

            let timeout = match self.poll_mode {
                PollMode::BusySpin => Some(Duration::ZERO),
                PollMode::Cooperative { poll_timeout } => Some(poll_timeout),
            };
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let tokens: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .filter(|ev| ev.token() != WAKER_TOKEN)
                .map(|ev| (ev.token(), ev.is_readable(), ev.is_writable()))
                .collect();

            for (token, readable, writable) in tokens {
                self.dispatch(token, readable, writable, callbacks);
            }

            // A callback's on_data_received (or on_tick) may have
            // claimed+committed new outbound records on a channel that
            // is not among this iteration's writable-readiness events
            // (e.g. a heartbeat produced between two reads). Sweep
            // every channel with pending bytes rather than waiting for
            // the next writable event (spec §4.4 step 4).
            self.drain_pending_writes(callbacks);
        }
    }

    fn drain_pending_writes<C: ReactorCallbacks>(&mut self, callbacks: &mut C) {
        let mut to_close = Vec::new();
        for (token, reg) in self.registrations.iter_mut() {
            if let Registration::Channel { channel, .. } = reg {
                if channel.has_pending_writes() && channel.drain_outbound() == DrainOutcome::Closed {
                    to_close.push(*token);
                }
            }
        }
        for token in to_close {
            if let Some(id) = self.id_to_token.iter().find(|(_, t)| **t == token).map(|(id, _)| *id) {
                self.handle_close(id, callbacks);
            }
        }
    }

    fn has_pending_writes(&self) -> bool {
        self.registrations.values().any(|r| match r {
            Registration::Channel { channel, .. } => channel.has_pending_writes(),
            Registration::Listener { .. } => false,
        })
    }

    fn drain_commands<C: ReactorCallbacks>(&mut self, callbacks: &mut C) -> io::Result<()> {
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Connect { id, config } => self.handle_connect(id, config, callbacks)?,
                Command::Listen { id, config } => self.handle_listen(id, config)?,
                Command::Close { id } => self.handle_close(id, callbacks),
                Command::Stop => {}
            }
        }
        Ok(())
    }

    fn handle_connect<C: ReactorCallbacks>(
        &mut self,
        id: ConnectionId,
        config: NetworkConfig,
        callbacks: &mut C,
    ) -> io::Result<()> {
        debug_assert_eq!(config.role, ConnectionRole::Initiator);
        match TcpStream::connect(config.address) {
            Ok(mut stream) => {
                apply_socket_options(&stream, &config);
                let token = self.alloc_token();
                self.poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
                let channel = TcpChannel::new(stream, config.read_buffer_size, config.ring_buffer_capacity);
                let outbound = channel.outbound.clone();
                self.registrations
                    .insert(token, Registration::Channel { token, channel });
                self.id_to_token.insert(id, token);
                log::info!("reactor: connecting {id:?} to {}", config.address);
                callbacks.on_connected(id, outbound);
                Ok(())
            }
            Err(e) => {
                log::warn!("reactor: connect failed for {id:?}: {e}");
                callbacks.on_connect_failed(id, &e);
                Ok(())
            }
        }
    }

    fn handle_listen(&mut self, id: ConnectionId, config: NetworkConfig) -> io::Result<()> {
        debug_assert_eq!(config.role, ConnectionRole::Acceptor);
        let mut listener = TcpListener::bind(config.address)?;
        let token = self.alloc_token();
        self.poll
            .registry()
            .register(&mut listener, token, Interest::READABLE)?;
        log::info!("reactor: listening for {id:?} on {}", config.address);
        self.registrations.insert(token, Registration::Listener { listener, config });
        self.listener_ids.insert(token, id);
        Ok(())
    }

    fn handle_close<C: ReactorCallbacks>(&mut self, id: ConnectionId, callbacks: &mut C) {
        if let Some(token) = self.id_to_token.remove(&id) {
            if let Some(Registration::Channel { mut channel, .. }) = self.registrations.remove(&token) {
                let _ = self.poll.registry().deregister(channel.stream_mut());
                channel.shutdown();
                callbacks.on_disconnected(id);
            }
        }
    }

    fn dispatch<C: ReactorCallbacks>(
        &mut self,
        token: Token,
        readable: bool,
        writable: bool,
        callbacks: &mut C,
    ) {
        if let Some(listener_id) = self.listener_ids.get(&token).copied() {
            if readable {
                self.accept_loop(token, listener_id, callbacks);
            }
            return;
        }

        let id = match self.id_to_token.iter().find(|(_, t)| **t == token).map(|(id, _)| *id) {
            Some(id) => id,
            None => return,
        };

        let mut should_close = false;
        if let Some(Registration::Channel { channel, .. }) = self.registrations.get_mut(&token) {
            if writable {
                match channel.drain_outbound() {
                    DrainOutcome::Closed => should_close = true,
                    DrainOutcome::Drained | DrainOutcome::WouldBlock => {}
                }
            }
            if readable && !should_close {
                loop {
                    match channel.poll_read() {
                        ReadOutcome::Data(data) if !data.is_empty() => {
                            let consumed = callbacks.on_data_received(id, data);
                            channel.consume(consumed);
                            if consumed == 0 {
                                break;
                            }
                        }
                        ReadOutcome::Data(_) | ReadOutcome::NeedMore => break,
                        ReadOutcome::Closed => {
                            should_close = true;
                            break;
                        }
                    }
                }
            }
        }

        if should_close {
            self.handle_close(id, callbacks);
        }
    }

    fn accept_loop<C: ReactorCallbacks>(&mut self, listener_token: Token, listener_id: ConnectionId, callbacks: &mut C) {
        loop {
            let (accepted, read_buffer_size, ring_buffer_capacity) = match self.registrations.get(&listener_token) {
                Some(Registration::Listener { listener, config }) => {
                    (listener.accept(), config.read_buffer_size, config.ring_buffer_capacity)
                }
                _ => return,
            };
            match accepted {
                Ok((mut stream, peer)) => {
                    let token = self.alloc_token();
                    if self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                        .is_err()
                    {
                        continue;
                    }
                    let channel = TcpChannel::new(stream, read_buffer_size, ring_buffer_capacity);
                    let outbound = channel.outbound.clone();
                    self.registrations
                        .insert(token, Registration::Channel { token, channel });
                    self.id_to_token.insert(listener_id, token);
                    log::info!("reactor: accepted connection from {peer} for {listener_id:?}");
                    callbacks.on_connected(listener_id, outbound);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(_) => return,
            }
        }
    }

    /// Access to a registered channel's outbound ring by id, for
    /// callers that did not retain the handle passed to
    /// `on_connected`. Returns `None` once the connection has closed.
    pub fn outbound_ring(&self, id: ConnectionId) -> Option<Arc<crate::ring::Ring>> {
        let token = self.id_to_token.get(&id)?;
        match self.registrations.get(token)? {
            Registration::Channel { channel, .. } => Some(channel.outbound.clone()),
            Registration::Listener { .. } => None,
        }
    }
}

fn apply_socket_options(stream: &TcpStream, config: &NetworkConfig) {
    if let Ok(socket) = socket2::SockRef::try_from(stream) {
        let _ = socket.set_nodelay(config.nodelay);
        let _ = socket.set_keepalive(config.keepalive);
        if let Some(size) = config.recv_buffer_size {
            let _ = socket.set_recv_buffer_size(size);
        }
        if let Some(size) = config.send_buffer_size {
            let _ = socket.set_send_buffer_size(size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    struct RecordingCallbacks {
        connected: Arc<AtomicUsize>,
        received: Arc<AtomicUsize>,
    }

    impl ReactorCallbacks for RecordingCallbacks {
        fn on_connected(&mut self, _id: ConnectionId, _outbound: Arc<crate::ring::Ring>) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        fn on_connect_failed(&mut self, _id: ConnectionId, _error: &io::Error) {}
        fn on_data_received(&mut self, _id: ConnectionId, data: &[u8]) -> usize {
            self.received.fetch_add(data.len(), Ordering::SeqCst);
            data.len()
        }
        fn on_disconnected(&mut self, _id: ConnectionId) {}
    }

    #[test]
    fn listen_and_accept_invokes_connected_callback() {
        let (mut reactor, handle) = Reactor::new(PollMode::Cooperative {
            poll_timeout: Duration::from_millis(50),
        })
        .unwrap();
        let connected = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(AtomicUsize::new(0));
        let mut callbacks = RecordingCallbacks {
            connected: connected.clone(),
            received: received.clone(),
        };

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        // bind a throwaway listener first to discover a free port
        let probe = std::net::TcpListener::bind(addr).unwrap();
        let bound_addr = probe.local_addr().unwrap();
        drop(probe);

        handle
            .listen(ConnectionId(1), NetworkConfig::acceptor(bound_addr))
            .unwrap();

        let stop = handle.clone();
        let join = thread::spawn(move || {
            reactor.run(&mut callbacks).unwrap();
            (reactor, callbacks)
        });

        thread::sleep(Duration::from_millis(50));
        let _client = std::net::TcpStream::connect(bound_addr).unwrap();
        thread::sleep(Duration::from_millis(100));
        stop.stop();
        let (_reactor, callbacks) = join.join().unwrap();
        assert!(callbacks.connected.load(Ordering::SeqCst) >= 1);
    }
}
