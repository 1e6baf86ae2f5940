/*!
 * Network Layer and Event Loop
 *
 * This module implements the TCP server: listener setup, the connection
 * lifecycle, and the single-threaded mio event loop that owns the store,
 * every socket, and the shutdown sequence.
 */

use crate::config::Config;
use crate::conn::{Connection, Connections};
use crate::dispatch::Dispatcher;
use crate::protocol::{Line, Reply, Request};
use crate::shutdown::Shutdown;
use crate::snapshot::Snapshot;
use anyhow::*;
use bytes::Buf;
use log::{debug, error, info, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::result::Result::{Err, Ok};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

/// Size of the scratch buffer for a single read
pub const READ_BUF: usize = 512;

/// Reads granted to one client per pass before others get a turn
pub const MAX_READS_PER_PASS: usize = 8;

/// Unflushed output above which a client's input is left unread until
/// it drains its replies
pub const WBUF_LIMIT: usize = 64 * 1024;

const EVENTS_CAP: usize = 128;

// Client tokens are slab keys counting up from zero; fixed sources take the top
const LISTENER: Token = Token(usize::MAX);
const WAKER: Token = Token(usize::MAX - 1);
#[cfg(unix)]
const SIGNALS: Token = Token(usize::MAX - 2);

/// Bind a non-blocking TCP listener
///
/// Uses socket2 so the listen backlog can be chosen and `SO_REUSEADDR`
/// set, letting a restarted server rebind while old sockets sit in
/// TIME_WAIT.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .context("socket creation failed")?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;

    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("socket binding to {} failed", addr))?;
    socket.listen(backlog).context("socket listening failed")?;

    Ok(TcpListener::from_std(socket.into()))
}

/// The database server: one poller, one listener, one store
pub struct Server {
    poll: Poll,
    listener: TcpListener,
    conns: Connections,
    dispatcher: Dispatcher,
    snapshot: Snapshot,
    shutdown: Shutdown,
    // Clients whose last pass stopped with input possibly left unread
    resume: Vec<Token>,
    #[cfg(unix)]
    signals: Option<signal_hook_mio::v0_8::Signals>,
}

impl Server {
    /// Load the snapshot and bind the listener
    ///
    /// Both steps are fatal on failure: nothing is served unless the
    /// snapshot file exists and the port could be bound.
    pub fn bind(config: &Config) -> Result<Self> {
        let snapshot = Snapshot::new(&config.snapshot);
        let store = snapshot.load()?;

        let addr = config.addr()?;
        let mut listener = bind_listener(addr, config.backlog)?;

        let poll = Poll::new().context("failed to create poller")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let shutdown = Shutdown::new(poll.registry(), WAKER)?;

        info!("ready: waiting at {}", listener.local_addr()?);

        Ok(Self {
            poll,
            listener,
            conns: Connections::new(config.max_line),
            dispatcher: Dispatcher::new(store),
            snapshot,
            shutdown,
            resume: Vec::new(),
            #[cfg(unix)]
            signals: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// A handle that stops `run` from any thread
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Route SIGINT, SIGQUIT and SIGTERM into the event loop
    ///
    /// The signals arrive as poll events and trigger the shutdown handle.
    #[cfg(unix)]
    pub fn install_signal_handlers(&mut self) -> Result<()> {
        use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};

        let mut signals = signal_hook_mio::v0_8::Signals::new([SIGINT, SIGQUIT, SIGTERM])
            .context("failed to install signal handlers")?;
        self.poll
            .registry()
            .register(&mut signals, SIGNALS, Interest::READABLE)?;
        self.signals = Some(signals);
        Ok(())
    }

    /// Serve until shutdown is requested, then save and close everything
    ///
    /// Only a failing `poll` or a failing snapshot save is returned as an
    /// error; connection-level failures just drop that connection.
    pub fn run(mut self) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAP);

        let outcome = loop {
            // Untimed wait, unless a client still has input queued from last pass
            let timeout = if self.resume.is_empty() {
                None
            } else {
                Some(Duration::ZERO)
            };
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == ErrorKind::Interrupted {
                    if self.shutdown.is_triggered() {
                        break Ok(());
                    }
                    continue;
                }
                break Err(Error::new(e).context("readiness wait failed"));
            }

            if self.shutdown.is_triggered() {
                break Ok(());
            }

            for ev in events.iter() {
                match ev.token() {
                    LISTENER => self.accept(),
                    WAKER => {}
                    #[cfg(unix)]
                    SIGNALS => self.drain_signals(),
                    tok => self.handle_client(tok, ev.is_readable(), ev.is_writable()),
                }
            }

            for tok in std::mem::take(&mut self.resume) {
                if let Some(conn) = self.conns.get_mut(tok) {
                    conn.queued = false;
                    self.handle_client(tok, false, false);
                }
            }
        };

        info!("shutting down database...");
        let saved = self.snapshot.save(self.dispatcher.store());
        if let Err(e) = &saved {
            error!("{}", e);
        }
        self.conns.close_all(self.poll.registry());

        outcome?;
        saved?;
        Ok(())
    }

    /// Accept every pending connection
    ///
    /// mio readiness is edge-triggered, so the listener is drained until it
    /// would block; a connection left in the queue would get no new event.
    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((sock, peer)) => {
                    sock.set_nodelay(true).ok();
                    match self.conns.insert(self.poll.registry(), sock, peer) {
                        Ok(tok) => info!("new client connected: {} ({})", tok.0, peer),
                        Err(e) => warn!("failed to register client {}: {}", peer, e),
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    #[cfg(unix)]
    fn drain_signals(&mut self) {
        let mut received = false;
        if let Some(signals) = self.signals.as_mut() {
            for sig in signals.pending() {
                info!("signal {} received, stopping server", sig);
                received = true;
            }
        }
        if received {
            if let Err(e) = self.shutdown.trigger() {
                warn!("failed to wake event loop: {}", e);
            }
        }
    }

    fn handle_client(&mut self, tok: Token, readable: bool, writable: bool) {
        let conn = match self.conns.get_mut(tok) {
            Some(c) => c,
            None => return,
        };

        let mut closed = false;

        // Drain output first so a client paused on a full `wbuf` can resume
        if writable && !conn.wbuf.is_empty() {
            if let Err(e) = flush(conn) {
                warn!("client {} write error: {}", tok.0, e);
                closed = true;
            }
        }

        if !closed && (readable || conn.backlogged) {
            closed = matches!(
                read_and_dispatch(&mut self.dispatcher, conn, tok),
                ReadStatus::Closed
            );
        }

        // Replies to lines that arrived just before a close still go out
        if !conn.wbuf.is_empty() {
            if let Err(e) = flush(conn) {
                warn!("client {} write error: {}", tok.0, e);
                closed = true;
            }
        }

        if closed {
            self.conns.remove(self.poll.registry(), tok);
            info!("client {} disconnected", tok.0);
            return;
        }

        // A client over the output limit waits for a writable event instead
        if conn.backlogged && !conn.queued && conn.wbuf.len() < WBUF_LIMIT {
            conn.queued = true;
            self.resume.push(tok);
        }

        let interest = if conn.wbuf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if let Err(e) = self.poll.registry().reregister(&mut conn.sock, tok, interest) {
            warn!("client {} reregister failed: {}", tok.0, e);
            self.conns.remove(self.poll.registry(), tok);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ReadStatus {
    /// The socket reported `WouldBlock`
    Drained,
    /// Stopped early: read budget spent or too much unflushed output
    Backlogged,
    /// Peer closed or the read failed
    Closed,
}

/// Read and dispatch complete lines for one bounded pass
///
/// At most `MAX_READS_PER_PASS` reads are made, and none while `wbuf`
/// holds `WBUF_LIMIT` bytes or more, so one busy client cannot keep the
/// loop from serving the others.
fn read_and_dispatch(dispatcher: &mut Dispatcher, conn: &mut Connection, tok: Token) -> ReadStatus {
    let mut tmp = [0u8; READ_BUF];
    let mut reads = 0;
    loop {
        if reads == MAX_READS_PER_PASS || conn.wbuf.len() >= WBUF_LIMIT {
            conn.backlogged = true;
            return ReadStatus::Backlogged;
        }
        match conn.sock.read(&mut tmp) {
            Ok(0) => return ReadStatus::Closed,
            Ok(n) => {
                reads += 1;
                conn.rbuf.extend(&tmp[..n]);
                while let Some(line) = conn.rbuf.next_line() {
                    match line {
                        Line::Complete(line) => {
                            debug!(
                                "received from {}: {}",
                                conn.peer,
                                String::from_utf8_lossy(&line).trim_end()
                            );
                            if let Some(req) = Request::parse(&line) {
                                dispatcher.exec_into(req, &mut conn.wbuf);
                            }
                        }
                        Line::TooLong => {
                            warn!("client {} sent an over-long line, discarding", tok.0);
                            Reply::Invalid.encode(&mut conn.wbuf);
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                conn.backlogged = false;
                return ReadStatus::Drained;
            }
            Err(e) => {
                warn!("client {} read error: {}", tok.0, e);
                return ReadStatus::Closed;
            }
        }
    }
}

/// Write as much of the pending output as the socket takes
fn flush(conn: &mut Connection) -> std::io::Result<()> {
    while !conn.wbuf.is_empty() {
        match conn.sock.write(&conn.wbuf) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => conn.wbuf.advance(n),
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
