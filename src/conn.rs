/*!
 * Connection Registry
 *
 * Tracks every open client socket. A connection's slab key doubles as its
 * poll token, and entries only enter or leave through `insert`/`remove`,
 * which register and deregister with the poller in the same step.
 */

use crate::protocol::LineBuffer;
use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use slab::Slab;
use std::net::SocketAddr;

/// Per-client state: socket, partial input, unflushed output
#[derive(Debug)]
pub struct Connection {
    pub sock: TcpStream,
    pub peer: SocketAddr,
    pub rbuf: LineBuffer,
    pub wbuf: BytesMut,
    /// The socket may still hold unread input: the last read pass stopped
    /// before `WouldBlock`, so no new readable edge will announce it
    pub backlogged: bool,
    /// Already on the event loop's resume list
    pub queued: bool,
}

#[derive(Debug)]
pub struct Connections {
    slab: Slab<Connection>,
    max_line: usize,
}

impl Connections {
    /// `max_line` bounds each client's unterminated input line
    pub fn new(max_line: usize) -> Self {
        Self {
            slab: Slab::new(),
            max_line,
        }
    }

    /// Register `sock` for read readiness and start tracking it
    pub fn insert(
        &mut self,
        registry: &Registry,
        mut sock: TcpStream,
        peer: SocketAddr,
    ) -> std::io::Result<Token> {
        let entry = self.slab.vacant_entry();
        let token = Token(entry.key());
        registry.register(&mut sock, token, Interest::READABLE)?;
        entry.insert(Connection {
            sock,
            peer,
            rbuf: LineBuffer::new(self.max_line),
            wbuf: BytesMut::new(),
            backlogged: false,
            queued: false,
        });
        Ok(token)
    }

    /// Deregister and drop a connection, closing its socket
    pub fn remove(&mut self, registry: &Registry, token: Token) -> Option<Connection> {
        let mut conn = self.slab.try_remove(token.0)?;
        // Dropping the socket also removes it from epoll; an error here is moot
        let _ = registry.deregister(&mut conn.sock);
        Some(conn)
    }

    #[inline]
    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.slab.get_mut(token.0)
    }

    #[inline]
    pub fn contains(&self, token: Token) -> bool {
        self.slab.contains(token.0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    /// Deregister and close every connection
    pub fn close_all(&mut self, registry: &Registry) {
        for mut conn in self.slab.drain() {
            let _ = registry.deregister(&mut conn.sock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;
    use mio::Poll;

    #[test]
    fn insert_and_remove_keep_registry_in_step() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conns = Connections::new(64);
        let sock = TcpStream::connect(addr).unwrap();
        let tok = conns.insert(poll.registry(), sock, addr).unwrap();
        assert!(conns.contains(tok));
        assert_eq!(conns.len(), 1);

        assert!(conns.remove(poll.registry(), tok).is_some());
        assert!(conns.remove(poll.registry(), tok).is_none());
        assert!(conns.is_empty());
    }

    #[test]
    fn close_all_empties_registry() {
        let poll = Poll::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conns = Connections::new(64);
        for _ in 0..3 {
            let sock = TcpStream::connect(addr).unwrap();
            conns.insert(poll.registry(), sock, addr).unwrap();
        }
        assert_eq!(conns.len(), 3);

        conns.close_all(poll.registry());
        assert!(conns.is_empty());
        assert!(!conns.contains(Token(0)));
    }
}
