/*!
 * Shutdown Coordination
 *
 * A cloneable cancellation handle tied to one event loop. Triggering it
 * sets a flag and wakes the loop's poller through a registered
 * `mio::Waker`, so an untimed `poll` returns promptly from any thread.
 */

use mio::{Registry, Token, Waker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Shutdown {
    /// Create a handle whose waker fires `token` on `registry`
    pub fn new(registry: &Registry, token: Token) -> std::io::Result<Self> {
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Waker::new(registry, token)?),
        })
    }

    /// Request shutdown
    ///
    /// Only the first call wakes the poller; later calls are no-ops.
    pub fn trigger(&self) -> std::io::Result<()> {
        if self.flag.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.waker.wake()
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::time::Duration;

    const WAKE: Token = Token(7);

    #[test]
    fn trigger_wakes_poll_once() {
        let mut poll = Poll::new().unwrap();
        let mut events = Events::with_capacity(4);
        let shutdown = Shutdown::new(poll.registry(), WAKE).unwrap();
        assert!(!shutdown.is_triggered());

        let remote = shutdown.clone();
        let t = std::thread::spawn(move || remote.trigger().unwrap());

        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        t.join().unwrap();
        assert!(events.iter().any(|e| e.token() == WAKE));
        assert!(shutdown.is_triggered());

        shutdown.trigger().unwrap();
        assert!(shutdown.is_triggered());
    }
}
