//! In-memory [`DatagramSink`] for tests.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::udp::DatagramSink;

#[derive(Default)]
pub(crate) struct CaptureSink {
    sent: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
    arrived: Condvar,
    delay: Option<Duration>,
    fail_remaining: AtomicUsize,
    gate: Option<(Mutex<bool>, Condvar)>,
}

impl CaptureSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sleep on every send, to keep packets in flight longer.
    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Fail the first `n` sends with an I/O error.
    pub(crate) fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_remaining: AtomicUsize::new(n),
            ..Self::default()
        })
    }

    /// Block every send until [`open`](Self::open) is called.
    pub(crate) fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some((Mutex::new(false), Condvar::new())),
            ..Self::default()
        })
    }

    pub(crate) fn open(&self) {
        if let Some((open, cond)) = &self.gate {
            *open.lock() = true;
            cond.notify_all();
        }
    }

    pub(crate) fn all(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Wait until `count` datagrams reached `port` (or the timeout passes)
    /// and return those datagrams.
    pub(crate) fn wait_for_port(&self, port: u16, count: usize, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut sent = self.sent.lock();
        loop {
            let matching: Vec<Vec<u8>> = sent
                .iter()
                .filter(|(addr, _)| addr.port() == port)
                .map(|(_, data)| data.clone())
                .collect();
            if matching.len() >= count || Instant::now() >= deadline {
                return matching;
            }
            self.arrived.wait_until(&mut sent, deadline);
        }
    }
}

impl DatagramSink for CaptureSink {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
        if let Some((open, cond)) = &self.gate {
            let mut open = open.lock();
            while !*open {
                cond.wait(&mut open);
            }
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let failing = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(io::Error::other("injected send failure"));
        }

        self.sent.lock().push((addr, payload.to_vec()));
        self.arrived.notify_all();
        Ok(payload.len())
    }
}
