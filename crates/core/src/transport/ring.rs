//! Bounded FIFO of pre-allocated RTP packets with a background sender.
//!
//! The packetizer (producer) and the sender thread (consumer) hand slots
//! back and forth through two counting semaphores:
//!
//! ```text
//!   producer                         sender thread
//!   --------                         -------------
//!   free.acquire()     ──slot──▶     filled.acquire(idle_timeout)
//!   write header + payload           RTCP report if due
//!   commit: filled.release()         send slot to RTP port
//!                      ◀──slot──     free.release()
//! ```
//!
//! A slot is owned by exactly one side at a time: the producer between
//! `acquire_slot` and `commit`, the sender between its wake-up and the
//! `free` release. When all slots are in flight the producer blocks
//! (backpressure); when none are committed the sender blocks, and after
//! `idle_timeout` without traffic it exits and resets the ring. The next
//! commit starts a fresh sender.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::semaphore::{Acquire, Semaphore};
use super::udp::DatagramSink;
use crate::error::{Result, RtspError};
use crate::media::rtcp::{DEFAULT_REPORT_INTERVAL, RtcpReporter};
use crate::media::rtp::{self, HEADER_LEN};

pub const DEFAULT_RING_CAPACITY: usize = 300;
pub const DEFAULT_SLOT_SIZE: usize = 1300;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(4);

/// Sizing and timing of a [`PacketRing`].
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Number of slots.
    pub capacity: usize,
    /// Bytes per slot, i.e. the largest datagram (network MTU).
    pub slot_size: usize,
    pub payload_type: u8,
    pub ssrc: u32,
    /// How long the sender waits for a packet before shutting itself down.
    pub idle_timeout: Duration,
    /// Minimum time between RTCP Sender Reports; zero disables them.
    pub report_interval: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RING_CAPACITY,
            slot_size: DEFAULT_SLOT_SIZE,
            payload_type: 96,
            ssrc: rtp::random_ssrc(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

/// RTP and RTCP addresses of the media server (from SETUP `server_port`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub rtp: SocketAddr,
    pub rtcp: SocketAddr,
}

#[derive(Debug)]
struct RtpSlot {
    buf: Box<[u8]>,
    len: usize,
    rtp_timestamp: u32,
}

#[derive(Debug, Default)]
struct Fifo {
    producer: usize,
    consumer: usize,
    /// Bumped on every reset so stale commits and sends are discarded.
    generation: u64,
}

#[derive(Debug, Default)]
struct SenderState {
    handle: Option<JoinHandle<()>>,
    active: bool,
}

/// A slot handed to the producer by [`PacketRing::acquire_slot`].
///
/// Must be passed to [`PacketRing::commit`] exactly once; dropping it
/// without committing leaks the slot until the next ring reset.
pub struct SlotGuard<'a> {
    index: usize,
    generation: u64,
    slot: MutexGuard<'a, RtpSlot>,
}

impl SlotGuard<'_> {
    /// Stamp marker, timestamp and sequence number into the RTP header.
    pub fn write_header(&mut self, marker: bool, rtp_timestamp: u32, sequence: u16) {
        rtp::write_fields(&mut self.slot.buf, marker, sequence, rtp_timestamp);
        self.slot.rtp_timestamp = rtp_timestamp;
    }

    /// Bytes after the RTP header.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.slot.buf[HEADER_LEN..]
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Fixed-capacity ring of outgoing RTP packets.
pub struct PacketRing {
    slots: Box<[Mutex<RtpSlot>]>,
    free: Semaphore,
    filled: Semaphore,
    fifo: Mutex<Fifo>,
    running: AtomicBool,
    sender: Mutex<SenderState>,
    destination: RwLock<Option<Destination>>,
    reporter: Mutex<RtcpReporter>,
    sink: Arc<dyn DatagramSink>,
    config: RingConfig,
}

impl PacketRing {
    /// Allocate every slot up front with the stream's header template.
    pub fn new(config: RingConfig, sink: Arc<dyn DatagramSink>) -> Arc<Self> {
        let capacity = config.capacity.max(1);
        let slot_size = config.slot_size.max(HEADER_LEN + 3);
        let config = RingConfig {
            capacity,
            slot_size,
            ..config
        };

        let slots = (0..capacity)
            .map(|_| {
                let mut buf = vec![0u8; slot_size].into_boxed_slice();
                rtp::write_template(&mut buf, config.payload_type, config.ssrc);
                Mutex::new(RtpSlot {
                    buf,
                    len: 0,
                    rtp_timestamp: 0,
                })
            })
            .collect();

        tracing::debug!(
            capacity,
            slot_size,
            ssrc = format_args!("{:#010X}", config.ssrc),
            "packet ring allocated"
        );

        Arc::new(Self {
            slots,
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
            fifo: Mutex::new(Fifo::default()),
            running: AtomicBool::new(true),
            sender: Mutex::new(SenderState::default()),
            destination: RwLock::new(None),
            reporter: Mutex::new(RtcpReporter::new(config.ssrc, config.report_interval)),
            sink,
            config,
        })
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Largest payload that fits a slot after the RTP header.
    pub fn slot_payload_capacity(&self) -> usize {
        self.config.slot_size - HEADER_LEN
    }

    pub fn ssrc(&self) -> u32 {
        self.reporter.lock().ssrc()
    }

    /// Committed packets not yet picked up by the sender.
    pub fn pending(&self) -> usize {
        self.filled.available()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a sender thread is currently alive.
    pub fn is_sending(&self) -> bool {
        self.sender.lock().active
    }

    pub fn destination(&self) -> Option<Destination> {
        *self.destination.read()
    }

    /// Resolve `host` and point RTP at `rtp_port`, RTCP at `rtcp_port`.
    pub fn set_destination(&self, host: &str, rtp_port: u16, rtcp_port: u16) -> Result<()> {
        let resolve = |port: u16| -> Result<SocketAddr> {
            (host, port)
                .to_socket_addrs()?
                .next()
                .ok_or(RtspError::NoDestination)
        };
        let destination = Destination {
            rtp: resolve(rtp_port)?,
            rtcp: resolve(rtcp_port)?,
        };
        tracing::debug!(rtp = %destination.rtp, rtcp = %destination.rtcp, "RTP destination set");
        *self.destination.write() = Some(destination);
        Ok(())
    }

    /// Rewrite the SSRC of every slot and restart RTCP accounting.
    pub fn set_ssrc(&self, ssrc: u32) {
        for slot in self.slots.iter() {
            rtp::write_ssrc(&mut slot.lock().buf, ssrc);
        }
        self.reporter.lock().set_ssrc(ssrc);
    }

    /// Block until a slot is free and hand it to the producer with the
    /// marker bit cleared.
    ///
    /// Returns [`RtspError::RingClosed`] if the ring is reset with
    /// `resume = false` while waiting; treat that as cancellation.
    pub fn acquire_slot(&self) -> Result<SlotGuard<'_>> {
        loop {
            if !self.is_running() {
                return Err(RtspError::RingClosed);
            }
            match self.free.acquire_timeout(self.config.idle_timeout) {
                Acquire::Acquired => break,
                Acquire::TimedOut => {
                    tracing::debug!(capacity = self.capacity(), "packet ring full, producer waiting");
                }
                Acquire::Reset => {}
            }
        }

        let (index, generation) = {
            let fifo = self.fifo.lock();
            (fifo.producer, fifo.generation)
        };
        let mut slot = self.slots[index].lock();
        rtp::set_marker(&mut slot.buf, false);

        Ok(SlotGuard {
            index,
            generation,
            slot,
        })
    }

    /// Queue a filled slot for sending; `wire_len` counts header plus payload.
    ///
    /// Starts the sender thread if none is running.
    pub fn commit(self: &Arc<Self>, slot: SlotGuard<'_>, wire_len: usize) {
        let SlotGuard {
            index,
            generation,
            mut slot,
        } = slot;
        slot.len = wire_len.clamp(HEADER_LEN, self.config.slot_size);
        drop(slot);

        {
            let mut fifo = self.fifo.lock();
            if fifo.generation != generation {
                tracing::trace!(index, "ring reset while slot was filled, packet dropped");
                return;
            }
            fifo.producer = (index + 1) % self.capacity();
            self.filled.release();
        }

        self.ensure_sender();
    }

    /// Drop everything queued and start over from slot 0.
    ///
    /// With `resume = false` the ring stops running: a producer blocked in
    /// [`acquire_slot`](Self::acquire_slot) gets [`RtspError::RingClosed`]
    /// and the sender exits on its next wake-up.
    pub fn reset(&self, resume: bool) {
        self.running.store(resume, Ordering::SeqCst);
        let dropped = self.filled.drain();
        self.free.drain();
        self.reset_fifo();
        tracing::debug!(resume, dropped, "packet ring reset");
    }

    /// Stop the ring and wait for the sender thread to finish.
    pub fn close(&self) {
        self.reset(false);
        let handle = self.sender.lock().handle.take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!("RTP sender thread panicked");
        }
    }

    fn reset_fifo(&self) {
        let mut fifo = self.fifo.lock();
        fifo.producer = 0;
        fifo.consumer = 0;
        fifo.generation = fifo.generation.wrapping_add(1);
        self.free.reset(self.capacity());
        self.filled.reset(0);
    }

    fn ensure_sender(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }
        let mut sender = self.sender.lock();
        if sender.active {
            return;
        }
        // A previous sender that went idle has already released the lock
        // for the last time, so this join returns promptly.
        if let Some(previous) = sender.handle.take() {
            let _ = previous.join();
        }

        let ring = Arc::clone(self);
        match thread::Builder::new()
            .name("rtp-sender".into())
            .spawn(move || ring.run_sender())
        {
            Ok(handle) => {
                sender.active = true;
                sender.handle = Some(handle);
            }
            Err(e) => tracing::error!(error = %e, "failed to spawn RTP sender"),
        }
    }

    fn run_sender(&self) {
        tracing::debug!("RTP sender started");
        while self.is_running() {
            let ready = match self.filled.acquire_timeout(self.config.idle_timeout) {
                Acquire::Acquired => true,
                Acquire::Reset => false,
                Acquire::TimedOut => {
                    let mut sender = self.sender.lock();
                    if self.filled.try_acquire() {
                        true
                    } else {
                        sender.active = false;
                        self.reset_fifo();
                        self.reporter.lock().reset();
                        tracing::debug!(
                            idle = ?self.config.idle_timeout,
                            "no traffic, RTP sender stopping"
                        );
                        return;
                    }
                }
            };

            if !self.is_running() {
                break;
            }
            if ready {
                self.send_next();
            }
        }

        self.sender.lock().active = false;
        tracing::debug!("RTP sender stopped");
    }

    fn send_next(&self) {
        let (index, generation) = {
            let fifo = self.fifo.lock();
            (fifo.consumer, fifo.generation)
        };

        {
            let slot = self.slots[index].lock();
            let packet = &slot.buf[..slot.len];
            match self.destination() {
                Some(destination) => {
                    let report = self
                        .reporter
                        .lock()
                        .on_packet_sent(packet.len(), slot.rtp_timestamp);
                    if let Some(report) = report {
                        self.transmit(&report.to_bytes(), destination.rtcp);
                    }
                    if self.transmit(packet, destination.rtp) {
                        tracing::trace!(
                            seq = rtp::sequence(packet),
                            len = packet.len(),
                            marker = rtp::marker(packet),
                            "RTP packet sent"
                        );
                    }
                }
                None => tracing::warn!(index, "no RTP destination, packet dropped"),
            }
        }

        let mut fifo = self.fifo.lock();
        if fifo.generation == generation {
            fifo.consumer = (index + 1) % self.capacity();
            self.free.release();
        }
    }

    /// Best-effort UDP send; failures are logged and the stream goes on.
    fn transmit(&self, payload: &[u8], addr: SocketAddr) -> bool {
        match self.sink.send_to(payload, addr) {
            Ok(_) => true,
            Err(source) => {
                let err = RtspError::SendFailure { addr, source };
                tracing::warn!(error = %err, "datagram dropped");
                false
            }
        }
    }
}
