//! Encoder-facing entry point that negotiates in the background and
//! routes access units to the active packetizer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use crate::config::PublisherConfig;
use crate::error::{Result, RtspError};
use crate::media::h264::SharedPacketizer;
use crate::media::{AccessUnit, ParameterSets};
use crate::session::RtspSession;

/// Session-level notifications delivered through [`Publisher::events`].
#[derive(Debug)]
pub enum SessionEvent {
    /// RECORD accepted; access units are now sent.
    Connected,
    /// The session was stopped locally.
    Disconnected,
    /// Negotiation failed; the publisher is idle again.
    Failed(RtspError),
}

/// Owns one publishing session and connects it to the encoder.
///
/// The encoder side calls [`on_parameter_sets`](Self::on_parameter_sets)
/// when SPS/PPS are known (this starts negotiation on a worker thread) and
/// [`on_access_unit`](Self::on_access_unit) for every encoded NAL unit.
/// Units arriving before the session is streaming are dropped.
///
/// ```no_run
/// use rtsp_push::{AccessUnit, ParameterSets, Publisher, PublisherConfig, SessionEvent};
///
/// let publisher = Publisher::new(PublisherConfig::new("rtsp://127.0.0.1:1935/live/cam"))?;
/// let events = publisher.events().unwrap();
///
/// publisher.on_parameter_sets(ParameterSets::new(&[0x67, 0x42, 0x00, 0x1e], &[0x68, 0xce]));
/// if let Ok(SessionEvent::Connected) = events.recv() {
///     publisher.on_access_unit(&AccessUnit::from_nal(&[0x65, 0x88, 0x84], 0));
/// }
/// publisher.stop();
/// # Ok::<(), rtsp_push::RtspError>(())
/// ```
pub struct Publisher {
    session: Arc<Mutex<RtspSession>>,
    packetizer: Arc<RwLock<Option<SharedPacketizer>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    connecting: Arc<AtomicBool>,
    events_tx: Sender<SessionEvent>,
    events_rx: Mutex<Option<Receiver<SessionEvent>>>,
}

impl Publisher {
    /// Validate the configuration. Nothing is opened until parameter sets arrive.
    pub fn new(config: PublisherConfig) -> Result<Self> {
        let session = RtspSession::new(config)?;
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            packetizer: Arc::new(RwLock::new(None)),
            worker: Mutex::new(None),
            connecting: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Take the event receiver. Only the first call returns it.
    pub fn events(&self) -> Option<Receiver<SessionEvent>> {
        self.events_rx.lock().take()
    }

    pub fn is_streaming(&self) -> bool {
        self.packetizer.read().is_some()
    }

    /// New SPS/PPS from the encoder.
    ///
    /// While idle this starts negotiation in the background; while
    /// streaming it replaces the STAP-A sent ahead of IDR frames.
    pub fn on_parameter_sets(&self, parameter_sets: ParameterSets) {
        let active = self.packetizer.read().clone();
        if let Some(packetizer) = active {
            packetizer.lock().set_parameter_sets(&parameter_sets);
            return;
        }
        if self.connecting.swap(true, Ordering::SeqCst) {
            tracing::debug!("negotiation already in progress, parameter sets ignored");
            return;
        }

        let mut worker = self.worker.lock();
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }

        let session = Arc::clone(&self.session);
        let slot = Arc::clone(&self.packetizer);
        let connecting = Arc::clone(&self.connecting);
        let events = self.events_tx.clone();
        let spawned = thread::Builder::new()
            .name("rtsp-negotiation".into())
            .spawn(move || {
                let result = session.lock().connect(&parameter_sets);
                let event = match result {
                    Ok(packetizer) => {
                        *slot.write() = Some(packetizer);
                        SessionEvent::Connected
                    }
                    Err(e) => SessionEvent::Failed(e),
                };
                connecting.store(false, Ordering::SeqCst);
                let _ = events.send(event);
            });

        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                self.connecting.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "failed to spawn negotiation thread");
                let _ = self.events_tx.send(SessionEvent::Failed(RtspError::Io(e)));
            }
        }
    }

    /// Hand one encoded unit to the active session, if any.
    pub fn on_access_unit(&self, au: &AccessUnit) {
        let Some(packetizer) = self.packetizer.read().clone() else {
            tracing::trace!(pts_us = au.pts_us, "not streaming, access unit dropped");
            return;
        };
        if let Err(e) = packetizer.lock().submit(au) {
            tracing::warn!(error = %e, pts_us = au.pts_us, "access unit dropped");
        }
    }

    /// Wait for any negotiation in flight, then tear the session down.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            tracing::warn!("negotiation thread panicked");
        }

        let was_streaming = self.packetizer.write().take().is_some();
        self.session.lock().disconnect();
        if was_streaming {
            let _ = self.events_tx.send(SessionEvent::Disconnected);
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop();
    }
}
