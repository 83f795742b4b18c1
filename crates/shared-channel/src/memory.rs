//! In-memory duplex transport.
//!
//! Each endpoint owns the sending half towards its peer and the receiving half
//! of its own inbox. Frames are stamped with the sending endpoint's origin.

use crate::{Frame, Transport, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// One end of an in-process channel pair.
pub struct MemoryTransport {
    origin: String,
    outbound: mpsc::Sender<Frame>,
    inbound: Mutex<mpsc::Receiver<Frame>>,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl MemoryTransport {
    /// Frames this endpoint has handed to its peer.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames this endpoint has taken from its inbox.
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, payload: String) -> Result<(), TransportError> {
        trace!(origin = %self.origin, bytes = payload.len(), "Sending frame");
        self.outbound
            .send(Frame {
                origin: self.origin.clone(),
                payload,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> Result<Frame, TransportError> {
        let mut inbox = self.inbound.lock().await;
        let frame = inbox.recv().await.ok_or(TransportError::Closed)?;
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        Ok(frame)
    }

    fn local_origin(&self) -> &str {
        &self.origin
    }
}

/// Create a connected pair. `a_origin` is stamped on frames sent by the first
/// endpoint, `b_origin` on frames sent by the second.
pub fn duplex(
    a_origin: impl Into<String>,
    b_origin: impl Into<String>,
    capacity: usize,
) -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel(capacity);
    let (b_tx, a_rx) = mpsc::channel(capacity);
    let a = MemoryTransport {
        origin: a_origin.into(),
        outbound: a_tx,
        inbound: Mutex::new(a_rx),
        frames_sent: AtomicU64::new(0),
        frames_received: AtomicU64::new(0),
    };
    let b = MemoryTransport {
        origin: b_origin.into(),
        outbound: b_tx,
        inbound: Mutex::new(b_rx),
        frames_sent: AtomicU64::new(0),
        frames_received: AtomicU64::new(0),
    };
    (a, b)
}
