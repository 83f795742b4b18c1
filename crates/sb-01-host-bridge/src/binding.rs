//! Host-side channel binding.
//!
//! One receive loop per bound transport. The loop owns a `JoinSet` of
//! dispatch tasks, so aborting the loop aborts every in-flight dispatch and
//! none of them answers.

use crate::dispatch::Dispatcher;
use crate::domain::HostMetrics;
use futures::future::join_all;
use shared_channel::{AllowedOrigin, Frame, Transport, TransportError};
use shared_protocol::{
    BindingId, BridgeError, CallEnvelope, CallId, DecodeError, Message, ResultEnvelope,
};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// A bound transport as seen by the host.
pub struct HostBinding {
    pub id: BindingId,
    pub allowed_origin: AllowedOrigin,
    task: JoinHandle<()>,
}

impl HostBinding {
    pub(crate) fn spawn(
        transport: Arc<dyn Transport>,
        allowed_origin: AllowedOrigin,
        dispatcher: Dispatcher,
        metrics: Arc<HostMetrics>,
        max_batch_size: usize,
    ) -> Self {
        let id = BindingId::new();
        let receive_loop = ReceiveLoop {
            binding_id: id,
            transport,
            allowed_origin: allowed_origin.clone(),
            dispatcher,
            metrics,
            max_batch_size,
        };
        let task = tokio::spawn(receive_loop.run());
        Self {
            id,
            allowed_origin,
            task,
        }
    }

    /// Whether the receive loop has ended (transport closed or aborted).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn abort(&self) {
        self.task.abort();
    }
}

struct ReceiveLoop {
    binding_id: BindingId,
    transport: Arc<dyn Transport>,
    allowed_origin: AllowedOrigin,
    dispatcher: Dispatcher,
    metrics: Arc<HostMetrics>,
    max_batch_size: usize,
}

impl ReceiveLoop {
    async fn run(self) {
        info!(binding_id = %self.binding_id, origin = %self.allowed_origin, "Host binding started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok(frame) => self.handle_frame(frame, &mut in_flight),
                    Err(TransportError::Closed) => break,
                    Err(e) => warn!(binding_id = %self.binding_id, error = %e, "Receive failed"),
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            warn!(binding_id = %self.binding_id, "Dispatch task panicked");
                        }
                    }
                }
            }
        }

        in_flight.abort_all();
        info!(binding_id = %self.binding_id, "Host binding closed");
    }

    fn handle_frame(&self, frame: Frame, in_flight: &mut JoinSet<()>) {
        if !self.allowed_origin.matches(&frame.origin) {
            debug!(
                binding_id = %self.binding_id,
                origin = %frame.origin,
                expected = %self.allowed_origin,
                "Dropping frame from unexpected origin"
            );
            self.metrics.record_origin_rejected();
            return;
        }

        match Message::decode(&frame.payload) {
            Ok(Message::Call(call)) => {
                let dispatcher = self.dispatcher.clone();
                let transport = Arc::clone(&self.transport);
                let binding_id = self.binding_id;
                in_flight.spawn(async move {
                    let result = dispatcher.dispatch(call).await;
                    reply(transport.as_ref(), binding_id, Message::Result(result)).await;
                });
            }
            Ok(Message::Batch { id, messages }) => {
                self.metrics.record_batch();
                let calls: Vec<CallEnvelope> = messages
                    .into_iter()
                    .filter_map(|m| match m {
                        Message::Call(call) => Some(call),
                        _ => None,
                    })
                    .collect();
                if calls.is_empty() {
                    debug!(binding_id = %self.binding_id, batch_id = %id, "Ignoring batch of results");
                    return;
                }
                self.spawn_batch(id, calls, in_flight);
            }
            Ok(Message::Result(result)) => {
                debug!(binding_id = %self.binding_id, call_id = %result.id, "Ignoring result frame on host");
            }
            Err(DecodeError { ids, error }) => {
                warn!(binding_id = %self.binding_id, error = %error, answered = ids.len(), "Malformed frame");
                self.metrics.record_malformed();
                if ids.is_empty() {
                    return;
                }
                let transport = Arc::clone(&self.transport);
                let binding_id = self.binding_id;
                in_flight.spawn(async move {
                    for id in ids {
                        let failure = ResultEnvelope::failure(id, error.clone());
                        reply(transport.as_ref(), binding_id, Message::Result(failure)).await;
                    }
                });
            }
        }
    }

    fn spawn_batch(&self, batch_id: CallId, calls: Vec<CallEnvelope>, in_flight: &mut JoinSet<()>) {
        let transport = Arc::clone(&self.transport);
        let binding_id = self.binding_id;

        if calls.len() > self.max_batch_size {
            warn!(
                binding_id = %binding_id,
                batch_id = %batch_id,
                size = calls.len(),
                limit = self.max_batch_size,
                "Rejecting oversized batch"
            );
            self.metrics.record_malformed();
            let error = BridgeError::malformed(format!(
                "batch of {} exceeds limit {}",
                calls.len(),
                self.max_batch_size
            ));
            let results = calls
                .into_iter()
                .map(|call| Message::Result(ResultEnvelope::failure(call.id, error.clone())))
                .collect();
            in_flight.spawn(async move {
                reply(transport.as_ref(), binding_id, Message::Batch { id: batch_id, messages: results }).await;
            });
            return;
        }

        let dispatcher = self.dispatcher.clone();
        in_flight.spawn(async move {
            debug!(binding_id = %binding_id, batch_id = %batch_id, size = calls.len(), "Dispatching batch");
            let results = join_all(calls.into_iter().map(|call| dispatcher.dispatch(call))).await;
            let messages = results.into_iter().map(Message::Result).collect();
            reply(transport.as_ref(), binding_id, Message::Batch { id: batch_id, messages }).await;
        });
    }
}

async fn reply(transport: &dyn Transport, binding_id: BindingId, message: Message) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(binding_id = %binding_id, error = %e, "Failed to encode reply");
            return;
        }
    };
    if let Err(e) = transport.send(payload).await {
        debug!(binding_id = %binding_id, message_id = %message.id(), error = %e, "Reply dropped");
    }
}
