//! Response listener: settles pending calls from inbound frames.

use crate::domain::PendingCallTable;
use shared_channel::{AllowedOrigin, Frame, Transport, TransportError};
use shared_protocol::{BridgeError, DecodeError, Message};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct ResponseListener {
    pending: Arc<PendingCallTable>,
    transport: Arc<dyn Transport>,
    host_origin: AllowedOrigin,
}

impl ResponseListener {
    pub fn new(
        pending: Arc<PendingCallTable>,
        transport: Arc<dyn Transport>,
        host_origin: AllowedOrigin,
    ) -> Self {
        Self {
            pending,
            transport,
            host_origin,
        }
    }

    /// Run until the transport closes. Calls still outstanding at that point
    /// fail with `transport-closed`.
    pub async fn run(self) {
        loop {
            match self.transport.recv().await {
                Ok(frame) => self.handle_frame(frame),
                Err(TransportError::Closed) => {
                    warn!("Transport closed, stopping response listener");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Error receiving frame");
                }
            }
        }

        let failed = self
            .pending
            .fail_all(&BridgeError::transport_closed("channel closed"));
        if failed > 0 {
            debug!(failed, "Failed calls outstanding at transport close");
        }
    }

    pub fn handle_frame(&self, frame: Frame) {
        if !self.host_origin.matches(&frame.origin) {
            debug!(
                origin = %frame.origin,
                expected = %self.host_origin,
                "Dropping frame from unexpected origin"
            );
            return;
        }

        match Message::decode(&frame.payload) {
            Ok(Message::Result(result)) => {
                self.pending.resolve(result);
            }
            Ok(Message::Batch { id, messages }) => {
                debug!(batch_id = %id, size = messages.len(), "Received result batch");
                for message in messages {
                    match message {
                        Message::Result(result) => {
                            self.pending.resolve(result);
                        }
                        other => {
                            warn!(message_id = %other.id(), "Ignoring call inside batch sent to sandbox");
                        }
                    }
                }
            }
            Ok(Message::Call(call)) => {
                warn!(
                    call_id = %call.id,
                    namespace = %call.namespace,
                    procedure = %call.procedure,
                    "Sandbox does not serve calls; dropping"
                );
            }
            Err(DecodeError { ids, error }) => {
                warn!(error = %error, ids = ids.len(), "Malformed frame from host");
                for id in &ids {
                    self.pending.fail(id, error.clone());
                }
            }
        }
    }
}
