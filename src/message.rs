//! Items exchanged between the protocol engine and the pooled connections.

use crate::error::MtsError;
use crate::framing::Frame;
use std::sync::Arc;

/// A framed envelope waiting in the shared outbound queue.
///
/// Frames are shared so a resend re-enqueues the same bytes without copying.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub correlation_id: String,
    pub frames: Arc<Vec<Frame>>,
}

impl OutboundMessage {
    pub fn new(correlation_id: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            frames: Arc::new(frames),
        }
    }
}

/// Events delivered by connections into the shared inbound queue.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A whole text message read from a socket.
    ReceivedContent(String),
    /// All frames of the message left the sender loop.
    Sent { correlation_id: String },
    /// Socket-level failure, attributed to a request when `correlation_id` is set.
    TransportError {
        correlation_id: Option<String>,
        error: MtsError,
    },
    /// The transport refused to carry the message.
    NotProcessed { correlation_id: String },
}

impl InboundEvent {
    pub fn transport_error(error: MtsError) -> Self {
        InboundEvent::TransportError {
            correlation_id: None,
            error,
        }
    }
}
