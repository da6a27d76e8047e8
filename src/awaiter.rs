use crate::dto::response::{ResponseContent, ResponseKind};
use crate::error::{MtsError, MtsResult};
use crate::message::OutboundMessage;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Invoked once the message has left a connection's sender loop.
pub type SentCallback = Arc<dyn Fn() + Send + Sync>;

enum Completion {
    Typed {
        expected: ResponseKind,
        tx: oneshot::Sender<MtsResult<ResponseContent>>,
    },
    DeliveryOnly {
        tx: oneshot::Sender<MtsResult<()>>,
    },
}

impl Completion {
    fn is_closed(&self) -> bool {
        match self {
            Completion::Typed { tx, .. } => tx.is_closed(),
            Completion::DeliveryOnly { tx } => tx.is_closed(),
        }
    }

    fn fail(self, error: MtsError) {
        // A dropped receiver means the caller stopped waiting.
        match self {
            Completion::Typed { tx, .. } => {
                let _ = tx.send(Err(error));
            }
            Completion::DeliveryOnly { tx } => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// How an inbound response was absorbed by an awaiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Completed,
    AlreadyDone,
    /// The payload kind differed from the expected one; the awaiter was failed.
    Mismatch {
        expected: ResponseKind,
        actual: ResponseKind,
    },
}

/// One outstanding request.
///
/// The result slot is single-assignment: whichever of the dispatcher, the
/// resend loop or a shutdown sweep gets there first completes it and every
/// later attempt is a no-op.
pub struct Awaiter {
    correlation_id: String,
    expected: Option<ResponseKind>,
    completion: Mutex<Option<Completion>>,
    on_sent: Option<SentCallback>,
    message: OutboundMessage,
    attempts: AtomicU32,
}

impl Awaiter {
    pub fn typed(
        expected: ResponseKind,
        message: OutboundMessage,
        on_sent: Option<SentCallback>,
    ) -> (Self, oneshot::Receiver<MtsResult<ResponseContent>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::new(Completion::Typed { expected, tx }, message, on_sent),
            rx,
        )
    }

    pub fn delivery_only(
        message: OutboundMessage,
        on_sent: Option<SentCallback>,
    ) -> (Self, oneshot::Receiver<MtsResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self::new(Completion::DeliveryOnly { tx }, message, on_sent),
            rx,
        )
    }

    fn new(completion: Completion, message: OutboundMessage, on_sent: Option<SentCallback>) -> Self {
        let expected = match &completion {
            Completion::Typed { expected, .. } => Some(*expected),
            Completion::DeliveryOnly { .. } => None,
        };
        Self {
            correlation_id: message.correlation_id.clone(),
            expected,
            completion: Mutex::new(Some(completion)),
            on_sent,
            message,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The response kind a typed awaiter waits for; `None` for delivery-only awaiters.
    pub fn expected(&self) -> Option<ResponseKind> {
        self.expected
    }

    pub fn message(&self) -> &OutboundMessage {
        &self.message
    }

    /// Count one more resend and return how many have been made.
    pub fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take(&self) -> Option<Completion> {
        self.completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Completed, or abandoned by its caller.
    pub fn is_done(&self) -> bool {
        self.completion
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(true, Completion::is_closed)
    }

    /// Hand a decoded response to the waiting caller.
    pub fn deliver(&self, content: ResponseContent) -> Delivery {
        let Some(completion) = self.take() else {
            return Delivery::AlreadyDone;
        };
        match completion {
            Completion::Typed { expected, tx } => {
                let actual = content.kind();
                if actual == expected {
                    let _ = tx.send(Ok(content));
                    Delivery::Completed
                } else {
                    let _ = tx.send(Err(MtsError::InvalidResponse(format!(
                        "expected {expected} but got {actual}"
                    ))));
                    Delivery::Mismatch { expected, actual }
                }
            }
            Completion::DeliveryOnly { tx } => {
                let _ = tx.send(Ok(()));
                Delivery::Completed
            }
        }
    }

    /// Complete a delivery-only awaiter from a reply whose content is ignored.
    pub fn acknowledge(&self) -> Delivery {
        match self.take() {
            None => Delivery::AlreadyDone,
            Some(Completion::DeliveryOnly { tx }) => {
                let _ = tx.send(Ok(()));
                Delivery::Completed
            }
            Some(completion @ Completion::Typed { .. }) => {
                completion.fail(MtsError::InvalidResponse(
                    "reply acknowledged without content".to_string(),
                ));
                Delivery::Completed
            }
        }
    }

    /// Complete with `error`. Returns false if the awaiter was already done.
    pub fn fail(&self, error: MtsError) -> bool {
        match self.take() {
            Some(completion) => {
                completion.fail(error);
                true
            }
            None => false,
        }
    }

    pub fn notify_sent(&self) {
        if let Some(callback) = &self.on_sent {
            callback();
        }
    }
}

/// Correlation id to awaiter map with an in-flight counter for backpressure.
#[derive(Default)]
pub struct AwaiterTable {
    entries: DashMap<String, Arc<Awaiter>>,
    in_flight: AtomicUsize,
}

impl AwaiterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an awaiter unless `max_in_flight` requests are already outstanding.
    pub fn register(&self, awaiter: Arc<Awaiter>, max_in_flight: usize) -> MtsResult<()> {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_in_flight).then_some(n + 1)
            })
            .map_err(|_| MtsError::SendBufferFull)?;

        match self.entries.entry(awaiter.correlation_id().to_string()) {
            Entry::Occupied(_) => {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Err(MtsError::SendFailed(format!(
                    "correlation id {} is already in flight",
                    awaiter.correlation_id()
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(awaiter);
                Ok(())
            }
        }
    }

    pub fn get(&self, correlation_id: &str) -> Option<Arc<Awaiter>> {
        self.entries.get(correlation_id).map(|e| e.value().clone())
    }

    /// Remove the awaiter, failing it with `NotConnected` if still pending.
    ///
    /// Only the caller that actually removes the entry decrements the counter.
    pub fn release(&self, correlation_id: &str) -> bool {
        match self.entries.remove(correlation_id) {
            Some((_, awaiter)) => {
                awaiter.fail(MtsError::NotConnected);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Release every awaiter. Returns how many were removed.
    pub fn release_all(&self) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.release(id)).count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }
}
