//! Observer-facing events and the best-effort broadcaster.
//!
//! Transports implement [`EventChannel`]; the [`EventBroadcaster`] never waits
//! on an observer and never reports a delivery failure to its caller.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{CounterKind, Counters, ErrorCode, JobId, WorkerError};

/// Identifier of a connected observer.
pub type ObserverId = u64;

/// State-change notification sent to observers as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    /// Incoming counter changed.
    #[serde(rename = "count:incoming")]
    IncomingCount {
        /// Current value.
        count: u64,
        /// Human-readable note.
        message: String,
    },
    /// Processed counter changed.
    #[serde(rename = "count:processed")]
    ProcessedCount {
        /// Current value.
        count: u64,
        /// Human-readable note.
        message: String,
        /// Job that caused the change.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    /// Failed counter changed.
    #[serde(rename = "count:failed")]
    FailedCount {
        /// Current value.
        count: u64,
        /// Human-readable note.
        message: String,
        /// Job that caused the change.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
    },
    /// A loan was accepted.
    #[serde(rename = "success")]
    Success {
        /// Queue job id.
        job_id: JobId,
        /// Loan id.
        loan_id: String,
        /// Human-readable note.
        message: String,
    },
    /// A loan was rejected.
    #[serde(rename = "error")]
    Rejected {
        /// Queue job id.
        job_id: JobId,
        /// Rejection code.
        error: ErrorCode,
        /// Human-readable note.
        message: String,
    },
}

impl Event {
    /// Counter snapshot or change event.
    #[must_use]
    pub fn count(kind: CounterKind, count: u64, job_id: Option<JobId>) -> Self {
        match kind {
            CounterKind::Incoming => Self::IncomingCount {
                count,
                message: "Incoming count updated".into(),
            },
            CounterKind::Processed => Self::ProcessedCount {
                count,
                message: "Processed count updated".into(),
                job_id,
            },
            CounterKind::Failed => Self::FailedCount {
                count,
                message: "Failed count updated".into(),
                job_id,
            },
        }
    }

    /// Acceptance event.
    #[must_use]
    pub fn success(job_id: impl Into<JobId>, loan_id: impl Into<String>) -> Self {
        Self::Success {
            job_id: job_id.into(),
            loan_id: loan_id.into(),
            message: "Loan accepted".into(),
        }
    }

    /// Rejection event.
    #[must_use]
    pub fn rejected(job_id: impl Into<JobId>, code: ErrorCode) -> Self {
        Self::Rejected {
            job_id: job_id.into(),
            error: code,
            message: code.describe().into(),
        }
    }

    /// The wire `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::IncomingCount { .. } => "count:incoming",
            Self::ProcessedCount { .. } => "count:processed",
            Self::FailedCount { .. } => "count:failed",
            Self::Success { .. } => "success",
            Self::Rejected { .. } => "error",
        }
    }
}

/// Server side of a persistent observer transport.
///
/// Registration is transport specific (socket accept, SSE subscribe, ...);
/// the broadcaster only needs to enumerate observers and push to one.
pub trait EventChannel: Send + Sync + 'static {
    /// Observers currently connected.
    fn observers(&self) -> Vec<ObserverId>;

    /// Queue `message` for one observer without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::Channel` if the observer is gone.
    fn send(&self, observer: ObserverId, message: &str) -> Result<(), WorkerError>;
}

/// Fire-and-forget event sink used by the job processor.
pub trait Broadcast: Send + Sync + 'static {
    /// Deliver `event` to whoever is listening. Never fails, never blocks.
    fn broadcast(&self, event: &Event);
}

/// Fans events out to every observer of an [`EventChannel`].
pub struct EventBroadcaster<C: EventChannel> {
    channel: Arc<C>,
    counters: Counters,
}

impl<C: EventChannel> EventBroadcaster<C> {
    /// Create a broadcaster over `channel`, reading snapshots from `counters`.
    pub const fn new(channel: Arc<C>, counters: Counters) -> Self {
        Self { channel, counters }
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Send `event` to every observer; returns how many sends were accepted.
    pub fn send_all(&self, event: &Event) -> usize {
        let message = match serde_json::to_string(event) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, kind = event.kind(), "failed to encode event");
                return 0;
            }
        };
        let mut delivered = 0;
        for observer in self.channel.observers() {
            match self.channel.send(observer, &message) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(observer, error = %e, "dropping event for observer"),
            }
        }
        delivered
    }

    /// Send the three counter snapshots to a newly connected observer.
    pub async fn greet(&self, observer: ObserverId) {
        for kind in CounterKind::ALL {
            let count = match self.counters.read(kind).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(observer, counter = kind.key(), error = %e, "counter snapshot unavailable");
                    continue;
                }
            };
            let event = Event::count(kind, count, None);
            let sent = serde_json::to_string(&event)
                .map_err(WorkerError::from)
                .and_then(|m| self.channel.send(observer, &m));
            if let Err(e) = sent {
                tracing::debug!(observer, error = %e, "observer left during greeting");
                return;
            }
        }
    }

    /// Read the incoming counter and broadcast it if it moved since
    /// `last_seen`. Returns the value read.
    ///
    /// # Errors
    ///
    /// Propagates the store error; `last_seen` is left untouched.
    pub async fn poll_incoming(&self, last_seen: u64) -> Result<u64, WorkerError> {
        let count = self.counters.read(CounterKind::Incoming).await?;
        if count != last_seen {
            self.send_all(&Event::count(CounterKind::Incoming, count, None));
        }
        Ok(count)
    }

    /// Run [`poll_incoming`](Self::poll_incoming) every `interval` until
    /// `cancel` fires.
    pub fn spawn_incoming_poller(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_seen = 0;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match this.poll_incoming(last_seen).await {
                    Ok(count) => last_seen = count,
                    Err(e) => tracing::warn!(error = %e, "incoming counter poll failed"),
                }
            }
            tracing::debug!("incoming poller stopped");
        })
    }
}

impl<C: EventChannel> Broadcast for EventBroadcaster<C> {
    fn broadcast(&self, event: &Event) {
        let delivered = self.send_all(event);
        tracing::trace!(kind = event.kind(), delivered, "event broadcast");
    }
}
