//! Pipeline notifications and their delivery.
//!
//! Events are queued on an unbounded channel and delivered by a single
//! dispatcher task, so listeners see them in emission order and never run
//! on the batching task.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::point::Point;
use crate::write::options::WriteOptions;
use crate::write::transport::WriteOutcome;

/// A queued record: its encoded line and, when submitted as a point, the
/// point itself.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteItem {
    line: String,
    point: Option<Point>,
}

impl WriteItem {
    pub(crate) fn new(line: String, point: Option<Point>) -> Self {
        Self { line, point }
    }

    /// Encoded line protocol record.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Source point, `None` for raw records.
    pub fn point(&self) -> Option<&Point> {
        self.point.as_ref()
    }
}

/// Event discriminant, used to register listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A batch was stored.
    WriteSuccess,
    /// Part of a batch was rejected.
    WritePartial,
    /// A batch was rejected as a whole.
    WriteError,
    /// Queued items were dropped to make room.
    BackpressureApplied,
    /// A response arrived and was classified.
    ResponseParsed,
    /// The transport failed without a classified response.
    UnhandledError,
}

/// Kind-specific payload of a [`WriteEvent`].
#[derive(Clone, Debug, PartialEq)]
pub enum EventDetail {
    /// Every item was stored.
    WriteSuccess,
    /// `items` were rejected and will be retried.
    WritePartial {
        /// Server explanation.
        reason: String,
    },
    /// The whole batch failed.
    WriteError {
        /// HTTP status, if any.
        status: Option<u16>,
        /// Server or network explanation.
        message: String,
        /// Whether the items went to the retry buffer.
        retryable: bool,
    },
    /// `items` were dropped from the front of a full queue.
    BackpressureApplied {
        /// Queue length after the submission that caused the drop.
        queued: usize,
    },
    /// Classified response for `items`.
    ResponseParsed {
        /// The classification.
        outcome: WriteOutcome,
    },
    /// The transport returned an error for `items`.
    UnhandledError {
        /// Error description.
        message: String,
    },
}

/// Notification emitted by a write pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteEvent {
    /// Items the event is about.
    pub items: Arc<[WriteItem]>,
    /// Options of the pipeline that emitted it.
    pub options: Arc<WriteOptions>,
    /// What happened.
    pub detail: EventDetail,
}

impl WriteEvent {
    /// Discriminant of `detail`.
    pub fn kind(&self) -> EventKind {
        match self.detail {
            EventDetail::WriteSuccess => EventKind::WriteSuccess,
            EventDetail::WritePartial { .. } => EventKind::WritePartial,
            EventDetail::WriteError { .. } => EventKind::WriteError,
            EventDetail::BackpressureApplied { .. } => EventKind::BackpressureApplied,
            EventDetail::ResponseParsed { .. } => EventKind::ResponseParsed,
            EventDetail::UnhandledError { .. } => EventKind::UnhandledError,
        }
    }

    /// Encoded lines of `items`.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(WriteItem::line)
    }
}

type Listener = Arc<dyn Fn(&WriteEvent) + Send + Sync>;

/// Registered listeners, each for one kind or for all.
#[derive(Default)]
pub(crate) struct Listeners {
    entries: RwLock<Vec<(Option<EventKind>, Listener)>>,
}

impl Listeners {
    pub(crate) fn add(&self, kind: Option<EventKind>, listener: Listener) {
        self.entries.write().push((kind, listener));
    }

    fn matching(&self, kind: EventKind) -> Vec<Listener> {
        self.entries
            .read()
            .iter()
            .filter(|(k, _)| k.is_none_or(|k| k == kind))
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }
}

/// Sending half of the event channel. Emission never blocks; once closed,
/// events are discarded.
pub(crate) struct EventSink {
    tx: RwLock<Option<mpsc::UnboundedSender<WriteEvent>>>,
}

impl EventSink {
    pub(crate) fn emit(&self, event: WriteEvent) {
        let kind = event.kind();
        let delivered = match self.tx.read().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        };
        if !delivered {
            trace!(?kind, "event discarded after close");
        }
    }

    /// Stop accepting events; the dispatcher exits once the queue is empty.
    pub(crate) fn close(&self) {
        self.tx.write().take();
    }
}

/// Create a sink and the dispatcher loop that feeds `listeners`.
pub(crate) fn channel(
    listeners: Arc<Listeners>,
) -> (EventSink, impl Future<Output = ()> + Send + 'static) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteEvent>();
    let sink = EventSink {
        tx: RwLock::new(Some(tx)),
    };
    let dispatcher = async move {
        while let Some(event) = rx.recv().await {
            for listener in listeners.matching(event.kind()) {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    warn!(kind = ?event.kind(), "event listener panicked");
                }
            }
        }
        trace!("event dispatcher stopped");
    };
    (sink, dispatcher)
}
