//! Asynchronous batching writer.
//!
//! [`WriteApi`] accepts points and raw records without waiting on the
//! network. A background task groups queued records into batches, sends
//! them through a [`Transport`] one batch at a time, and puts failed records
//! into a bounded retry buffer that rides along with the next batch.
//!
//! ```no_run
//! use influxdb_lineflux::write::{BatchOptions, WriteApi, WriteOptions, EventKind};
//! use influxdb_lineflux::{Client, Point};
//!
//! # async fn example() -> influxdb_lineflux::Result<()> {
//! let client = Client::new("http://localhost:8086", "my-org", "my-token")?;
//! let write_api = WriteApi::new(
//!     client,
//!     WriteOptions::builder("telegraf").build()?,
//!     BatchOptions::default(),
//! );
//! write_api.on(EventKind::WriteError, |event| eprintln!("{:?}", event.detail));
//!
//! write_api.submit(Point::builder("cpu").field("usage", 0.64).build()?)?;
//! write_api.close().await;
//! # Ok(())
//! # }
//! ```

mod event;
mod options;
mod retry;
mod transport;

pub use event::{EventDetail, EventKind, WriteEvent, WriteItem};
pub use options::{
    BatchOptions, BatchOptionsBuilder, Consistency, WriteOptions, WriteOptionsBuilder,
};
pub use retry::RetryBuffer;
pub use transport::{Transport, WriteOutcome, WriteRequest, retryable_status};

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::line_protocol;
use crate::point::{Point, ToPoint};
use event::{EventSink, Listeners};

/// Lifecycle of a [`WriteApi`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Accepting and sending.
    Open,
    /// Closing: queued records are being sent.
    Draining,
    /// Finished. Submissions fail with [`Error::Closed`].
    Closed,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Open,
            1 => PipelineState::Draining,
            _ => PipelineState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PipelineState::Open => 0,
            PipelineState::Draining => 1,
            PipelineState::Closed => 2,
        }
    }
}

/// A queued or retried record with its send history.
#[derive(Debug)]
struct Pending {
    item: WriteItem,
    attempts: u32,
}

struct Shared {
    write_options: Arc<WriteOptions>,
    batch_options: BatchOptions,
    queue: Mutex<VecDeque<Pending>>,
    queued: AtomicUsize,
    retry: RetryBuffer<Pending>,
    state: AtomicU8,
    wake: Notify,
    events: EventSink,
}

impl Shared {
    fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            PipelineState::Open.as_u8(),
            PipelineState::Draining.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.wake.notify_one();
    }

    fn emit(&self, items: Arc<[WriteItem]>, detail: EventDetail) {
        self.events.emit(WriteEvent {
            items,
            options: Arc::clone(&self.write_options),
            detail,
        });
    }

    fn enqueue(&self, item: WriteItem) -> Result<()> {
        let (dropped, queued) = {
            let mut queue = self.queue.lock();
            // Checked under the lock: the batching task marks the pipeline
            // closed only while holding it with an empty queue.
            if self.state() == PipelineState::Closed {
                return Err(Error::Closed);
            }
            let dropped = if queue.len() >= self.batch_options.queue_capacity() {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(Pending { item, attempts: 0 });
            self.queued.store(queue.len(), Ordering::Release);
            (dropped, queue.len())
        };

        if let Some(dropped) = dropped {
            warn!(queued, "write queue full, dropped oldest record");
            self.emit(
                Arc::from(vec![dropped.item]),
                EventDetail::BackpressureApplied { queued },
            );
        }
        if queued >= self.batch_options.batch_size() {
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Up to `batch_size` records from the front of the queue.
    fn take_batch(&self) -> Vec<Pending> {
        let mut queue = self.queue.lock();
        let n = queue.len().min(self.batch_options.batch_size());
        let batch: Vec<Pending> = queue.drain(..n).collect();
        self.queued.store(queue.len(), Ordering::Release);
        batch
    }

    /// Mark the pipeline closed if nothing is queued.
    fn try_finish(&self) -> bool {
        let queue = self.queue.lock();
        if !queue.is_empty() {
            return false;
        }
        self.state
            .store(PipelineState::Closed.as_u8(), Ordering::Release);
        true
    }

    fn next_deadline(&self) -> Instant {
        let jitter = self.batch_options.jitter_interval().as_millis() as u64;
        let jitter = if jitter == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter))
        };
        Instant::now() + self.batch_options.flush_interval() + jitter
    }

    /// Send pending retries followed by one regular batch.
    async fn flush(&self, transport: &dyn Transport) {
        let mut batch = self.retry.drain();
        batch.extend(self.take_batch());
        if batch.is_empty() {
            trace!("nothing to flush");
            return;
        }
        self.send(transport, batch).await;
    }

    async fn send(&self, transport: &dyn Transport, batch: Vec<Pending>) {
        let request = WriteRequest::new(
            &self.write_options,
            batch.iter().map(|p| p.item.line()),
        );
        let items: Arc<[WriteItem]> = batch.iter().map(|p| p.item.clone()).collect();
        debug!(lines = request.lines, "sending batch");

        let outcome = match transport.write(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, lines = items.len(), "write failed");
                self.emit(
                    items,
                    EventDetail::UnhandledError {
                        message: e.to_string(),
                    },
                );
                self.retry_later(batch);
                return;
            }
        };

        self.emit(
            Arc::clone(&items),
            EventDetail::ResponseParsed {
                outcome: outcome.clone(),
            },
        );

        match outcome {
            WriteOutcome::Success => {
                trace!(lines = items.len(), "batch written");
                self.emit(items, EventDetail::WriteSuccess);
            }
            WriteOutcome::PartialWrite { rejected, reason } => {
                let mut rejected_items = Vec::new();
                let mut retry = Vec::new();
                for (i, pending) in batch.into_iter().enumerate() {
                    if rejected.contains(&i) {
                        rejected_items.push(pending.item.clone());
                        retry.push(pending);
                    }
                }
                warn!(
                    rejected = retry.len(),
                    lines = items.len(),
                    %reason,
                    "partial write"
                );
                if retry.is_empty() {
                    self.emit(items, EventDetail::WriteSuccess);
                    return;
                }
                self.emit(
                    Arc::from(rejected_items),
                    EventDetail::WritePartial { reason },
                );
                self.retry_later(retry);
            }
            WriteOutcome::Error { status, message } => {
                let retryable = transport::retryable_status(status);
                warn!(?status, %message, retryable, "batch rejected");
                self.emit(
                    items,
                    EventDetail::WriteError {
                        status,
                        message,
                        retryable,
                    },
                );
                if retryable {
                    self.retry_later(batch);
                }
            }
        }
    }

    fn retry_later(&self, batch: Vec<Pending>) {
        let max_retries = self.batch_options.max_retries();
        let mut expired = 0;
        let kept: Vec<Pending> = batch
            .into_iter()
            .filter_map(|mut p| {
                p.attempts += 1;
                if p.attempts > max_retries {
                    expired += 1;
                    None
                } else {
                    Some(p)
                }
            })
            .collect();
        if expired > 0 {
            warn!(expired, max_retries, "records exceeded retry limit");
        }
        let evicted = self.retry.offer(kept);
        if evicted > 0 {
            warn!(
                evicted,
                capacity = self.retry.capacity(),
                "retry buffer full, evicted oldest records"
            );
        }
    }
}

/// Background batching task.
async fn run(shared: Arc<Shared>, transport: Arc<dyn Transport>) {
    let batch_size = shared.batch_options.batch_size();
    let mut deadline = shared.next_deadline();

    while shared.state() == PipelineState::Open {
        if shared.queued.load(Ordering::Acquire) >= batch_size {
            shared.flush(transport.as_ref()).await;
            deadline = shared.next_deadline();
            continue;
        }
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep_until(deadline) => {
                shared.flush(transport.as_ref()).await;
                deadline = shared.next_deadline();
            }
        }
    }

    debug!(queued = shared.queued.load(Ordering::Acquire), "draining");
    loop {
        let batch = shared.take_batch();
        if batch.is_empty() {
            if shared.try_finish() {
                break;
            }
            continue;
        }
        let mut batch_with_retries = shared.retry.drain();
        batch_with_retries.extend(batch);
        shared.send(transport.as_ref(), batch_with_retries).await;
    }

    // one last attempt for anything still waiting to be retried
    let retries = shared.retry.drain();
    if !retries.is_empty() {
        shared.send(transport.as_ref(), retries).await;
    }
    let abandoned = shared.retry.drain().len();
    if abandoned > 0 {
        warn!(abandoned, "discarding unsent records on close");
    }
    info!("write pipeline closed");
}

struct Tasks {
    batcher: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Non-blocking, batching writer.
///
/// Must be created inside a Tokio runtime. Dropping it without calling
/// [`close`](WriteApi::close) still drains queued records in the background.
pub struct WriteApi {
    shared: Arc<Shared>,
    listeners: Arc<Listeners>,
    tasks: tokio::sync::Mutex<Option<Tasks>>,
}

impl WriteApi {
    /// Start a pipeline sending through `transport`.
    pub fn new(
        transport: impl Transport + 'static,
        write_options: WriteOptions,
        batch_options: BatchOptions,
    ) -> Self {
        let listeners = Arc::new(Listeners::default());
        let (events, dispatcher) = event::channel(Arc::clone(&listeners));
        let shared = Arc::new(Shared {
            write_options: Arc::new(write_options),
            retry: RetryBuffer::new(batch_options.retry_buffer_limit()),
            batch_options,
            queue: Mutex::new(VecDeque::new()),
            queued: AtomicUsize::new(0),
            state: AtomicU8::new(PipelineState::Open.as_u8()),
            wake: Notify::new(),
            events,
        });

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let batcher = tokio::spawn(run(Arc::clone(&shared), transport));
        let dispatcher = tokio::spawn(dispatcher);

        Self {
            shared,
            listeners,
            tasks: tokio::sync::Mutex::new(Some(Tasks {
                batcher,
                dispatcher,
            })),
        }
    }

    /// Queue a point. Encoding happens here, so invalid points are
    /// reported immediately.
    pub fn submit(&self, point: Point) -> Result<()> {
        self.ensure_accepting()?;
        let line = line_protocol::encode(&point, self.shared.write_options.precision())?;
        self.shared.enqueue(WriteItem::new(line, Some(point)))
    }

    /// Queue a pre-encoded line protocol record.
    pub fn submit_record(&self, record: impl Into<String>) -> Result<()> {
        self.ensure_accepting()?;
        let record = record.into();
        let trimmed = record.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidPoint("empty record".into()));
        }
        if trimmed.contains('\n') {
            return Err(Error::InvalidPoint(
                "record must be a single line".into(),
            ));
        }
        let line = if trimmed.len() == record.len() {
            record
        } else {
            trimmed.to_string()
        };
        self.shared.enqueue(WriteItem::new(line, None))
    }

    /// Queue a user type that converts into a point.
    pub fn submit_measurement<M: ToPoint + ?Sized>(&self, measurement: &M) -> Result<()> {
        self.submit(measurement.to_point()?)
    }

    /// Queue several points, stopping at the first invalid one.
    pub fn submit_all(&self, points: impl IntoIterator<Item = Point>) -> Result<()> {
        for point in points {
            self.submit(point)?;
        }
        Ok(())
    }

    /// Call `listener` for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&WriteEvent) + Send + Sync + 'static,
    {
        self.listeners.add(Some(kind), Arc::new(listener));
    }

    /// Call `listener` for every event.
    pub fn on_all<F>(&self, listener: F)
    where
        F: Fn(&WriteEvent) + Send + Sync + 'static,
    {
        self.listeners.add(None, Arc::new(listener));
    }

    /// Send everything queued, then stop. Later submissions fail with
    /// [`Error::Closed`]. Calling it again is a no-op.
    pub async fn close(&self) {
        let mut tasks = self.tasks.lock().await;
        let Some(Tasks {
            batcher,
            dispatcher,
        }) = tasks.take()
        else {
            return;
        };

        self.shared.begin_close();
        if let Err(e) = batcher.await {
            warn!(error = %e, "batching task failed");
        }
        self.shared
            .state
            .store(PipelineState::Closed.as_u8(), Ordering::Release);
        self.shared.events.close();
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "event dispatcher failed");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Records waiting for their first send.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Records waiting to be resent.
    pub fn retrying(&self) -> usize {
        self.shared.retry.len()
    }

    /// Options batches are written with.
    pub fn write_options(&self) -> &WriteOptions {
        &self.shared.write_options
    }

    /// Batching policy.
    pub fn batch_options(&self) -> &BatchOptions {
        &self.shared.batch_options
    }

    fn ensure_accepting(&self) -> Result<()> {
        match self.shared.state() {
            PipelineState::Closed => Err(Error::Closed),
            _ => Ok(()),
        }
    }
}

impl Drop for WriteApi {
    fn drop(&mut self) {
        self.shared.begin_close();
    }
}

impl std::fmt::Debug for WriteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteApi")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("retrying", &self.retrying())
            .finish()
    }
}
