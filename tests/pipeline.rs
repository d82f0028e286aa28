//! Write pipeline behavior against an in-memory transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use influxdb_lineflux::write::{
    BatchOptions, BatchOptionsBuilder, EventDetail, EventKind, PipelineState, Transport,
    WriteApi, WriteEvent, WriteOptions, WriteOutcome, WriteRequest,
};
use influxdb_lineflux::{Error, Point, Result, ToPoint};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Records requests and answers from a script, `Success` once it runs out.
#[derive(Default)]
struct MockTransport {
    requests: Mutex<Vec<WriteRequest>>,
    responses: Mutex<VecDeque<Result<WriteOutcome>>>,
    gate: Option<Semaphore>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn responding(responses: Vec<Result<WriteOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    /// Every call blocks until a permit is added to the gate.
    fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    fn count(&self) -> usize {
        self.requests.lock().len()
    }

    fn bodies(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.body.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome> {
        self.requests.lock().push(request);
        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| Error::Closed)?.forget();
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or(Ok(WriteOutcome::Success))
    }
}

fn batching(size: usize) -> BatchOptionsBuilder {
    BatchOptions::builder()
        .batch_size(size)
        .flush_interval(Duration::from_secs(3600))
}

fn pipeline(transport: &Arc<MockTransport>, batch: BatchOptionsBuilder) -> WriteApi {
    WriteApi::new(
        Arc::clone(transport),
        WriteOptions::builder("db").build().unwrap(),
        batch.build().unwrap(),
    )
}

fn record_events(api: &WriteApi) -> Arc<Mutex<Vec<WriteEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    api.on_all(move |e| sink.lock().push(e.clone()));
    events
}

fn kinds(events: &Mutex<Vec<WriteEvent>>) -> Vec<EventKind> {
    events.lock().iter().map(WriteEvent::kind).collect()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn line(i: usize) -> String {
    format!("m v={}i", i)
}

#[tokio::test]
async fn test_three_points_wait_for_batch_size() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(1000));

    for i in 0..3 {
        api.submit(Point::builder("m").field("v", i as i64).build().unwrap())
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.count(), 0);
    assert_eq!(api.queued(), 3);

    for i in 3..1000 {
        api.submit(Point::builder("m").field("v", i as i64).build().unwrap())
            .unwrap();
    }
    eventually(|| transport.count() == 1).await;
    let request = transport.requests.lock()[0].clone();
    assert_eq!(request.lines, 1000);
    assert_eq!(request.database, "db");
    assert!(request.body.starts_with("m v=0i\nm v=1i\n"));

    api.close().await;
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn test_flush_interval_sends_partial_batch() {
    let transport = MockTransport::new();
    let api = pipeline(
        &transport,
        BatchOptions::builder()
            .batch_size(1000)
            .flush_interval(Duration::from_millis(50))
            .jitter_interval(Duration::from_millis(10)),
    );

    api.submit_record(line(1)).unwrap();
    eventually(|| transport.count() == 1).await;
    assert_eq!(transport.bodies(), vec![line(1)]);
    api.close().await;
}

#[tokio::test]
async fn test_close_drains_everything_once() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(2));
    let events = record_events(&api);

    for i in 0..5 {
        api.submit_record(line(i)).unwrap();
    }
    api.close().await;

    let sent: Vec<String> = transport
        .bodies()
        .iter()
        .flat_map(|b| b.lines().map(str::to_string).collect::<Vec<_>>())
        .collect();
    assert_eq!(sent, (0..5).map(line).collect::<Vec<_>>());
    assert_eq!(api.state(), PipelineState::Closed);
    assert_eq!(api.queued(), 0);

    assert!(matches!(api.submit_record(line(9)), Err(Error::Closed)));

    let delivered = events.lock().len();
    api.close().await;
    assert_eq!(events.lock().len(), delivered);
}

#[tokio::test]
async fn test_retryable_error_resends_ahead_of_next_batch() {
    let transport = MockTransport::responding(vec![Ok(WriteOutcome::Error {
        status: Some(503),
        message: "unavailable".into(),
    })]);
    let api = pipeline(&transport, batching(2));
    let events = record_events(&api);

    api.submit_record(line(1)).unwrap();
    api.submit_record(line(2)).unwrap();
    eventually(|| api.retrying() == 2).await;

    api.submit_record(line(3)).unwrap();
    api.submit_record(line(4)).unwrap();
    eventually(|| transport.count() == 2).await;
    assert_eq!(
        transport.bodies()[1],
        [line(1), line(2), line(3), line(4)].join("\n")
    );

    api.close().await;
    let error = events
        .lock()
        .iter()
        .find(|e| e.kind() == EventKind::WriteError)
        .cloned()
        .unwrap();
    assert_eq!(error.items.len(), 2);
    assert!(matches!(
        error.detail,
        EventDetail::WriteError {
            status: Some(503),
            retryable: true,
            ..
        }
    ));
}

#[tokio::test]
async fn test_client_error_is_dropped() {
    let transport = MockTransport::responding(vec![Ok(WriteOutcome::Error {
        status: Some(400),
        message: "bad request".into(),
    })]);
    let api = pipeline(&transport, batching(1));
    let events = record_events(&api);

    api.submit_record(line(1)).unwrap();
    eventually(|| kinds(&events).contains(&EventKind::WriteError)).await;
    assert_eq!(api.retrying(), 0);

    api.submit_record(line(2)).unwrap();
    api.close().await;
    assert_eq!(transport.bodies(), vec![line(1), line(2)]);
}

#[tokio::test]
async fn test_partial_write_retries_rejected_lines_only() {
    let transport = MockTransport::responding(vec![Ok(WriteOutcome::PartialWrite {
        rejected: vec![1],
        reason: "partial write".into(),
    })]);
    let api = pipeline(&transport, batching(3));
    let events = record_events(&api);

    for i in 0..3 {
        api.submit_record(line(i)).unwrap();
    }
    eventually(|| api.retrying() == 1).await;
    eventually(|| kinds(&events).contains(&EventKind::WritePartial)).await;

    let partial = events
        .lock()
        .iter()
        .find(|e| e.kind() == EventKind::WritePartial)
        .cloned()
        .unwrap();
    assert_eq!(partial.lines().collect::<Vec<_>>(), vec![line(1)]);

    for i in 3..6 {
        api.submit_record(line(i)).unwrap();
    }
    eventually(|| transport.count() == 2).await;
    assert_eq!(
        transport.bodies()[1],
        [line(1), line(3), line(4), line(5)].join("\n")
    );
    api.close().await;
}

#[tokio::test]
async fn test_retry_buffer_keeps_newest_at_capacity() {
    let transport = MockTransport::responding(vec![Ok(WriteOutcome::Error {
        status: None,
        message: "connection refused".into(),
    })]);
    let api = pipeline(&transport, batching(3).retry_buffer_limit(2));

    for i in 0..3 {
        api.submit_record(line(i)).unwrap();
    }
    eventually(|| api.retrying() == 2).await;

    for i in 3..6 {
        api.submit_record(line(i)).unwrap();
    }
    eventually(|| transport.count() == 2).await;
    assert_eq!(
        transport.bodies()[1],
        [line(1), line(2), line(3), line(4), line(5)].join("\n")
    );
    api.close().await;
}

#[tokio::test]
async fn test_retry_limit_discards_items() {
    let transport = MockTransport::responding(vec![Ok(WriteOutcome::Error {
        status: Some(500),
        message: "internal".into(),
    })]);
    let api = pipeline(&transport, batching(1).max_retries(0));
    let events = record_events(&api);

    api.submit_record(line(1)).unwrap();
    eventually(|| kinds(&events).contains(&EventKind::WriteError)).await;
    assert_eq!(api.retrying(), 0);

    api.close().await;
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn test_backpressure_drops_oldest_queued() {
    let transport = MockTransport::gated();
    let api = pipeline(&transport, batching(2).queue_capacity(2));
    let events = record_events(&api);

    api.submit_record(line(0)).unwrap();
    api.submit_record(line(1)).unwrap();
    // the first batch is now stuck in the transport
    eventually(|| transport.count() == 1).await;

    for i in 2..5 {
        api.submit_record(line(i)).unwrap();
    }
    assert_eq!(api.queued(), 2);

    transport.release(10);
    api.close().await;

    assert_eq!(
        transport.bodies(),
        vec![
            [line(0), line(1)].join("\n"),
            [line(3), line(4)].join("\n")
        ]
    );
    let backpressure: Vec<WriteEvent> = events
        .lock()
        .iter()
        .filter(|e| e.kind() == EventKind::BackpressureApplied)
        .cloned()
        .collect();
    assert_eq!(backpressure.len(), 1);
    assert_eq!(backpressure[0].lines().collect::<Vec<_>>(), vec![line(2)]);
    assert_eq!(
        backpressure[0].detail,
        EventDetail::BackpressureApplied { queued: 2 }
    );
}

#[tokio::test]
async fn test_response_parsed_precedes_outcome() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(1));
    let events = record_events(&api);

    api.submit_record(line(1)).unwrap();
    api.close().await;

    assert_eq!(
        kinds(&events),
        vec![EventKind::ResponseParsed, EventKind::WriteSuccess]
    );
    let events = events.lock();
    assert_eq!(events[0].options.database(), "db");
    assert_eq!(
        events[0].detail,
        EventDetail::ResponseParsed {
            outcome: WriteOutcome::Success
        }
    );
}

#[tokio::test]
async fn test_unhandled_error_gets_final_attempt_on_close() {
    let transport =
        MockTransport::responding(vec![Err(Error::Config("transport exploded".into()))]);
    let api = pipeline(&transport, batching(1));
    let events = record_events(&api);

    api.submit_record(line(1)).unwrap();
    eventually(|| api.retrying() == 1).await;
    api.close().await;

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::UnhandledError,
            EventKind::ResponseParsed,
            EventKind::WriteSuccess
        ]
    );
    match &events.lock()[0].detail {
        EventDetail::UnhandledError { message } => {
            assert!(message.contains("transport exploded"))
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(transport.bodies(), vec![line(1), line(1)]);
}

#[tokio::test]
async fn test_kind_listener_only_sees_its_kind() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(1));
    let successes = Arc::new(Mutex::new(0));
    let s = Arc::clone(&successes);
    api.on(EventKind::WriteSuccess, move |_| *s.lock() += 1);

    api.submit_record(line(1)).unwrap();
    api.submit_record(line(2)).unwrap();
    api.close().await;
    assert_eq!(*successes.lock(), 2);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_synchronously() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(10));

    assert!(matches!(api.submit_record("  "), Err(Error::InvalidPoint(_))));
    assert!(matches!(
        api.submit_record("a v=1i\nb v=2i"),
        Err(Error::InvalidPoint(_))
    ));

    let not_finite = Point::builder("m").field("v", f64::NAN).build().unwrap();
    assert!(matches!(api.submit(not_finite), Err(Error::InvalidPoint(_))));
    assert_eq!(api.queued(), 0);

    api.close().await;
    assert_eq!(transport.count(), 0);
}

struct Reading {
    sensor: &'static str,
    celsius: f64,
}

impl ToPoint for Reading {
    fn to_point(&self) -> Result<Point> {
        Point::builder("reading")
            .tag("sensor", self.sensor)
            .field("celsius", self.celsius)
            .timestamp(1, influxdb_lineflux::Precision::Seconds)
            .build()
    }
}

#[tokio::test]
async fn test_submit_measurement_encodes_with_pipeline_precision() {
    let transport = MockTransport::new();
    let api = WriteApi::new(
        Arc::clone(&transport),
        WriteOptions::builder("db")
            .precision(influxdb_lineflux::Precision::Milliseconds)
            .build()
            .unwrap(),
        batching(1).build().unwrap(),
    );
    let events = record_events(&api);

    api.submit_measurement(&Reading {
        sensor: "s1",
        celsius: 21.5,
    })
    .unwrap();
    api.close().await;

    assert_eq!(transport.bodies(), vec!["reading,sensor=s1 celsius=21.5 1000"]);
    let success = events
        .lock()
        .iter()
        .find(|e| e.kind() == EventKind::WriteSuccess)
        .cloned()
        .unwrap();
    assert_eq!(success.items[0].point().unwrap().measurement(), "reading");
}

#[tokio::test]
async fn test_drop_without_close_still_drains() {
    let transport = MockTransport::new();
    let api = pipeline(&transport, batching(100));
    api.submit_record(line(1)).unwrap();
    drop(api);

    eventually(|| transport.count() == 1).await;
    assert_eq!(transport.bodies(), vec![line(1)]);
}
