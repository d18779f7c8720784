use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use lexplan_engine::{
    EngineCommand, EngineConfig, EngineEvent, EngineHandle, EventSink, HttpJobService,
    HttpQueueService, HttpStatusChannel, JobService, QueueService, StatusChannel, StatusTracker,
    TrackMode,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Clone, Default)]
struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn snapshot(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Polls until an event matching `pred` shows up, or panics.
    async fn wait_for(&self, pred: impl Fn(&EngineEvent) -> bool) -> EngineEvent {
        for _ in 0..200 {
            if let Some(event) = self.snapshot().into_iter().find(|event| pred(event)) {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected event never arrived; saw: {:?}", self.snapshot());
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn tracker(server: &MockServer, sink: &TestSink, poll_interval: Duration) -> StatusTracker {
    let config = EngineConfig::for_base_url(server.uri());
    let jobs: Arc<dyn JobService> = Arc::new(HttpJobService::new(&config).expect("jobs client"));
    let queue: Arc<dyn QueueService> =
        Arc::new(HttpQueueService::new(&config).expect("queue client"));
    let channel: Arc<dyn StatusChannel> =
        Arc::new(HttpStatusChannel::new(&config).expect("stream client"));
    StatusTracker::new(jobs, queue, channel, Arc::new(sink.clone()), poll_interval)
}

async fn mount_stream(server: &MockServer, job_id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/analysis/jobs/{job_id}/stream")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(server)
        .await;
}

async fn mount_pending_status(server: &MockServer, job_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/analysis/jobs/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn subscription_parses_ndjson_frames_and_skips_blank_lines() {
    let server = MockServer::start().await;
    // Blank line in the middle, terminal frame without a trailing newline.
    let body = "{\"position\":1,\"total\":3,\"status\":\"processing\"}\n\n{\"result\":{\"ok\":true}}";
    mount_stream(&server, "J1", body).await;

    let config = EngineConfig::for_base_url(server.uri());
    let channel = HttpStatusChannel::new(&config).expect("stream client");
    let mut stream = channel.subscribe("J1").await.expect("subscribed");

    let first = stream.next().await.expect("first frame").expect("parses");
    assert_eq!(first.position, Some(1));
    assert_eq!(first.total, Some(3));
    assert_eq!(first.terminal_outcome(), None);

    let second = stream.next().await.expect("second frame").expect("parses");
    assert_eq!(second.terminal_outcome(), Some(Ok(json!({ "ok": true }))));

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn push_terminal_is_routed_and_closes_the_subscription() {
    let server = MockServer::start().await;
    let body = "{\"position\":2,\"total\":2,\"status\":\"processing\"}\n{\"result\":{\"plan_id\":\"P1\"}}\n";
    mount_stream(&server, "J1", body).await;
    mount_pending_status(&server, "J1").await;

    let sink = TestSink::default();
    let mut tracker = tracker(&server, &sink, Duration::from_secs(60));
    tracker.track("J1", TrackMode::Single);

    let terminal = sink
        .wait_for(|event| matches!(event, EngineEvent::JobTerminal { .. }))
        .await;
    assert_eq!(
        terminal,
        EngineEvent::JobTerminal {
            handle: "J1".to_string(),
            outcome: Ok(json!({ "plan_id": "P1" })),
        }
    );

    // The non-terminal frame came through first, and exactly one terminal
    // was emitted even though the pull endpoint was available too.
    let events = sink.snapshot();
    assert!(matches!(events[0], EngineEvent::Status { .. }));
    let terminals = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::JobTerminal { .. }))
        .count();
    assert_eq!(terminals, 1);
}

#[tokio::test]
async fn closed_stream_without_terminal_falls_back_to_a_pull() {
    let server = MockServer::start().await;
    mount_stream(&server, "J1", "{\"position\":1,\"total\":2,\"status\":\"processing\"}\n").await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": { "plan_id": "P1" },
        })))
        .mount(&server)
        .await;

    let sink = TestSink::default();
    let mut tracker = tracker(&server, &sink, Duration::from_secs(60));
    tracker.track("J1", TrackMode::Single);

    let terminal = sink
        .wait_for(|event| matches!(event, EngineEvent::JobTerminal { .. }))
        .await;
    assert_eq!(
        terminal,
        EngineEvent::JobTerminal {
            handle: "J1".to_string(),
            outcome: Ok(json!({ "plan_id": "P1" })),
        }
    );
}

#[tokio::test]
async fn unreachable_stream_still_resolves_through_the_pull() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J1/stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": "model overloaded",
        })))
        .mount(&server)
        .await;

    let sink = TestSink::default();
    let mut tracker = tracker(&server, &sink, Duration::from_secs(60));
    tracker.track("J1", TrackMode::Single);

    let terminal = sink
        .wait_for(|event| matches!(event, EngineEvent::JobTerminal { .. }))
        .await;
    assert_eq!(
        terminal,
        EngineEvent::JobTerminal {
            handle: "J1".to_string(),
            outcome: Err("model overloaded".to_string()),
        }
    );
}

#[tokio::test]
async fn queue_mode_polls_the_task_list_alongside_the_stream() {
    let server = MockServer::start().await;
    mount_stream(&server, "Q1", "").await;
    mount_pending_status(&server, "Q1").await;
    Mock::given(method("GET"))
        .and(path("/api/queue/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tasks": [ { "id": "t1", "query": "overtime rules", "status": "processing" } ],
        })))
        .mount(&server)
        .await;

    let sink = TestSink::default();
    let mut tracker = tracker(&server, &sink, Duration::from_millis(25));
    tracker.track("Q1", TrackMode::Queue);

    let refreshed = sink
        .wait_for(|event| matches!(event, EngineEvent::QueueRefreshed(_)))
        .await;
    match refreshed {
        EngineEvent::QueueRefreshed(tasks) => {
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].id, "t1");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn tracking_a_new_job_replaces_the_old_subscription() {
    let server = MockServer::start().await;
    mount_stream(&server, "J1", "").await;
    mount_stream(&server, "J2", "").await;
    mount_pending_status(&server, "J1").await;
    mount_pending_status(&server, "J2").await;

    let sink = TestSink::default();
    let mut tracker = tracker(&server, &sink, Duration::from_secs(60));

    tracker.track("J1", TrackMode::Single);
    assert_eq!(tracker.tracked_job(), Some("J1"));

    tracker.track("J2", TrackMode::Single);
    assert_eq!(tracker.tracked_job(), Some("J2"));

    tracker.detach();
    assert_eq!(tracker.tracked_job(), None);
}

/// Drains engine events until a `JobTerminal` arrives, returning everything
/// seen on the way. Panics if none shows up.
async fn collect_until_terminal(engine: &EngineHandle) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    for _ in 0..300 {
        while let Some(event) = engine.try_recv() {
            let terminal = matches!(event, EngineEvent::JobTerminal { .. });
            events.push(event);
            if terminal {
                return events;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no terminal event arrived; saw: {events:?}");
}

#[tokio::test]
async fn resume_routes_a_terminal_outcome_from_the_authoritative_pull() {
    let server = MockServer::start().await;
    mount_stream(&server, "J3", "").await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": "boom",
        })))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(EngineConfig::for_base_url(server.uri())).expect("engine");
    engine.send(EngineCommand::Resume {
        handle: "J3".to_string(),
        mode: TrackMode::Single,
    });

    let events = collect_until_terminal(&engine).await;
    assert_eq!(
        events.last(),
        Some(&EngineEvent::JobTerminal {
            handle: "J3".to_string(),
            outcome: Err("boom".to_string()),
        })
    );
}

#[tokio::test]
async fn resume_keeps_following_a_still_pending_job() {
    let server = MockServer::start().await;
    let body = "{\"position\":1,\"total\":2,\"status\":\"processing\"}\n{\"result\":{\"plan_id\":\"P1\"}}\n";
    mount_stream(&server, "J3", body).await;
    mount_pending_status(&server, "J3").await;

    let engine = EngineHandle::new(EngineConfig::for_base_url(server.uri())).expect("engine");
    engine.send(EngineCommand::Resume {
        handle: "J3".to_string(),
        mode: TrackMode::Single,
    });

    // The pull finds the job pending and stays quiet; the re-attached push
    // channel carries the job to completion.
    let events = collect_until_terminal(&engine).await;
    assert!(matches!(events[0], EngineEvent::Status { .. }));
    assert_eq!(
        events.last(),
        Some(&EngineEvent::JobTerminal {
            handle: "J3".to_string(),
            outcome: Ok(json!({ "plan_id": "P1" })),
        })
    );
}

#[tokio::test]
async fn resume_stays_attached_when_the_pull_fails() {
    let server = MockServer::start().await;
    mount_stream(&server, "J3", "{\"result\":{\"plan_id\":\"P1\"}}\n").await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(EngineConfig::for_base_url(server.uri())).expect("engine");
    engine.send(EngineCommand::Resume {
        handle: "J3".to_string(),
        mode: TrackMode::Single,
    });

    // The failed pull is logged and swallowed; the push channel delivers.
    let events = collect_until_terminal(&engine).await;
    assert_eq!(
        events.last(),
        Some(&EngineEvent::JobTerminal {
            handle: "J3".to_string(),
            outcome: Ok(json!({ "plan_id": "P1" })),
        })
    );
}

#[tokio::test]
async fn stop_tracking_right_after_attach_cancels_before_any_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/analysis/jobs/J1/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_raw(
                    "{\"result\":{\"plan_id\":\"P1\"}}\n",
                    "application/x-ndjson",
                ),
        )
        .mount(&server)
        .await;
    mount_pending_status(&server, "J1").await;

    let engine = EngineHandle::new(EngineConfig::for_base_url(server.uri())).expect("engine");
    // Back-to-back lifecycle commands must apply in order: the detach lands
    // after the attach, never the other way around.
    engine.send(EngineCommand::Track {
        handle: "J1".to_string(),
        mode: TrackMode::Single,
    });
    engine.send(EngineCommand::StopTracking);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(engine.try_recv(), None);
}

#[test]
fn settle_timer_fires_after_the_configured_delay() {
    let config = EngineConfig {
        queue_settle_delay: Duration::from_millis(100),
        ..EngineConfig::default()
    };

    let engine = EngineHandle::new(config).expect("engine starts");
    let started = std::time::Instant::now();
    engine.send(EngineCommand::ScheduleSettle { generation: 7 });

    let deadline = started + Duration::from_secs(5);
    let event = loop {
        if let Some(event) = engine.try_recv() {
            break event;
        }
        assert!(std::time::Instant::now() < deadline, "settle never fired");
        std::thread::sleep(Duration::from_millis(5));
    };

    assert_eq!(event, EngineEvent::SettleElapsed { generation: 7 });
    assert!(started.elapsed() >= Duration::from_millis(100));
}
