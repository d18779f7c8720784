use std::pin::Pin;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;

use crate::jobs::{check_status, JobService};
use crate::queue::QueueService;
use crate::types::{map_reqwest_error, EngineEvent, ServiceError, StatusFrame, TrackMode};
use crate::EngineConfig;

pub type StatusStream = Pin<Box<dyn Stream<Item = Result<StatusFrame, ServiceError>> + Send>>;

/// Push side of the status protocol: one long-lived subscription per job.
#[async_trait::async_trait]
pub trait StatusChannel: Send + Sync {
    async fn subscribe(&self, job_id: &str) -> Result<StatusStream, ServiceError>;
}

/// Consumers of engine events. The engine never calls back into the host
/// directly; everything goes through a sink.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Reads a newline-delimited JSON body from the job's stream endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusChannel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusChannel {
    pub fn new(config: &EngineConfig) -> Result<Self, ServiceError> {
        // No total request timeout here: the subscription stays open for the
        // lifetime of the job.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|err| ServiceError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl StatusChannel for HttpStatusChannel {
    async fn subscribe(&self, job_id: &str) -> Result<StatusStream, ServiceError> {
        let response = self
            .client
            .get(format!(
                "{}/api/analysis/jobs/{job_id}/stream",
                self.base_url
            ))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)?;
        Ok(ndjson_frames(response.bytes_stream().boxed()))
    }
}

struct NdjsonState {
    inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    buffer: Vec<u8>,
    done: bool,
}

fn ndjson_frames(inner: BoxStream<'static, Result<Bytes, reqwest::Error>>) -> StatusStream {
    let state = NdjsonState {
        inner,
        buffer: Vec::new(),
        done: false,
    };
    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                if let Some(item) = parse_frame_line(&line) {
                    return Some((item, state));
                }
                continue;
            }
            if state.done {
                // Flush a trailing line the server did not terminate.
                let line = std::mem::take(&mut state.buffer);
                return parse_frame_line(&line).map(|item| (item, state));
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    state.done = true;
                    state.buffer.clear();
                    return Some((Err(map_reqwest_error(err)), state));
                }
                None => state.done = true,
            }
        }
    }))
}

fn parse_frame_line(line: &[u8]) -> Option<Result<StatusFrame, ServiceError>> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).map_err(|err| ServiceError::Decode(err.to_string())))
}

/// The status multiplexer: one push subscription plus, for queue-mode jobs,
/// a fixed-interval pull loop, normalized into one event sink.
pub struct StatusTracker {
    jobs: Arc<dyn JobService>,
    queue: Arc<dyn QueueService>,
    channel: Arc<dyn StatusChannel>,
    sink: Arc<dyn EventSink>,
    poll_interval: Duration,
    active: Option<ActiveTracking>,
}

struct ActiveTracking {
    handle: String,
    push: JoinHandle<()>,
    poll: Option<JoinHandle<()>>,
}

impl StatusTracker {
    pub fn new(
        jobs: Arc<dyn JobService>,
        queue: Arc<dyn QueueService>,
        channel: Arc<dyn StatusChannel>,
        sink: Arc<dyn EventSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            jobs,
            queue,
            channel,
            sink,
            poll_interval,
            active: None,
        }
    }

    /// Attaches to a job. Any previous subscription and poll loop are torn
    /// down first, so at most one job is ever tracked.
    ///
    /// Must be called from within the engine's tokio runtime.
    pub fn track(&mut self, handle: &str, mode: TrackMode) {
        self.detach();
        let push = tokio::spawn(run_push(
            handle.to_string(),
            self.channel.clone(),
            self.jobs.clone(),
            self.sink.clone(),
        ));
        let poll = match mode {
            TrackMode::Queue => Some(tokio::spawn(run_poll(
                self.queue.clone(),
                self.sink.clone(),
                self.poll_interval,
            ))),
            TrackMode::Single => None,
        };
        engine_debug!("tracking job {} ({:?})", handle, mode);
        self.active = Some(ActiveTracking {
            handle: handle.to_string(),
            push,
            poll,
        });
    }

    pub fn detach(&mut self) {
        if let Some(active) = self.active.take() {
            active.push.abort();
            if let Some(poll) = active.poll {
                poll.abort();
            }
            engine_debug!("detached status tracking for job {}", active.handle);
        }
    }

    pub fn tracked_job(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.handle.as_str())
    }
}

async fn run_push(
    handle: String,
    channel: Arc<dyn StatusChannel>,
    jobs: Arc<dyn JobService>,
    sink: Arc<dyn EventSink>,
) {
    match channel.subscribe(&handle).await {
        Ok(mut stream) => {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => {
                        if let Some(outcome) = frame.terminal_outcome() {
                            // Terminal payload: close the subscription and
                            // route it; nothing further is read, so late
                            // frames cannot shadow it.
                            sink.emit(EngineEvent::JobTerminal { handle, outcome });
                            return;
                        }
                        sink.emit(EngineEvent::Status {
                            handle: handle.clone(),
                            frame,
                        });
                    }
                    Err(err) => {
                        // Push transport errors are never user-facing; the
                        // authoritative pull below is the recovery path.
                        engine_warn!("status stream error for job {}: {}", handle, err);
                        break;
                    }
                }
            }
            resolve_by_pull(handle, jobs, sink).await;
        }
        Err(err) => {
            engine_warn!("could not open status stream for job {}: {}", handle, err);
            resolve_by_pull(handle, jobs, sink).await;
        }
    }
}

/// One-shot authoritative status pull, covering a push stream that closed
/// (or failed) before delivering a terminal event, and the restore-time
/// re-attach check. Non-terminal and error results are logged, not routed.
pub(crate) async fn resolve_by_pull(
    handle: String,
    jobs: Arc<dyn JobService>,
    sink: Arc<dyn EventSink>,
) {
    match jobs.job_status(&handle).await {
        Ok(status) => match status.terminal_outcome() {
            Some(outcome) => sink.emit(EngineEvent::JobTerminal { handle, outcome }),
            None => engine_info!("job {} still pending after a status pull", handle),
        },
        Err(err) => engine_warn!("status pull for job {} failed: {}", handle, err),
    }
}

/// Queue-mode pull fallback: queue membership can change independently of
/// any single job's push stream.
async fn run_poll(queue: Arc<dyn QueueService>, sink: Arc<dyn EventSink>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match queue.list().await {
            Ok(tasks) => sink.emit(EngineEvent::QueueRefreshed(tasks)),
            Err(err) => engine_warn!("queue poll failed: {}", err),
        }
    }
}
