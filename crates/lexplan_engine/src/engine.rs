use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use engine_logging::{engine_error, engine_warn};

use crate::jobs::{HttpJobService, JobService};
use crate::queue::{HttpQueueService, QueueService};
use crate::status::{ChannelEventSink, EventSink, HttpStatusChannel, StatusChannel, StatusTracker};
use crate::types::{
    DraftTask, EngineEvent, FailedOp, JobKind, NotificationPrefs, ServiceError, TaskMetadata,
    TrackMode,
};
use crate::EngineConfig;

pub enum EngineCommand {
    CreatePlan {
        query: String,
    },
    ExecutePlan {
        plan_id: String,
        prefs: Option<NotificationPrefs>,
    },
    Decompose {
        query: String,
    },
    AddTask {
        query: String,
        metadata: Option<TaskMetadata>,
    },
    PopulateQueue {
        tasks: Vec<DraftTask>,
    },
    RemoveTask {
        task_id: String,
    },
    RefreshQueue,
    GeneratePlans,
    ExecuteQueue {
        notification_email: Option<String>,
        terms_accepted: bool,
    },
    ClearCompleted,
    Track {
        handle: String,
        mode: TrackMode,
    },
    Resume {
        handle: String,
        mode: TrackMode,
    },
    StopTracking,
    ScheduleSettle {
        generation: u64,
    },
    ClearSession {
        handle: String,
    },
}

struct EngineContext {
    config: EngineConfig,
    jobs: Arc<dyn JobService>,
    queue: Arc<dyn QueueService>,
    sink: Arc<dyn EventSink>,
    tracker: Mutex<StatusTracker>,
}

/// Handle to the engine thread: commands in over one channel, events out
/// over another. Cheap to clone; all clones share the same engine.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, ServiceError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(event_tx));
        let jobs: Arc<dyn JobService> = Arc::new(HttpJobService::new(&config)?);
        let queue: Arc<dyn QueueService> = Arc::new(HttpQueueService::new(&config)?);
        let channel: Arc<dyn StatusChannel> = Arc::new(HttpStatusChannel::new(&config)?);
        let tracker = StatusTracker::new(
            jobs.clone(),
            queue.clone(),
            channel,
            sink.clone(),
            config.poll_interval,
        );
        let ctx = Arc::new(EngineContext {
            config,
            jobs,
            queue,
            sink,
            tracker: Mutex::new(tracker),
        });

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            while let Ok(command) = cmd_rx.recv() {
                let ctx = ctx.clone();
                // Tracker attach/detach runs right here, in command order:
                // back-to-back Track/StopTracking must never race. Anything
                // doing network IO is spawned instead.
                let _guard = runtime.enter();
                if let Some(command) = apply_tracker_command(&ctx, command) {
                    runtime.spawn(async move {
                        handle_command(ctx, command).await;
                    });
                }
            }
        });

        Ok(Self {
            cmd_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
        })
    }

    pub fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            engine_error!("engine thread is gone; command dropped");
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx
            .lock()
            .expect("lock engine events")
            .try_recv()
            .ok()
    }
}

/// Consumes tracker lifecycle commands on the calling (engine) thread so
/// their ordering is exactly the command order; hands everything else back.
///
/// `Resume` attaches the multiplexer immediately and issues the one-shot
/// authoritative pull alongside it: a terminal result is routed by the pull,
/// a pending job is already being followed, and a failed pull leaves the
/// push channel attached to deliver what it can.
fn apply_tracker_command(
    ctx: &Arc<EngineContext>,
    command: EngineCommand,
) -> Option<EngineCommand> {
    match command {
        EngineCommand::Track { handle, mode } => {
            ctx.tracker
                .lock()
                .expect("lock status tracker")
                .track(&handle, mode);
            None
        }
        EngineCommand::Resume { handle, mode } => {
            ctx.tracker
                .lock()
                .expect("lock status tracker")
                .track(&handle, mode);
            let jobs = ctx.jobs.clone();
            let sink = ctx.sink.clone();
            tokio::spawn(async move {
                crate::status::resolve_by_pull(handle, jobs, sink).await;
            });
            None
        }
        EngineCommand::StopTracking => {
            ctx.tracker.lock().expect("lock status tracker").detach();
            None
        }
        other => Some(other),
    }
}

async fn handle_command(ctx: Arc<EngineContext>, command: EngineCommand) {
    match command {
        EngineCommand::CreatePlan { query } => match ctx.jobs.create_plan(&query).await {
            Ok(handle) => ctx.sink.emit(EngineEvent::JobAccepted {
                kind: JobKind::CreatePlan,
                handle,
            }),
            Err(err) => request_failed(&ctx, FailedOp::CreatePlan, err),
        },
        EngineCommand::ExecutePlan { plan_id, prefs } => {
            match ctx.jobs.execute_plan(&plan_id, prefs.as_ref()).await {
                Ok(handle) => ctx.sink.emit(EngineEvent::JobAccepted {
                    kind: JobKind::ExecutePlan,
                    handle,
                }),
                Err(err) => request_failed(&ctx, FailedOp::ExecutePlan, err),
            }
        }
        EngineCommand::Decompose { query } => match ctx.jobs.decompose(&query).await {
            Ok(tasks) => ctx.sink.emit(EngineEvent::Decomposition(tasks)),
            Err(err) => request_failed(&ctx, FailedOp::Decompose, err),
        },
        EngineCommand::AddTask { query, metadata } => {
            if let Err(err) = ctx.queue.add(&query, metadata.as_ref()).await {
                request_failed(&ctx, FailedOp::QueueEdit, err);
                return;
            }
            refresh_queue(&ctx).await;
        }
        EngineCommand::PopulateQueue { tasks } => {
            for task in tasks {
                let metadata = TaskMetadata {
                    title: task.title,
                    category: task.category,
                    priority: task.priority,
                    rationale: task.rationale,
                };
                if let Err(err) = ctx.queue.add(&task.query, Some(&metadata)).await {
                    request_failed(&ctx, FailedOp::QueueEdit, err);
                    break;
                }
            }
            refresh_queue(&ctx).await;
        }
        EngineCommand::RemoveTask { task_id } => {
            if let Err(err) = ctx.queue.remove(&task_id).await {
                request_failed(&ctx, FailedOp::QueueEdit, err);
                return;
            }
            refresh_queue(&ctx).await;
        }
        EngineCommand::RefreshQueue => refresh_queue(&ctx).await,
        EngineCommand::GeneratePlans => match ctx.queue.generate_plans().await {
            Ok(handle) => ctx.sink.emit(EngineEvent::JobAccepted {
                kind: JobKind::GeneratePlans,
                handle,
            }),
            Err(err) => request_failed(&ctx, FailedOp::GeneratePlans, err),
        },
        EngineCommand::ExecuteQueue {
            notification_email,
            terms_accepted,
        } => {
            match ctx
                .queue
                .execute(notification_email.as_deref(), terms_accepted)
                .await
            {
                Ok(handle) => ctx.sink.emit(EngineEvent::JobAccepted {
                    kind: JobKind::ExecuteQueue,
                    handle,
                }),
                Err(err) => request_failed(&ctx, FailedOp::ExecuteQueue, err),
            }
        }
        EngineCommand::ClearCompleted => {
            if let Err(err) = ctx.queue.clear_completed().await {
                request_failed(&ctx, FailedOp::QueueEdit, err);
                return;
            }
            refresh_queue(&ctx).await;
        }
        EngineCommand::Track { .. } | EngineCommand::Resume { .. } | EngineCommand::StopTracking => {
            // Already consumed on the engine thread by apply_tracker_command.
        }
        EngineCommand::ScheduleSettle { generation } => {
            tokio::time::sleep(ctx.config.queue_settle_delay).await;
            ctx.sink.emit(EngineEvent::SettleElapsed { generation });
        }
        EngineCommand::ClearSession { handle } => {
            // Best effort only; the server may keep the job running.
            if let Err(err) = ctx.jobs.clear_session(&handle).await {
                engine_warn!("session cleanup for job {} failed: {}", handle, err);
            }
        }
    }
}

async fn refresh_queue(ctx: &Arc<EngineContext>) {
    match ctx.queue.list().await {
        Ok(tasks) => ctx.sink.emit(EngineEvent::QueueRefreshed(tasks)),
        Err(err) => request_failed(ctx, FailedOp::QueueEdit, err),
    }
}

fn request_failed(ctx: &Arc<EngineContext>, op: FailedOp, err: ServiceError) {
    engine_warn!("{:?} request failed: {}", op, err);
    ctx.sink.emit(EngineEvent::RequestFailed {
        op,
        message: err.to_string(),
    });
}
