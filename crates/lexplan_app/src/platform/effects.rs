use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use engine_logging::engine_warn;
use lexplan_core::{
    DraftTask, Effect, FailedOp, JobKind, Msg, QueueStatus, QueueStatusData, QueueTask, TaskState,
    TrackMode,
};
use lexplan_engine::{EngineCommand, EngineConfig, EngineEvent, EngineHandle, ServiceError};

/// Executes core effects against the engine and feeds engine events back to
/// the dispatch loop as messages.
pub(crate) struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub(crate) fn new(config: EngineConfig, msg_tx: mpsc::Sender<Msg>) -> Result<Self, ServiceError> {
        let engine = EngineHandle::new(config)?;
        let runner = Self { engine };
        runner.spawn_event_loop(msg_tx);
        Ok(runner)
    }

    pub(crate) fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CreatePlan { query } => {
                    self.engine.send(EngineCommand::CreatePlan { query });
                }
                Effect::ExecutePlan { plan_id, prefs } => {
                    self.engine.send(EngineCommand::ExecutePlan {
                        plan_id,
                        prefs: prefs.map(|prefs| lexplan_engine::NotificationPrefs {
                            email: prefs.email,
                            terms_accepted: prefs.terms_accepted,
                        }),
                    });
                }
                Effect::Decompose { query } => {
                    self.engine.send(EngineCommand::Decompose { query });
                }
                Effect::AddTask { query, metadata } => {
                    self.engine.send(EngineCommand::AddTask {
                        query,
                        metadata: metadata.map(|meta| lexplan_engine::TaskMetadata {
                            title: meta.title,
                            category: meta.category,
                            priority: meta.priority,
                            rationale: meta.rationale,
                        }),
                    });
                }
                Effect::PopulateQueue { tasks } => {
                    self.engine.send(EngineCommand::PopulateQueue {
                        tasks: tasks
                            .into_iter()
                            .map(|task| lexplan_engine::DraftTask {
                                query: task.query,
                                title: task.title,
                                category: task.category,
                                priority: task.priority,
                                rationale: task.rationale,
                            })
                            .collect(),
                    });
                }
                Effect::RemoveTask { task_id } => {
                    self.engine.send(EngineCommand::RemoveTask { task_id });
                }
                Effect::RefreshQueue => {
                    self.engine.send(EngineCommand::RefreshQueue);
                }
                Effect::GeneratePlans => {
                    self.engine.send(EngineCommand::GeneratePlans);
                }
                Effect::ExecuteQueue {
                    notification_email,
                    terms_accepted,
                } => {
                    self.engine.send(EngineCommand::ExecuteQueue {
                        notification_email,
                        terms_accepted,
                    });
                }
                Effect::ClearCompleted => {
                    self.engine.send(EngineCommand::ClearCompleted);
                }
                Effect::Track { handle, mode } => {
                    self.engine.send(EngineCommand::Track {
                        handle,
                        mode: map_track_mode(mode),
                    });
                }
                Effect::Resume { handle, mode } => {
                    self.engine.send(EngineCommand::Resume {
                        handle,
                        mode: map_track_mode(mode),
                    });
                }
                Effect::StopTracking => {
                    self.engine.send(EngineCommand::StopTracking);
                }
                Effect::ScheduleSettle { generation } => {
                    self.engine.send(EngineCommand::ScheduleSettle { generation });
                }
                Effect::ClearServerSession { handle } => {
                    self.engine.send(EngineCommand::ClearSession { handle });
                }
                Effect::ClearSnapshot => {
                    // Handled by the runtime before effects reach the engine.
                }
            }
        }
    }

    fn spawn_event_loop(&self, msg_tx: mpsc::Sender<Msg>) {
        let engine = self.engine.clone();
        thread::spawn(move || loop {
            if let Some(event) = engine.try_recv() {
                if msg_tx.send(map_event(event)).is_err() {
                    return;
                }
            } else {
                thread::sleep(Duration::from_millis(20));
            }
        });
    }
}

fn map_track_mode(mode: TrackMode) -> lexplan_engine::TrackMode {
    match mode {
        TrackMode::Single => lexplan_engine::TrackMode::Single,
        TrackMode::Queue => lexplan_engine::TrackMode::Queue,
    }
}

fn map_event(event: EngineEvent) -> Msg {
    match event {
        EngineEvent::JobAccepted { kind, handle } => Msg::JobAccepted {
            kind: map_job_kind(kind),
            handle,
        },
        EngineEvent::Status { handle, frame } => Msg::JobStatus {
            handle,
            status: QueueStatusData {
                position: frame.position.unwrap_or(0),
                total: frame.total.unwrap_or(0),
                status: frame
                    .status
                    .as_deref()
                    .map(parse_queue_status)
                    .unwrap_or(QueueStatus::Processing),
            },
        },
        EngineEvent::JobTerminal { handle, outcome } => Msg::JobTerminal { handle, outcome },
        EngineEvent::QueueRefreshed(records) => {
            Msg::QueueRefreshed(records.into_iter().map(map_task_record).collect())
        }
        EngineEvent::Decomposition(tasks) => Msg::DecompositionReady(
            tasks
                .into_iter()
                .map(|task| DraftTask {
                    query: task.query,
                    title: task.title,
                    category: task.category,
                    priority: task.priority,
                    rationale: task.rationale,
                })
                .collect(),
        ),
        EngineEvent::RequestFailed { op, message } => Msg::RequestFailed {
            op: map_failed_op(op),
            message,
        },
        EngineEvent::SettleElapsed { generation } => Msg::SettleElapsed { generation },
    }
}

fn map_job_kind(kind: lexplan_engine::JobKind) -> JobKind {
    match kind {
        lexplan_engine::JobKind::CreatePlan => JobKind::CreatePlan,
        lexplan_engine::JobKind::ExecutePlan => JobKind::ExecutePlan,
        lexplan_engine::JobKind::GeneratePlans => JobKind::GeneratePlans,
        lexplan_engine::JobKind::ExecuteQueue => JobKind::ExecuteQueue,
    }
}

fn map_failed_op(op: lexplan_engine::FailedOp) -> FailedOp {
    match op {
        lexplan_engine::FailedOp::CreatePlan => FailedOp::CreatePlan,
        lexplan_engine::FailedOp::ExecutePlan => FailedOp::ExecutePlan,
        lexplan_engine::FailedOp::Decompose => FailedOp::Decompose,
        lexplan_engine::FailedOp::GeneratePlans => FailedOp::GeneratePlans,
        lexplan_engine::FailedOp::ExecuteQueue => FailedOp::ExecuteQueue,
        lexplan_engine::FailedOp::QueueEdit => FailedOp::QueueEdit,
        lexplan_engine::FailedOp::StatusPull => FailedOp::StatusPull,
    }
}

fn map_task_record(record: lexplan_engine::TaskRecord) -> QueueTask {
    let state = parse_task_state(&record.status).unwrap_or_else(|| {
        engine_warn!(
            "unknown task status {:?} for task {}; treating as queued",
            record.status,
            record.id
        );
        TaskState::Queued
    });
    QueueTask {
        id: record.id,
        query: record.query,
        state,
        title: record.title,
        category: record.category,
        priority: record.priority,
        rationale: record.rationale,
    }
}

fn parse_task_state(status: &str) -> Option<TaskState> {
    match status {
        "queued" => Some(TaskState::Queued),
        "processing" => Some(TaskState::Processing),
        "completed" => Some(TaskState::Completed),
        "failed" => Some(TaskState::Failed),
        _ => None,
    }
}

fn parse_queue_status(status: &str) -> QueueStatus {
    match status {
        "queued" => QueueStatus::Queued,
        "completed" => QueueStatus::Completed,
        "error" | "failed" => QueueStatus::Error,
        _ => QueueStatus::Processing,
    }
}
