use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use chrono::Utc;
use engine_logging::{engine_error, engine_info};
use lexplan_core::{update, AppState, AppViewModel, Effect, Msg, WorkflowStage};
use lexplan_engine::EngineConfig;

use super::console;
use super::effects::EffectRunner;
use super::logging;
use super::persistence::SessionStore;

const SERVER_URL_VAR: &str = "LEXPLAN_SERVER";

pub(crate) fn run_app() {
    logging::initialize();

    let config = match std::env::var(SERVER_URL_VAR) {
        Ok(url) => EngineConfig::for_base_url(&url),
        Err(_) => EngineConfig::default(),
    };
    engine_info!("lexplan starting against {}", config.base_url);

    let store_dir = std::env::current_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("."))
        .join(".lexplan");
    let store = SessionStore::new(store_dir);

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let runner = match EffectRunner::new(config, msg_tx.clone()) {
        Ok(runner) => runner,
        Err(err) => {
            engine_error!("engine startup failed: {}", err);
            eprintln!("Could not start the analysis engine: {err}");
            return;
        }
    };

    if let Some(snapshot) = store.load() {
        let _ = msg_tx.send(Msg::RestoreSession(snapshot));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    console::spawn_input_thread(msg_tx, shutdown.clone());
    println!("Lexplan console. Type 'help' for commands.");

    let mut state = AppState::new();
    loop {
        let msg = match msg_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(msg) => msg,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        state = dispatch(state, msg, &runner, &store);
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
    engine_info!("lexplan shutting down");
}

/// One turn of the loop: update, run effects, then render and persist once
/// if the state changed. Snapshot clearing happens before the save so a
/// just-closed session is never written back.
fn dispatch(state: AppState, msg: Msg, runner: &EffectRunner, store: &SessionStore) -> AppState {
    let (mut state, effects) = update(state, msg);

    let mut cleared = false;
    let mut remaining = Vec::with_capacity(effects.len());
    for effect in effects {
        if matches!(effect, Effect::ClearSnapshot) {
            store.clear();
            cleared = true;
        } else {
            remaining.push(effect);
        }
    }
    runner.run(remaining);

    if state.consume_dirty() {
        render(&state.view());
        if cleared {
            engine_info!("session snapshot cleared; skipping save");
        } else {
            store.save(&state.snapshot(Utc::now().to_rfc3339()));
        }
    }
    state
}

fn render(view: &AppViewModel) {
    println!("-- {}", stage_label(view.stage));
    if !view.query.is_empty() {
        println!("   query: {}", view.query);
    }
    if let Some(plan_id) = &view.plan_id {
        let eta = view
            .estimated_time_seconds
            .map(|secs| format!(", est. {secs}s"))
            .unwrap_or_default();
        println!("   plan: {plan_id}{eta}");
    }
    if let Some(status) = view.queue_status {
        println!(
            "   position {}/{} ({:?})",
            status.position, status.total, status.status
        );
    }
    for row in &view.queue {
        let title = row.title.as_deref().unwrap_or(&row.query);
        println!("   [{:?}] {} {}", row.state, row.id, title);
    }
    if view.has_result {
        println!("   result ready");
    }
    if let Some(handle) = &view.tracking_job {
        println!("   tracking job {handle}");
    }
    if let Some(error) = &view.error {
        println!("   error: {error}");
    }
}

fn stage_label(stage: WorkflowStage) -> &'static str {
    match stage {
        WorkflowStage::Input => "input",
        WorkflowStage::QueueManagement => "queue",
        WorkflowStage::CreatingPlan => "creating plan",
        WorkflowStage::Preview => "preview",
        WorkflowStage::PreviewBatch => "batch preview",
        WorkflowStage::Executing => "executing",
        WorkflowStage::ExecutingQueue => "executing queue",
        WorkflowStage::QueueResults => "queue results",
    }
}
