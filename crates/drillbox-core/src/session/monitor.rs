//! Background task answering `drill-check` requests during the interactive
//! phase.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::control::ControlHandshake;
use crate::environment::Environment;
use crate::obs;
use crate::scenario::Scenario;
use crate::validation::Validator;

/// Lets the in-sandbox helper finish writing the marker before we act.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Serializes every validation pass of one session.
pub type ValidationGate = Arc<Mutex<()>>;

/// Everything the monitor task needs, moved into it on spawn.
pub struct MonitorTask {
    pub session_id: String,
    pub handshake: ControlHandshake,
    pub environment: Arc<dyn Environment>,
    pub scenario: Arc<Scenario>,
    pub validator: Validator,
    pub gate: ValidationGate,
    pub interval: Duration,
}

/// Handle to a running monitor. Must be stopped with [`ValidationMonitor::stop`].
#[derive(Debug)]
pub struct ValidationMonitor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
    served: Arc<AtomicU32>,
}

impl ValidationMonitor {
    pub fn spawn(task: MonitorTask) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let served = Arc::new(AtomicU32::new(0));
        let handle = tokio::spawn(run(task, stop_rx, served.clone()));
        Self {
            stop_tx,
            handle,
            served,
        }
    }

    /// Requests answered so far.
    pub fn served(&self) -> u32 {
        self.served.load(Ordering::SeqCst)
    }

    /// Signal the task and wait up to `wait` for it to exit, aborting it
    /// otherwise. Returns the number of requests it answered.
    pub async fn stop(self, wait: Duration) -> u32 {
        let Self {
            stop_tx,
            mut handle,
            served,
        } = self;
        let _ = stop_tx.send(true);

        match tokio::time::timeout(wait, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "validation monitor task failed"),
            Err(_) => {
                warn!(
                    wait_ms = wait.as_millis() as u64,
                    "validation monitor did not stop in time, aborting"
                );
                handle.abort();
            }
        }
        served.load(Ordering::SeqCst)
    }
}

async fn run(task: MonitorTask, mut stop_rx: watch::Receiver<bool>, served: Arc<AtomicU32>) {
    let mut ticker = tokio::time::interval(task.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    debug!(session_id = %task.session_id, "validation monitor started");

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *stop_rx.borrow() {
                    break;
                }
                if task.handshake.take_request().await {
                    serve_request(&task).await;
                    served.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    debug!(session_id = %task.session_id, "validation monitor stopped");
}

async fn serve_request(task: &MonitorTask) {
    tokio::time::sleep(SETTLE_DELAY).await;

    let result = {
        let _slot = task.gate.lock().await;
        task.validator
            .validate(task.environment.as_ref(), &task.scenario)
            .await
    };
    obs::emit_progress_check_served(&task.session_id, result.checks_passed, result.checks_total);

    if let Err(e) = task.handshake.write_response(&result.feedback).await {
        warn!(session_id = %task.session_id, error = %e, "could not write progress response");
    }
}
