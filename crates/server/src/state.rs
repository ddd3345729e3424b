//! Application state shared across handlers.

use crate::metrics;
use crate::orchestrator::{FileSync, LoopExit, LoopSettings};
use konakore_core::config::AppConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Result of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    NotRunning,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Single-flight owner of the adaptive sync loop.
///
/// Start, stop and status all go through one mutex so a trigger can never
/// launch a second loop next to a live one. A loop that stopped on its own
/// counts as not running and can be started again.
pub struct SyncController {
    sync: Arc<FileSync>,
    settings: LoopSettings,
    current: Mutex<Option<RunningLoop>>,
    reconciling: Arc<AtomicBool>,
}

impl SyncController {
    pub fn new(sync: Arc<FileSync>, settings: LoopSettings) -> Self {
        Self {
            sync,
            settings,
            current: Mutex::new(None),
            reconciling: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Launch the loop unless one is already active.
    pub async fn start(&self) -> StartOutcome {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(RunningLoop::is_active) {
            info!("file sync already running, ignoring start");
            return StartOutcome::AlreadyRunning;
        }

        // A loop that was told to stop may still hold the job lock. The new
        // task waits for it so the mutex is never held across that wait.
        let previous = current.take().map(|running| running.handle);

        let cancel = CancellationToken::new();
        let sync = self.sync.clone();
        let settings = self.settings.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
            {
                warn!(error = %e, "previous file sync loop ended abnormally");
            }
            metrics::LOOP_RUNNING.set(1);
            info!("file sync loop started");
            match sync.run_loop(&settings, &token).await {
                Ok(LoopExit::Idle) => info!("file sync loop stopped after idling"),
                Ok(LoopExit::Cancelled) => info!("file sync loop stopped on request"),
                Ok(LoopExit::LockHeld) => info!("file sync loop owned elsewhere"),
                Err(e) => error!(error = %e, "file sync loop failed"),
            }
            metrics::LOOP_RUNNING.set(0);
        });

        *current = Some(RunningLoop { cancel, handle });
        StartOutcome::Started
    }

    /// Ask a running loop to stop. Returns without waiting for it.
    pub async fn stop(&self) -> StopOutcome {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(running) if running.is_active() => {
                running.cancel.cancel();
                info!("file sync stop requested");
                StopOutcome::Stopping
            }
            _ => StopOutcome::NotRunning,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(RunningLoop::is_active)
    }

    /// Start a background reconciliation pass. False if one is in progress.
    pub fn reconcile_in_background(&self) -> bool {
        if self.reconciling.swap(true, Ordering::SeqCst) {
            return false;
        }
        let sync = self.sync.clone();
        let flag = self.reconciling.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.reconcile().await {
                error!(error = %e, "requested reconciliation failed");
            }
            flag.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn shutdown(&self) {
        let running = self.current.lock().await.take();
        if let Some(running) = running {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!(error = %e, "file sync loop ended abnormally during shutdown");
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Owner of the sync loop.
    pub controller: Arc<SyncController>,
}

impl AppState {
    pub fn new(config: AppConfig, sync: Arc<FileSync>) -> Self {
        let settings = LoopSettings::from_config(&config.file_sync);
        Self {
            config: Arc::new(config),
            controller: Arc::new(SyncController::new(sync, settings)),
        }
    }
}
