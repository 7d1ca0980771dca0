//! Background polling loop driving a [`JobExecutor`].

use super::job_executor::JobExecutor;
use crate::config::BatchFrameworkConfig;
use crate::error::{BatchError, BatchResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Pause after a failed polling round
const ERROR_BACKOFF: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct LoopState {
    /// Requested state, cleared by `stop`
    running: AtomicBool,
    /// Set while `run` is inside its loop
    active: AtomicBool,
    shutdown_notify: Notify,
}

/// Polls and executes due jobs until stopped
#[derive(Debug, Clone)]
pub struct ProcessingLoop {
    executor: Arc<JobExecutor>,
    config: Arc<RwLock<BatchFrameworkConfig>>,
    state: Arc<LoopState>,
}

impl ProcessingLoop {
    pub fn new(executor: Arc<JobExecutor>, config: Arc<RwLock<BatchFrameworkConfig>>) -> Self {
        Self {
            executor,
            config,
            state: Arc::new(LoopState {
                running: AtomicBool::new(false),
                active: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Run the loop on the current task until [`ProcessingLoop::stop`] is called
    pub async fn start(&self) -> BatchResult<()> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BatchError::state("processing loop is already running"));
        }
        self.run().await;
        Ok(())
    }

    /// Run the loop on a spawned task
    pub fn spawn(&self) -> BatchResult<JoinHandle<()>> {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BatchError::state("processing loop is already running"));
        }
        let this = self.clone();
        Ok(tokio::spawn(async move { this.run().await }))
    }

    /// Signal the loop to stop and wait up to `timeout` for it to finish its round
    pub async fn stop(&self, timeout: Duration) -> BatchResult<()> {
        if !self.is_running() {
            return Ok(());
        }
        self.state.running.store(false, Ordering::Release);
        self.state.shutdown_notify.notify_waiters();

        tokio::time::timeout(timeout, async {
            while self.state.active.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .map_err(|_| BatchError::infrastructure("processing loop stop timeout"))
    }

    async fn run(&self) {
        self.state.active.store(true, Ordering::Release);
        info!(executor_id = %self.executor.executor_id(), "Starting processing loop");

        while self.is_running() {
            let wait = match self.executor.run_once().await {
                Ok(summary) => {
                    if summary.polled > 0 {
                        debug!(?summary, "Processed due jobs");
                    }
                    self.config.read().await.executor.polling_interval()
                }
                Err(e) => {
                    error!(
                        executor_id = %self.executor.executor_id(),
                        error = %e,
                        "Polling round failed"
                    );
                    ERROR_BACKOFF
                }
            };

            // Registered before the check so a stop between the two still wakes the sleep
            let shutdown = self.state.shutdown_notify.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();
            if !self.is_running() {
                debug!("Stop requested during polling round");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown => {
                    debug!("Shutdown notification received");
                    break;
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
        self.state.active.store(false, Ordering::Release);
        info!(executor_id = %self.executor.executor_id(), "Processing loop ended");
    }
}
