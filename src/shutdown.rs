//! Graceful shutdown coordination for the daemon's background tasks.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ShutdownManager {
    /// Cancelled once a shutdown signal arrives
    cancel_token: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
    timeout: Duration,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            task_handles: Vec::new(),
            timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// How long registered tasks get to finish after cancellation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn register_task(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Wait for Ctrl+C, then cancel and drain every registered task.
    pub async fn wait_for_shutdown(self) {
        self.shutdown_on(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;
    }

    /// Like [`wait_for_shutdown`](Self::wait_for_shutdown) but triggered by
    /// an arbitrary future. Returns true if every task finished in time.
    pub async fn shutdown_on<F>(mut self, signal: F) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => tracing::info!("🛑 Shutdown signal received"),
            _ = self.cancel_token.cancelled() => tracing::info!("🛑 Shutdown requested"),
        }

        self.cancel_token.cancel();

        let handles: Vec<_> = self.task_handles.drain(..).collect();
        let drain = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!("Task ended abnormally during shutdown: {}", e);
                }
            }
        };

        match tokio::time::timeout(self.timeout, drain).await {
            Ok(()) => {
                tracing::info!("✓ All tasks shut down gracefully");
                true
            }
            Err(_) => {
                tracing::warn!("⏱️  Shutdown timeout: Some tasks did not complete");
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
