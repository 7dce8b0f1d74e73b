use super::{BridgeOrchestrator, ShutdownReason};
use crate::error::{BridgeError, Result};
use crate::events::BridgeEvent;
use std::time::SystemTime;
use tokio::signal;
use tracing::{info, warn};

impl BridgeOrchestrator {
    /// Run until a signal, the keyboard, or the end of input asks to stop,
    /// then shut down and return the exit code
    pub async fn run(&mut self) -> Result<i32> {
        info!("smartbridge is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| BridgeError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| BridgeError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", shutdown_reason);
        let _ = self.event_bus.publish(BridgeEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: shutdown_reason.to_string(),
        });

        let mut exit_code = self.shutdown().await?;
        if matches!(shutdown_reason, ShutdownReason::Error(_)) {
            exit_code = 1;
        }

        info!("smartbridge shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let trigger = self.shutdown_trigger.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    trigger
                        .fire(ShutdownReason::Signal("SIGTERM".to_string()))
                        .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let trigger = self.shutdown_trigger.clone();
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                trigger
                    .fire(ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }
}
