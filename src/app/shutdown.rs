use super::{BridgeOrchestrator, ComponentState};
use crate::config::secs;
use crate::error::{BridgeError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

const FRAME_LOOP_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const TELEMETRY_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl BridgeOrchestrator {
    /// Stop components in dependency order and report the exit code
    ///
    /// The frame loop stops first and releases the dispatch queue, so the
    /// senders can drain whatever it had already accepted.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Some(keyboard_handler) = &self.keyboard_handler {
            self.set_component_state("keyboard", ComponentState::Stopping)
                .await;
            match timeout(KEYBOARD_STOP_TIMEOUT, keyboard_handler.stop()).await {
                Ok(Ok(())) => {
                    self.set_component_state("keyboard", ComponentState::Stopped)
                        .await;
                }
                Ok(Err(e)) => {
                    error!("Error stopping keyboard: {}", e);
                    self.set_component_state("keyboard", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
                Err(_) => {
                    error!("keyboard component stop timeout");
                    self.set_component_state("keyboard", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
            }
        }

        if let Some(handle) = self.frame_loop.take() {
            match self
                .stop_task("recognizer", FRAME_LOOP_STOP_TIMEOUT, handle)
                .await
            {
                Ok(summary) => summary.log(),
                Err(e) => {
                    error!("Error stopping recognizer: {}", e);
                    exit_code = 1;
                }
            }
        }

        if let Some(pool) = self.sender_pool.take() {
            self.set_component_state("dispatch", ComponentState::Stopping)
                .await;
            let drain = secs(self.config.dispatch.send_timeout) + Duration::from_secs(1);
            if pool.join(drain).await {
                self.set_component_state("dispatch", ComponentState::Stopped)
                    .await;
                info!("dispatch component stopped");
            } else {
                warn!("Pending sends abandoned");
                self.set_component_state("dispatch", ComponentState::Failed)
                    .await;
                exit_code = 1;
            }
        }

        self.telemetry_token.cancel();
        if let Some(handle) = self.telemetry.take() {
            if let Err(e) = self
                .stop_task("telemetry", TELEMETRY_STOP_TIMEOUT, handle)
                .await
            {
                error!("Error stopping telemetry: {}", e);
                exit_code = 1;
            }
        }

        self.metrics.lock().log_summary();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a component task to finish, tracking its state
    async fn stop_task<T>(
        &self,
        component: &str,
        limit: Duration,
        handle: JoinHandle<T>,
    ) -> Result<T> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, handle).await {
            Ok(Ok(value)) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(BridgeError::component(component.to_string(), e.to_string()))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(BridgeError::component(
                    component.to_string(),
                    format!("stop timed out after {:?}", limit),
                ))
            }
        }
    }
}
