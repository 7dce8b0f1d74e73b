use super::frame_loop::FrameLoop;
use super::{BridgeOrchestrator, ComponentState};
use crate::config::secs;
use crate::dispatch::{Dispatcher, SenderPool};
use crate::error::{BridgeError, Result};
use crate::events::{EventMetrics, EventReceiver};
use crate::input::{InputReader, ReplayClock};
use crate::recognizer::GestureSession;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

impl BridgeOrchestrator {
    /// Register all components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing smartbridge components");

        let mut states = self.component_states.lock().await;
        states.insert("telemetry".to_string(), ComponentState::Stopped);
        states.insert("dispatch".to_string(), ComponentState::Stopped);
        states.insert("recognizer".to_string(), ComponentState::Stopped);

        // Only register keyboard component if enabled
        if self.keyboard_handler.is_some() {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all components: telemetry, senders, then the frame loop
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting smartbridge");

        let (static_classifier, dynamic_classifier) = self
            .classifiers
            .take()
            .ok_or_else(|| BridgeError::system("Bridge already started"))?;

        // Telemetry first so nothing published during startup is missed
        if let Some(receiver) = self.telemetry_receiver.take() {
            self.set_component_state("telemetry", ComponentState::Starting)
                .await;
            self.telemetry = Some(spawn_telemetry(
                receiver,
                Arc::clone(&self.metrics),
                self.telemetry_token.clone(),
            ));
            self.set_component_state("telemetry", ComponentState::Running)
                .await;
        }

        self.set_component_state("dispatch", ComponentState::Starting)
            .await;
        let (queue_tx, queue_rx) = mpsc::channel(self.config.system.dispatch_queue_capacity);
        // The pool drains on its own at shutdown and is only cancelled on timeout
        self.sender_pool = Some(SenderPool::spawn(
            self.config.dispatch.workers,
            queue_rx,
            Arc::clone(&self.transport),
            secs(self.config.dispatch.send_timeout),
            self.event_bus.clone(),
            CancellationToken::new(),
        ));
        self.set_component_state("dispatch", ComponentState::Running)
            .await;

        self.set_component_state("recognizer", ComponentState::Starting)
            .await;
        let reader = InputReader::open(&self.config.input.source)
            .await
            .map_err(|e| {
                error!("Failed to open input: {}", e);
                e
            })?;

        let origin = Instant::now();
        let session = GestureSession::new(&self.config, static_classifier, dynamic_classifier, origin);
        let dispatcher = Dispatcher::new(&self.config.dispatch, queue_tx, self.event_bus.clone());
        let frame_loop = FrameLoop::new(
            &self.config,
            session,
            dispatcher,
            self.event_bus.clone(),
            ReplayClock::new(origin, self.config.input.realtime),
        );

        let control = self
            .control_receiver
            .take()
            .ok_or_else(|| BridgeError::system("Control receiver already taken"))?;

        self.frame_loop = Some(tokio::spawn(frame_loop.run(
            reader,
            control,
            self.cancellation_token.clone(),
            self.shutdown_trigger.clone(),
        )));
        self.set_component_state("recognizer", ComponentState::Running)
            .await;
        info!(
            "Recognizer reading from {}",
            if self.config.input.source == "-" {
                "stdin"
            } else {
                self.config.input.source.as_str()
            }
        );
        if self.options.dry_run {
            info!("Dry run: commands are logged, not sent");
        }

        // Start keyboard control (only if enabled)
        if let Some(keyboard_handler) = &self.keyboard_handler {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;

            keyboard_handler.start().await.map_err(|e| {
                error!("Failed to start keyboard handler: {}", e);
                e
            })?;

            self.set_component_state("keyboard", ComponentState::Running)
                .await;
        }

        info!("smartbridge started successfully");
        Ok(())
    }
}

/// Count every event on the bus until `cancel` fires, then drain what is left
fn spawn_telemetry(
    mut receiver: EventReceiver,
    metrics: Arc<parking_lot::Mutex<EventMetrics>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = receiver.recv() => match event {
                    Ok(event) => metrics.lock().record_event(&event),
                    Err(_) => return,
                },
            }
        }

        while let Ok(Some(event)) = receiver.try_recv() {
            metrics.lock().record_event(&event);
        }
        debug!("Telemetry stopped");
    })
}
