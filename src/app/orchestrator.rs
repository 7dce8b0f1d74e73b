use super::frame_loop::LoopSummary;
use super::types::{ComponentState, RunOptions, ShutdownReason, ShutdownTrigger};
use crate::config::BridgeConfig;
use crate::dispatch::{build_transport, DispatchTransport, SenderPool};
use crate::error::{ClassifierError, Result};
use crate::events::{BridgeEvent, EventBus, EventFilter, EventMetrics, EventReceiver};
use crate::keyboard_input::{ControlCommand, KeyboardInputHandler};
use crate::recognizer::{load_classifier, GestureClassifier, RecognitionSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub(super) type ClassifierPair = (
    Option<Box<dyn GestureClassifier>>,
    Option<Box<dyn GestureClassifier>>,
);

/// Main application coordinator that manages all bridge components
pub struct BridgeOrchestrator {
    pub(super) config: BridgeConfig,
    pub(super) options: RunOptions,
    pub(super) event_bus: EventBus,
    pub(super) metrics: Arc<parking_lot::Mutex<EventMetrics>>,
    pub(super) transport: Arc<dyn DispatchTransport>,

    // Taken by start()
    pub(super) classifiers: Option<ClassifierPair>,
    pub(super) telemetry_receiver: Option<EventReceiver>,
    pub(super) control_receiver: Option<mpsc::UnboundedReceiver<ControlCommand>>,
    pub(super) control_sender: mpsc::UnboundedSender<ControlCommand>,

    // Running components
    pub(super) frame_loop: Option<JoinHandle<LoopSummary>>,
    pub(super) sender_pool: Option<SenderPool>,
    pub(super) telemetry: Option<JoinHandle<()>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_trigger: ShutdownTrigger,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
    pub(super) telemetry_token: CancellationToken,
}

impl BridgeOrchestrator {
    /// Create a new orchestrator, loading both classifiers
    ///
    /// A missing classifier disables its gate; missing both is fatal.
    pub async fn new(config: BridgeConfig, options: RunOptions) -> Result<Self> {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let telemetry_receiver = event_bus.subscribe_filtered(EventFilter::All, "telemetry");

        let static_classifier = load_gate(
            &event_bus,
            RecognitionSource::Static,
            config.models.static_model.as_deref(),
            config.buffers.feature_dim,
        );
        let dynamic_classifier = load_gate(
            &event_bus,
            RecognitionSource::Dynamic,
            config.models.dynamic_model.as_deref(),
            config.buffers.feature_dim,
        );

        if static_classifier.is_none() && dynamic_classifier.is_none() {
            return Err(ClassifierError::Unavailable {
                kind: "static and dynamic".to_string(),
                reason: "no gesture model could be loaded".to_string(),
            }
            .into());
        }

        let transport = build_transport(&config.transport, &config.dispatch, options.dry_run)?;
        let (shutdown_trigger, shutdown_receiver) = ShutdownTrigger::new();
        let (control_sender, control_receiver) = mpsc::unbounded_channel();

        let keyboard_handler = options
            .keyboard
            .then(|| KeyboardInputHandler::new(control_sender.clone()));

        Ok(Self {
            config,
            options,
            event_bus,
            metrics: Arc::new(parking_lot::Mutex::new(EventMetrics::default())),
            transport,
            classifiers: Some((static_classifier, dynamic_classifier)),
            telemetry_receiver: Some(telemetry_receiver),
            control_receiver: Some(control_receiver),
            control_sender,
            frame_loop: None,
            sender_pool: None,
            telemetry: None,
            keyboard_handler,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_trigger,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
            telemetry_token: CancellationToken::new(),
        })
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Sender for operator commands to the frame loop
    pub fn control(&self) -> mpsc::UnboundedSender<ControlCommand> {
        self.control_sender.clone()
    }

    /// Request shutdown from outside the orchestrator
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        self.shutdown_trigger.fire(reason).await
    }
}

fn load_gate(
    event_bus: &EventBus,
    source: RecognitionSource,
    path: Option<&str>,
    feature_dim: usize,
) -> Option<Box<dyn GestureClassifier>> {
    let result = match path {
        Some(path) => load_classifier(source, path, feature_dim).map_err(|e| e.to_string()),
        None => Err("no model configured".to_string()),
    };

    match result {
        Ok(classifier) => {
            info!(
                "Loaded {} classifier: {} classes over {} frame(s)",
                source,
                classifier.labels().len(),
                classifier.input_frames()
            );
            Some(classifier)
        }
        Err(reason) => {
            // The bus logs the warning; this is the only report for the session
            let _ = event_bus.publish(BridgeEvent::ClassifierUnavailable { source, reason });
            None
        }
    }
}
