pub mod analyzer;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod features;
pub mod frame;
pub mod input;
pub mod keyboard_input;
pub mod recognizer;
pub mod ring_buffer;

pub use analyzer::{Mode, ModeStateMachine, MotionDetector, TransitionReason};
pub use app::{BridgeOrchestrator, ComponentState, LoopSummary, RunOptions, ShutdownReason};
pub use config::BridgeConfig;
pub use dispatch::{
    Channel, DispatchDecision, DispatchRequest, DispatchTransport, Dispatcher, SenderPool,
    VoiceCommandMapper,
};
pub use error::{BridgeError, Result};
pub use events::{BridgeEvent, EventBus, EventFilter, EventMetrics, EventReceiver};
pub use frame::{AnchorPoint, FeatureVector, Joint, PoseFrame};
pub use input::{InputReader, InputRecord};
pub use keyboard_input::{ControlCommand, KeyboardInputHandler};
pub use recognizer::{
    GestureClassifier, GestureSession, Prediction, RecognitionEvent, RecognitionSource,
};
pub use ring_buffer::BoundedBuffer;
