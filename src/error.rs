use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BridgeError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading or running a gesture classifier
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("{kind} classifier unavailable: {reason}")]
    Unavailable { kind: String, reason: String },

    #[error("Failed to load model from {path}: {details}")]
    ModelLoad { path: String, details: String },

    #[error("Invalid model: {details}")]
    InvalidModel { details: String },

    #[error("Input shape mismatch: expected {expected_frames}x{expected_dim}, got {frames}x{dim}")]
    InputShape {
        expected_frames: usize,
        expected_dim: usize,
        frames: usize,
        dim: usize,
    },

    #[error("Inference failed: {details}")]
    Inference { details: String },
}

/// Errors raised on the actuator side of the dispatch boundary
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("Transport error: {details}")]
    Transport { details: String },

    #[error("Actuator rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Send timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatch queue is closed")]
    QueueClosed,
}

/// A pose frame that cannot be used this tick
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Feature vector has {actual} values, expected {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("Non-finite value in {field}")]
    NonFinite { field: &'static str },

    #[error("Pose has {actual} joints, expected {expected}")]
    JointCount { expected: usize, actual: usize },

    #[error("Pose carries neither joints nor {field}")]
    MissingFeatures { field: &'static str },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to open input {path}: {details}")]
    Open { path: String, details: String },

    #[error("Malformed record on line {line}: {details}")]
    Parse { line: usize, details: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
