use std::fmt;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    InputExhausted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "received {}", signal),
            ShutdownReason::Error(error) => write!(f, "error: {}", error),
            ShutdownReason::UserRequest => write!(f, "user request"),
            ShutdownReason::InputExhausted => write!(f, "end of input"),
        }
    }
}

/// Startup options that come from the command line rather than the config file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Log commands instead of sending them
    pub dry_run: bool,
    /// Enable interactive keyboard control
    pub keyboard: bool,
}

/// Shared one-shot shutdown request; the first caller wins
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub fn new() -> (Self, oneshot::Receiver<ShutdownReason>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            receiver,
        )
    }

    /// Returns `false` if shutdown was already requested
    pub async fn fire(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
