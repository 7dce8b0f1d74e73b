pub mod arbiter;
mod classifier;
mod session;


pub use arbiter::{GateContext, GatePolicy, RecognitionEvent, RecognitionSource};
pub use classifier::{
    load_classifier, CentroidClassifier, CentroidModel, GestureClassifier, LabelMap, Prediction,
};
pub use session::{FrameOutcome, GestureSession, SessionStats, SessionStatus};
