mod mode;
mod motion;

#[cfg(test)]
mod tests;

pub use mode::{Mode, ModeStateMachine, ModeTransition, TransitionReason};
pub use motion::{MotionDetector, MotionUpdate, MovementEpisode};
