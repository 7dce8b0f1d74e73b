mod frame_loop;
mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use frame_loop::LoopSummary;
pub use orchestrator::BridgeOrchestrator;
pub use types::{ComponentState, RunOptions, ShutdownReason, ShutdownTrigger};
