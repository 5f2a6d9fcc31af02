//! Scheduled, lock-guarded polling of monitored endpoints
//!
//! Each endpoint owns one [`PollCycleEngine`]: its session, resolved counter
//! metadata and query window. The [`PollScheduler`] ticks every engine at a
//! fixed rate; ticks of one endpoint never overlap.

mod engine;
mod scheduler;
mod window;

#[cfg(test)]
mod tests;

pub use engine::{CycleReport, EngineConfig, PollCycleEngine, TickOutcome};
pub use scheduler::{PollScheduler, PollSchedulerBuilder};
pub use window::{PollWindow, Window};
