//! Turn orchestration: rounds, relaunch guard, events.

pub mod events;
pub mod guard;
pub mod runner;
pub mod types;

pub use events::*;
pub use guard::{RelaunchGuard, RelaunchState, RoundBudget};
pub use runner::*;
pub use types::*;
