//! Breaks: day planning, the per-break state machine and auto-start.

mod runtime;
mod scanner;
mod scheduler;

pub use runtime::{BreakRuntime, StartBreak};
pub use scanner::{due_break, AutoStartScanner};
pub use scheduler::{BreakPlan, BreakScheduler, PlannedBreak};
