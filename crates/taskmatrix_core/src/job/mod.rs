//! Recurring recalculation of derived task classification.
//!
//! # Responsibility
//! - Re-evaluate urgency and quadrant of every open task per tick.
//! - Drive ticks from a fixed schedule without overlapping runs.
//!
//! # Invariants
//! - A failed tick leaves every task untouched and never stops the scheduler.

pub mod recalc;
pub mod scheduler;
