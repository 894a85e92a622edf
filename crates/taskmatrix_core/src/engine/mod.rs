//! Pure classification rules.
//!
//! # Responsibility
//! - Map importance and urgency to an Eisenhower quadrant.
//! - Derive urgency and deadline status from an explicit evaluation time.
//! - Aggregate timing and quadrant statistics over task collections.
//!
//! # Invariants
//! - No function in this module reads the system clock.

pub mod quadrant;
pub mod timing;
pub mod urgency;
