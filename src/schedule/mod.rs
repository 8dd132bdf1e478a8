//! # Time-Window Evaluation
//!
//! Day-of-week and time-of-day access windows, including windows that wrap
//! midnight. Entries on a rule combine disjunctively; within an entry the
//! day and time components must both hold, and absent components are
//! permissive. Evaluation is UTC in this version.

mod evaluator;

pub use evaluator::{evaluate, ScheduleVerdict};
