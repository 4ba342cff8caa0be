//! Conflict detection and delegated resolution.
//!
//! - [`detector`]: output/marker heuristics deciding what counts as a
//!   textual conflict and whether a delegated resolution succeeded.
//! - [`delegate`]: the external resolution agent.

pub mod delegate;
pub mod detector;

pub use delegate::{AgentDelegate, ConflictDelegate};
pub use detector::{is_textual_conflict, judge_resolution};
