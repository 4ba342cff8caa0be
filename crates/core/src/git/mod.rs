//! Git operations on the shared working copy.

pub mod runner;

pub use runner::{GitRunner, IntegrationRunner};
