//! MergeWatch core library.
//!
//! Watches a repository for open pull requests and merges each one into the
//! integration branch of a shared working copy: a polling loop with dedup,
//! a bounded pool of merge workers, an exclusive lock around the
//! pull/merge/push sequence, and delegation of textual conflicts to an
//! external resolution agent.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod lock;
pub mod models;
pub mod poller;
pub mod pool;
pub mod registry;
pub mod source;
pub mod worker;

// Re-exports for convenience.
pub use config::MergeWatchConfig;
pub use conflict::{AgentDelegate, ConflictDelegate};
pub use git::{GitRunner, IntegrationRunner};
pub use models::{Change, MergeOutcome, WorkerReport};
pub use poller::Poller;
pub use pool::WorkerPool;
pub use registry::ProcessedRegistry;
pub use source::{ChangeSource, GitHubChangeSource};
pub use worker::{MergeWorker, WorkerSettings};
