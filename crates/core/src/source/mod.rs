//! Sources of open pull requests.

pub mod github;

pub use github::GitHubChangeSource;

use async_trait::async_trait;

use crate::errors::SourceError;
use crate::models::Change;

/// Lists the open changes that target the integration branch.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// All currently open changes, in the order the platform reports them.
    async fn list_open_changes(&self) -> Result<Vec<Change>, SourceError>;
}
