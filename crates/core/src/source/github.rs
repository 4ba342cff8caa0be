//! GitHub REST API change source.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::ChangeSource;
use crate::errors::SourceError;
use crate::models::Change;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

impl From<PullRequest> for Change {
    fn from(pr: PullRequest) -> Self {
        Change::new(pr.number, pr.title, pr.head.ref_name)
    }
}

/// Lists open pull requests for one repository and base branch.
#[derive(Clone)]
pub struct GitHubChangeSource {
    http: reqwest::Client,
    api_url: String,
    repo: String,
    base_branch: String,
    token: Option<String>,
}

impl GitHubChangeSource {
    pub fn new(
        api_url: impl Into<String>,
        repo: impl Into<String>,
        base_branch: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, SourceError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("mergewatch/0.1"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        let source = Self {
            http,
            api_url,
            repo: repo.into(),
            base_branch: base_branch.into(),
            token,
        };
        info!(
            api_url = %source.api_url,
            repo = %source.repo,
            base = %source.base_branch,
            authenticated = source.token.is_some(),
            "created GitHubChangeSource"
        );
        Ok(source)
    }

    pub fn pulls_url(&self) -> String {
        format!("{}/repos/{}/pulls", self.api_url, self.repo)
    }

    /// Fetch open pull requests targeting the base branch.
    #[instrument(skip(self), fields(repo = %self.repo, base = %self.base_branch))]
    pub async fn get_open_pull_requests(&self) -> Result<Vec<PullRequest>, SourceError> {
        let mut req = self.http.get(self.pulls_url()).query(&[
            ("state", "open"),
            ("base", self.base_branch.as_str()),
            ("per_page", "100"),
        ]);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        check_response(&resp)?;
        let body = resp.text().await?;
        let prs = parse_pull_requests(&body)?;
        debug!(count = prs.len(), "fetched open pull requests");
        Ok(prs)
    }
}

#[async_trait]
impl ChangeSource for GitHubChangeSource {
    async fn list_open_changes(&self) -> Result<Vec<Change>, SourceError> {
        let prs = self.get_open_pull_requests().await?;
        Ok(prs
            .into_iter()
            .filter(|pr| pr.base.ref_name == self.base_branch)
            .map(Change::from)
            .collect())
    }
}

fn parse_pull_requests(body: &str) -> Result<Vec<PullRequest>, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::ParseError(e.to_string()))
}

fn check_response(resp: &reqwest::Response) -> Result<(), SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(SourceError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status.as_u16() == 429 {
        let reset = resp
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(SourceError::RateLimited { reset_at: reset });
    }
    Err(SourceError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}
