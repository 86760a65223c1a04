//! The provider-neutral version-control capability set

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::dto::{BlameCommit, Commit, FileChange, PullRequest};
use crate::error::VcsError;

/// Which commits to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitScope {
    /// Commits of a branch; `None` means the default branch.
    Branch(Option<String>),
    /// Commits belonging to one pull request.
    PullRequest(u64),
}

/// Everything the provenance engine needs from a provider.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Merged pull requests, newest first, paginated up to `limit`.
    async fn fetch_pull_requests(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PullRequest>, VcsError>;

    async fn fetch_commits(
        &self,
        scope: CommitScope,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Commit>, VcsError>;

    /// File-level changes of one commit.
    async fn fetch_commit_changes(&self, sha: &str) -> Result<Vec<FileChange>, VcsError>;

    /// The complete unified diff of one commit.
    async fn fetch_commit_patch(&self, sha: &str) -> Result<String, VcsError>;

    /// File contents at a ref; `None` when the file does not exist there.
    async fn fetch_file_at_ref(
        &self,
        file_path: &str,
        reference: &str,
    ) -> Result<Option<String>, VcsError>;

    /// Commits that authored lines in `[start_line, end_line]` of the
    /// file, each with its own line ranges and associated PR.
    async fn blame_range(
        &self,
        file_path: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Vec<BlameCommit>, VcsError>;
}
