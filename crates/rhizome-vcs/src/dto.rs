//! Data exchanged with version-control providers

use serde::{Deserialize, Serialize};

/// A contiguous line interval attributed to one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameLineRange {
    pub start: u32,
    pub end: u32,
}

impl BlameLineRange {
    pub fn new(start: u32, end: u32) -> Self {
        BlameLineRange { start, end }
    }

    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        !(self.end < start || self.start > end)
    }
}

/// Pull request details attached to a blame commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub merged_at: Option<String>,
    pub state: String,
    pub body_text: String,
}

/// One commit that authored lines of a blamed range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameCommit {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub author_email: Option<String>,
    pub author_login: Option<String>,
    pub timestamp: String,
    pub url: String,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    /// All line ranges this commit is responsible for; ranges from
    /// repeated blame hits consolidate onto one record per SHA.
    pub line_ranges: Vec<BlameLineRange>,
    pub pr_info: Option<PullRequestInfo>,
}

impl BlameCommit {
    /// Whether any of this commit's line ranges touches the interval.
    pub fn touches(&self, start: u32, end: u32) -> bool {
        self.line_ranges.iter().any(|r| r.overlaps(start, end))
    }
}

/// A merged pull request as listed by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
    pub merged_at: Option<String>,
    pub state: String,
    pub url: String,
    pub head_sha: String,
    pub base_sha: String,
    pub labels: Vec<String>,
}

/// A commit as listed by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: String,
    pub url: String,
    pub pr_number: Option<u64>,
}

/// A file touched by a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: String,
    pub previous_filename: Option<String>,
}
