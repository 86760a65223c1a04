//! GitHub provider: REST v3 for listings, GraphQL for blame

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Value, json};

use crate::blame::normalize_file_path;
use crate::client::{CommitScope, VersionControl};
use crate::dto::{BlameCommit, BlameLineRange, Commit, FileChange, PullRequest, PullRequestInfo};
use crate::error::VcsError;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE_MAX: usize = 100;

/// Blame query shape for an explicit commit SHA.
const BLAME_BY_OID: &str = "
query ($owner: String!, $name: String!, $oid: GitObjectID!, $path: String!) {
  repository(owner: $owner, name: $name) {
    object(oid: $oid) {
      ... on Commit {
        blame(path: $path) {
          ranges {
            startingLine
            endingLine
            commit {
              oid
              committedDate
              message
              additions
              deletions
              url
              author { name email user { login } }
              associatedPullRequests(first: 1) {
                nodes { number title bodyText url author { login } mergedAt state }
              }
            }
          }
        }
      }
    }
  }
}
";

/// Blame query shape for a branch or tag name.
const BLAME_BY_REF: &str = "
query ($owner: String!, $name: String!, $ref: String!, $path: String!) {
  repository(owner: $owner, name: $name) {
    ref(qualifiedName: $ref) {
      target {
        ... on Commit {
          blame(path: $path) {
            ranges {
              startingLine
              endingLine
              commit {
                oid
                committedDate
                message
                additions
                deletions
                url
                author { name email user { login } }
                associatedPullRequests(first: 1) {
                  nodes { number title bodyText url author { login } mergedAt state }
                }
              }
            }
          }
        }
      }
    }
  }
}
";

pub struct GitHubClient {
    client: reqwest::Client,
    token: Option<String>,
    owner: String,
    repo: String,
    base_url: String,
    /// Ref blamed at: branch, tag, or commit SHA. `HEAD` maps to `main`.
    reference: String,
    sha_pattern: Regex,
    /// Cache keyed by `(file, start, end, ref)`, guarded by its own
    /// mutex per the shared-resource model.
    blame_cache: Mutex<HashMap<String, Vec<BlameCommit>>>,
}

impl GitHubClient {
    pub fn new(
        token: Option<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        GitHubClient {
            client: reqwest::Client::new(),
            token,
            owner: owner.into(),
            repo: repo.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            reference: reference.into(),
            sha_pattern: Regex::new("^[a-fA-F0-9]{7,40}$").expect("static pattern"),
            blame_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the API host (GitHub Enterprise).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn repo_name(&self) -> &str {
        &self.repo
    }

    fn repo_url(&self, endpoint: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, self.owner, self.repo, endpoint)
    }

    fn ref_name(&self) -> &str {
        if self.reference == "HEAD" {
            "main"
        } else {
            &self.reference
        }
    }

    fn looks_like_sha(&self, reference: &str) -> bool {
        self.sha_pattern.is_match(reference)
    }

    fn http_error(&self, endpoint: &str, message: impl Into<String>) -> VcsError {
        VcsError::Http {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .timeout(REQUEST_TIMEOUT)
            .header("User-Agent", "rhizome-github-integration");
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    async fn rest_get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, VcsError> {
        let url = self.repo_url(endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github.v3+json")
            .query(params)
            .send()
            .await
            .map_err(|e| self.http_error(endpoint, e.to_string()))?;

        if response.status().as_u16() == 429 {
            let reset_at = response
                .headers()
                .get("X-RateLimit-Reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string();
            return Err(VcsError::RateLimited { reset_at });
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(self.http_error(endpoint, format!("status {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| VcsError::Parse(e.to_string()))
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, VcsError> {
        // GraphQL wants bearer auth, unlike the REST endpoints.
        let response = self
            .client
            .post(GRAPHQL_URL)
            .timeout(REQUEST_TIMEOUT)
            .header("User-Agent", "rhizome-github-integration")
            .header(
                "Authorization",
                format!("bearer {}", self.token.as_deref().unwrap_or_default()),
            )
            .json(&json!({"query": query, "variables": variables}))
            .send()
            .await
            .map_err(|e| self.http_error("graphql", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(self.http_error("graphql", format!("status {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VcsError::Parse(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(VcsError::GraphQl(messages.join("; ")));
        }
        Ok(body)
    }
}

/// Parse a GraphQL blame response into commits, consolidating repeated
/// SHAs onto one record with accumulated line ranges. PR information is
/// taken from the first associated PR.
pub(crate) fn parse_blame_response(response: &Value) -> Result<Vec<BlameCommit>, VcsError> {
    let repository = response
        .pointer("/data/repository")
        .ok_or_else(|| VcsError::Parse("missing data.repository".to_string()))?;

    // Both query shapes land on a Commit with a blame field.
    let blame = repository
        .pointer("/ref/target/blame")
        .or_else(|| repository.pointer("/object/blame"))
        .ok_or_else(|| VcsError::Parse("missing blame data".to_string()))?;

    let ranges = blame
        .get("ranges")
        .and_then(Value::as_array)
        .ok_or_else(|| VcsError::Parse("missing blame ranges".to_string()))?;

    let mut commits: Vec<BlameCommit> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for range in ranges {
        let commit = range
            .get("commit")
            .ok_or_else(|| VcsError::Parse("blame range without commit".to_string()))?;
        let sha = commit
            .get("oid")
            .and_then(Value::as_str)
            .ok_or_else(|| VcsError::Parse("commit without oid".to_string()))?
            .to_string();

        let line_range = BlameLineRange::new(
            range.get("startingLine").and_then(Value::as_u64).unwrap_or(0) as u32,
            range.get("endingLine").and_then(Value::as_u64).unwrap_or(0) as u32,
        );

        if let Some(&index) = seen.get(&sha) {
            commits[index].line_ranges.push(line_range);
            continue;
        }

        let pr_info = commit
            .pointer("/associatedPullRequests/nodes/0")
            .map(|pr| PullRequestInfo {
                number: pr.get("number").and_then(Value::as_u64).unwrap_or(0),
                title: string_at(pr, "title"),
                url: string_at(pr, "url"),
                author: pr.pointer("/author/login").and_then(Value::as_str).map(str::to_string),
                merged_at: pr.get("mergedAt").and_then(Value::as_str).map(str::to_string),
                state: pr
                    .get("state")
                    .and_then(Value::as_str)
                    .unwrap_or("MERGED")
                    .to_string(),
                body_text: string_at(pr, "bodyText"),
            });

        seen.insert(sha.clone(), commits.len());
        commits.push(BlameCommit {
            sha,
            message: string_at(commit, "message"),
            author: commit
                .pointer("/author/name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            author_email: commit
                .pointer("/author/email")
                .and_then(Value::as_str)
                .map(str::to_string),
            author_login: commit
                .pointer("/author/user/login")
                .and_then(Value::as_str)
                .map(str::to_string),
            timestamp: string_at(commit, "committedDate"),
            url: string_at(commit, "url"),
            additions: commit.get("additions").and_then(Value::as_u64),
            deletions: commit.get("deletions").and_then(Value::as_u64),
            line_ranges: vec![line_range],
            pr_info,
        });
    }

    Ok(commits)
}

fn string_at(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_commit(value: &Value, pr_number: Option<u64>) -> Commit {
    Commit {
        sha: string_at(value, "sha"),
        message: value
            .pointer("/commit/message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        author: value
            .pointer("/commit/author/name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        author_email: value
            .pointer("/commit/author/email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp: value
            .pointer("/commit/author/date")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        url: string_at(value, "html_url"),
        pr_number,
    }
}

#[async_trait]
impl VersionControl for GitHubClient {
    async fn fetch_pull_requests(
        &self,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<PullRequest>, VcsError> {
        let mut prs = Vec::new();
        let per_page = limit.min(PER_PAGE_MAX);
        let mut page = 1u32;

        while prs.len() < limit {
            let params = [
                ("state", "closed".to_string()),
                ("sort", "created".to_string()),
                ("direction", "desc".to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ];
            let response = self.rest_get("pulls", &params).await?;
            let Some(rows) = response.as_array() else {
                break;
            };
            if rows.is_empty() {
                break;
            }

            for pr in rows {
                // Closed but unmerged PRs are not provenance.
                let Some(merged_at) = pr.get("merged_at").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(since) = since {
                    if let Ok(created) = DateTime::parse_from_rfc3339(
                        pr.get("created_at").and_then(Value::as_str).unwrap_or(""),
                    ) {
                        if created.with_timezone(&Utc) < since {
                            continue;
                        }
                    }
                }

                prs.push(PullRequest {
                    number: pr.get("number").and_then(Value::as_u64).unwrap_or(0),
                    title: string_at(pr, "title"),
                    description: string_at(pr, "body"),
                    author: pr
                        .pointer("/user/login")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    created_at: string_at(pr, "created_at"),
                    updated_at: string_at(pr, "updated_at"),
                    merged_at: Some(merged_at.to_string()),
                    state: string_at(pr, "state"),
                    url: string_at(pr, "html_url"),
                    head_sha: pr
                        .pointer("/head/sha")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    base_sha: pr
                        .pointer("/base/sha")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    labels: pr
                        .get("labels")
                        .and_then(Value::as_array)
                        .map(|labels| {
                            labels
                                .iter()
                                .filter_map(|l| l.get("name").and_then(Value::as_str))
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                });
                if prs.len() >= limit {
                    break;
                }
            }

            if rows.len() < per_page {
                break;
            }
            page += 1;
        }

        tracing::info!(count = prs.len(), "fetched merged pull requests");
        Ok(prs)
    }

    async fn fetch_commits(
        &self,
        scope: CommitScope,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Commit>, VcsError> {
        let mut commits = Vec::new();

        match scope {
            CommitScope::PullRequest(number) => {
                let endpoint = format!("pulls/{number}/commits");
                let params = [("per_page", limit.min(PER_PAGE_MAX).to_string())];
                let response = self.rest_get(&endpoint, &params).await?;
                for row in response.as_array().map(Vec::as_slice).unwrap_or_default() {
                    commits.push(parse_commit(row, Some(number)));
                    if commits.len() >= limit {
                        break;
                    }
                }
            }
            CommitScope::Branch(branch) => {
                let per_page = limit.min(PER_PAGE_MAX);
                let mut page = 1u32;
                while commits.len() < limit {
                    let mut params = vec![
                        ("page", page.to_string()),
                        ("per_page", per_page.to_string()),
                    ];
                    if let Some(branch) = &branch {
                        params.push(("sha", branch.clone()));
                    }
                    if let Some(since) = since {
                        params.push(("since", since.to_rfc3339()));
                    }
                    let response = self.rest_get("commits", &params).await?;
                    let Some(rows) = response.as_array() else {
                        break;
                    };
                    if rows.is_empty() {
                        break;
                    }
                    for row in rows {
                        commits.push(parse_commit(row, None));
                        if commits.len() >= limit {
                            break;
                        }
                    }
                    if rows.len() < per_page {
                        break;
                    }
                    page += 1;
                }
            }
        }

        tracing::info!(count = commits.len(), "fetched commits");
        Ok(commits)
    }

    async fn fetch_commit_changes(&self, sha: &str) -> Result<Vec<FileChange>, VcsError> {
        let endpoint = format!("commits/{sha}");
        let response = self.rest_get(&endpoint, &[]).await?;

        let changes = response
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .map(|file| FileChange {
                        filename: string_at(file, "filename"),
                        status: string_at(file, "status"),
                        additions: file.get("additions").and_then(Value::as_u64).unwrap_or(0),
                        deletions: file.get("deletions").and_then(Value::as_u64).unwrap_or(0),
                        patch: string_at(file, "patch"),
                        previous_filename: file
                            .get("previous_filename")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(changes)
    }

    async fn fetch_commit_patch(&self, sha: &str) -> Result<String, VcsError> {
        let endpoint = format!("commits/{sha}");
        let url = self.repo_url(&endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .header("Accept", "application/vnd.github.patch")
            .send()
            .await
            .map_err(|e| self.http_error(&endpoint, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(self.http_error(&endpoint, format!("status {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| VcsError::Parse(e.to_string()))
    }

    async fn fetch_file_at_ref(
        &self,
        file_path: &str,
        reference: &str,
    ) -> Result<Option<String>, VcsError> {
        let endpoint = format!("contents/{file_path}");
        let params = [("ref", reference.to_string())];
        let response = match self.rest_get(&endpoint, &params).await {
            Ok(response) => response,
            Err(VcsError::Http { message, .. }) if message.contains("404") => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(content) = response.get("content").and_then(Value::as_str) else {
            return Ok(None);
        };
        let raw: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = BASE64
            .decode(raw)
            .map_err(|e| VcsError::Parse(format!("invalid base64 content: {e}")))?;
        String::from_utf8(decoded)
            .map(Some)
            .map_err(|e| VcsError::Parse(format!("file is not UTF-8: {e}")))
    }

    async fn blame_range(
        &self,
        file_path: &str,
        start_line: u32,
        end_line: u32,
    ) -> Result<Vec<BlameCommit>, VcsError> {
        let cache_key = format!("{file_path}:{start_line}-{end_line}@{}", self.reference);
        if let Some(hit) = self.blame_cache.lock().unwrap().get(&cache_key) {
            tracing::debug!(key = %cache_key, "blame cache hit");
            return Ok(hit.clone());
        }

        let clean_path = normalize_file_path(file_path, Some(&self.repo))
            .trim_start_matches('/')
            .to_string();
        let ref_name = self.ref_name();

        let response = if self.looks_like_sha(ref_name) {
            self.graphql(
                BLAME_BY_OID,
                json!({"owner": self.owner, "name": self.repo, "oid": ref_name, "path": clean_path}),
            )
            .await?
        } else {
            self.graphql(
                BLAME_BY_REF,
                json!({"owner": self.owner, "name": self.repo, "ref": ref_name, "path": clean_path}),
            )
            .await?
        };

        // Keep only the file ranges touching the requested interval.
        let mut commits = parse_blame_response(&response)?;
        commits.retain(|commit| commit.touches(start_line, end_line));

        self.blame_cache
            .lock()
            .unwrap()
            .insert(cache_key, commits.clone());
        tracing::info!(
            file = %clean_path,
            start_line,
            end_line,
            commits = commits.len(),
            "fetched blame"
        );
        Ok(commits)
    }
}
