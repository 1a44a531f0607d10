use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a repository on the hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoKey {
    pub owner: String,
    pub repo: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A tag resolved to the commit it points at. Annotated tag objects are
/// dereferenced to their target commit before a `Tag` is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name without the `refs/tags/` prefix.
    #[serde(rename = "ref")]
    pub ref_name: String,
    /// 40-hex sha of the tagged commit.
    pub sha: String,
}

impl Tag {
    pub fn new(ref_name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            sha: sha.into(),
        }
    }
}

/// State reported by a single status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
    Error,
}

/// Three-valued summary of a commit's checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateState {
    /// At least one check still running, or no checks reported yet.
    Pending,
    /// Every latest check succeeded.
    Success,
    /// At least one latest check failed or errored.
    Failed,
}

impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateState::Pending => write!(f, "pending"),
            AggregateState::Success => write!(f, "success"),
            AggregateState::Failed => write!(f, "failed"),
        }
    }
}

/// Scheduler key for a tag: `owner/repo:ref`.
pub fn release_id(repo: &RepoKey, ref_name: &str) -> String {
    format!("{repo}:{ref_name}")
}
