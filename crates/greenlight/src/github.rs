//! Hosting-provider REST surface.
//!
//! The engine consumes the provider through the [`HostClient`] trait; only
//! the calls the release flow needs are modeled. [`HttpHostClient`] is the
//! production implementation over the GitHub v3 API. Lookups that can miss
//! (references, file content, releases) normalize 404 to `Ok(None)`; any
//! other unexpected status is surfaced as an error for the outer runtime to
//! retry.

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::types::{RepoKey, StatusState};

/// Target of a git reference.
#[derive(Debug, Clone, Deserialize)]
pub struct GitObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GitReference {
    object: GitObject,
}

/// Target of an annotated tag object.
#[derive(Debug, Clone, Deserialize)]
pub struct TagTarget {
    pub sha: String,
}

/// An annotated tag object, pointing at the underlying commit.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotatedTag {
    pub object: TagTarget,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}

/// One entry from the repository tag listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoTag {
    pub name: String,
    pub commit: CommitRef,
}

/// One commit status check as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub state: StatusState,
    pub updated_at: DateTime<Utc>,
}

/// Decoded repository file content.
#[derive(Debug, Clone)]
pub struct RepoContent {
    pub data: Vec<u8>,
    pub sha: String,
}

/// A release on the hosting provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl Release {
    /// Synthetic release used under dry-run so downstream logic still runs.
    pub fn stub(tag_name: &str) -> Self {
        Self {
            id: 0,
            tag_name: tag_name.to_string(),
            upload_url: String::new(),
            html_url: None,
        }
    }
}

/// Parameters for creating a release.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseParams {
    pub tag_name: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
}

/// The subset of the hosting provider's REST API the engine consumes.
///
/// Implementations must be internally thread-safe; one client is shared
/// across all events and release targets.
pub trait HostClient: Send + Sync {
    /// Resolve a reference such as `tags/v1.0.0`. `None` when absent.
    fn get_reference(&self, repo: &RepoKey, ref_name: &str) -> Result<Option<GitObject>>;

    /// Fetch an annotated tag object by its sha.
    fn get_tag(&self, repo: &RepoKey, sha: &str) -> Result<AnnotatedTag>;

    /// One page of the repository's tags.
    fn list_tags(&self, repo: &RepoKey, page: u32, per_page: u32) -> Result<Vec<RepoTag>>;

    /// One page of status checks for a commit, as ordered by the provider.
    fn list_statuses(
        &self,
        repo: &RepoKey,
        sha: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CommitStatus>>;

    /// Decoded file content at `path`, optionally at a specific ref.
    /// `None` when the file does not exist.
    fn get_content(
        &self,
        repo: &RepoKey,
        path: &str,
        ref_name: Option<&str>,
    ) -> Result<Option<RepoContent>>;

    /// The release for `tag`, if one exists.
    fn get_release_by_tag(&self, repo: &RepoKey, tag: &str) -> Result<Option<Release>>;

    /// Create a release. Mutating; callers gate this on the dry-run switch.
    fn create_release(&self, repo: &RepoKey, params: &ReleaseParams) -> Result<Release>;

    /// Upload one asset to a release. Mutating.
    fn upload_asset(
        &self,
        repo: &RepoKey,
        release: &Release,
        name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<()>;

    /// Create a new file in the repository. Mutating.
    fn create_file(&self, repo: &RepoKey, path: &str, message: &str, content: &[u8]) -> Result<()>;

    /// Update an existing file identified by its blob `sha`. Mutating.
    fn update_file(
        &self,
        repo: &RepoKey,
        path: &str,
        message: &str,
        content: &[u8],
        sha: &str,
    ) -> Result<()>;
}

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Blocking HTTP implementation of [`HostClient`].
#[derive(Debug, Clone)]
pub struct HttpHostClient {
    base_url: String,
    token: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ContentPayload {
    content: String,
    sha: String,
}

#[derive(Serialize)]
struct FilePayload<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl HttpHostClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE, token)
    }

    /// Client against a non-default API root (enterprise installs, tests).
    pub fn with_base_url(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("greenlight/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        self.authorize(self.http.get(format!("{}{path}", self.base_url)))
    }

    fn authorize(&self, builder: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        if self.token.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.token)
        }
    }
}

impl HostClient for HttpHostClient {
    fn get_reference(&self, repo: &RepoKey, ref_name: &str) -> Result<Option<GitObject>> {
        let resp = self
            .get(&format!(
                "/repos/{}/{}/git/refs/{ref_name}",
                repo.owner, repo.repo
            ))
            .send()
            .context("reference request failed")?;
        match resp.status() {
            StatusCode::OK => {
                let parsed: GitReference = resp.json().context("failed to parse reference")?;
                Ok(Some(parsed.object))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => bail!("unexpected status while resolving reference: {s}"),
        }
    }

    fn get_tag(&self, repo: &RepoKey, sha: &str) -> Result<AnnotatedTag> {
        let resp = self
            .get(&format!("/repos/{}/{}/git/tags/{sha}", repo.owner, repo.repo))
            .send()
            .context("tag object request failed")?;
        match resp.status() {
            StatusCode::OK => resp.json().context("failed to parse tag object"),
            s => bail!("unexpected status while fetching tag object: {s}"),
        }
    }

    fn list_tags(&self, repo: &RepoKey, page: u32, per_page: u32) -> Result<Vec<RepoTag>> {
        let resp = self
            .get(&format!("/repos/{}/{}/tags", repo.owner, repo.repo))
            .query(&[("per_page", per_page), ("page", page)])
            .send()
            .context("tag listing request failed")?;
        match resp.status() {
            StatusCode::OK => resp.json().context("failed to parse tag listing"),
            s => bail!("unexpected status while listing tags: {s}"),
        }
    }

    fn list_statuses(
        &self,
        repo: &RepoKey,
        sha: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CommitStatus>> {
        let resp = self
            .get(&format!(
                "/repos/{}/{}/commits/{sha}/statuses",
                repo.owner, repo.repo
            ))
            .query(&[("per_page", per_page), ("page", page)])
            .send()
            .context("status listing request failed")?;
        match resp.status() {
            StatusCode::OK => resp.json().context("failed to parse status listing"),
            s => bail!("unexpected status while listing statuses: {s}"),
        }
    }

    fn get_content(
        &self,
        repo: &RepoKey,
        path: &str,
        ref_name: Option<&str>,
    ) -> Result<Option<RepoContent>> {
        let mut builder = self.get(&format!(
            "/repos/{}/{}/contents/{path}",
            repo.owner, repo.repo
        ));
        if let Some(ref_name) = ref_name {
            builder = builder.query(&[("ref", ref_name)]);
        }
        let resp = builder.send().context("content request failed")?;
        match resp.status() {
            StatusCode::OK => {
                let payload: ContentPayload = resp.json().context("failed to parse content")?;
                let encoded: String = payload
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                let data = BASE64
                    .decode(encoded)
                    .context("failed to decode file content")?;
                Ok(Some(RepoContent {
                    data,
                    sha: payload.sha,
                }))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => bail!("unexpected status while fetching content: {s}"),
        }
    }

    fn get_release_by_tag(&self, repo: &RepoKey, tag: &str) -> Result<Option<Release>> {
        let resp = self
            .get(&format!(
                "/repos/{}/{}/releases/tags/{tag}",
                repo.owner, repo.repo
            ))
            .send()
            .context("release lookup request failed")?;
        match resp.status() {
            StatusCode::OK => {
                let release = resp.json().context("failed to parse release")?;
                Ok(Some(release))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => bail!("unexpected status while looking up release: {s}"),
        }
    }

    fn create_release(&self, repo: &RepoKey, params: &ReleaseParams) -> Result<Release> {
        let resp = self
            .authorize(
                self.http
                    .post(format!("{}/repos/{}/{}/releases", self.base_url, repo.owner, repo.repo)),
            )
            .json(params)
            .send()
            .context("release creation request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("unexpected status while creating release: {status}");
        }
        resp.json().context("failed to parse created release")
    }

    fn upload_asset(
        &self,
        _repo: &RepoKey,
        release: &Release,
        name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<()> {
        // `upload_url` is a URI template ending in `{?name,label}`.
        let url = release
            .upload_url
            .split('{')
            .next()
            .unwrap_or_default()
            .to_string();
        if url.is_empty() {
            bail!("release {} has no upload URL", release.tag_name);
        }
        let resp = self
            .authorize(self.http.post(url))
            .query(&[("name", name)])
            .header("Content-Type", content_type)
            .body(data.to_vec())
            .send()
            .context("asset upload request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("unexpected status while uploading asset {name}: {status}");
        }
        Ok(())
    }

    fn create_file(&self, repo: &RepoKey, path: &str, message: &str, content: &[u8]) -> Result<()> {
        self.put_contents(repo, path, message, content, None)
    }

    fn update_file(
        &self,
        repo: &RepoKey,
        path: &str,
        message: &str,
        content: &[u8],
        sha: &str,
    ) -> Result<()> {
        self.put_contents(repo, path, message, content, Some(sha))
    }
}

impl HttpHostClient {
    fn put_contents(
        &self,
        repo: &RepoKey,
        path: &str,
        message: &str,
        content: &[u8],
        sha: Option<&str>,
    ) -> Result<()> {
        let payload = FilePayload {
            message,
            content: BASE64.encode(content),
            sha,
        };
        let resp = self
            .authorize(self.http.put(format!(
                "{}/repos/{}/{}/contents/{path}",
                self.base_url, repo.owner, repo.repo
            )))
            .json(&payload)
            .send()
            .context("file write request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("unexpected status while writing {path}: {status}");
        }
        Ok(())
    }
}
