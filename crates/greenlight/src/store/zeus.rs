//! Build-aggregator artifact store.
//!
//! The aggregator collects per-commit artifacts from multiple CI systems
//! and exposes them over a JSON API; every listed artifact carries a
//! pre-authenticated download URL. Authentication is a bearer token for
//! both the listing and the downloads.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{ArtifactFile, ArtifactStore, DownloadCache, FileListCache, StoreCapabilities, StoreContext};

/// API token; the driver is unusable without it.
pub const TOKEN_ENV: &str = "ZEUS_API_TOKEN";
/// Server root, default `https://zeus.ci`.
pub const SERVER_ENV: &str = "ZEUS_SERVER_URL";

const DEFAULT_SERVER: &str = "https://zeus.ci";

#[derive(Debug, Deserialize)]
struct ArtifactPayload {
    id: String,
    name: String,
    download_url: String,
    #[serde(rename = "type")]
    content_type: Option<String>,
}

#[derive(Debug)]
pub struct ZeusStore {
    ctx: StoreContext,
    server: String,
    token: String,
    http: Client,
    files: FileListCache,
    downloads: DownloadCache,
}

impl ZeusStore {
    /// Build the driver from the process environment. Fails when
    /// `ZEUS_API_TOKEN` is unset.
    pub fn from_env(ctx: StoreContext) -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| anyhow!("{TOKEN_ENV} must be set for the zeus artifact store"))?;
        let server = std::env::var(SERVER_ENV)
            .ok()
            .filter(|server| !server.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        Self::new(ctx, server, token)
    }

    pub fn new(ctx: StoreContext, server: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("greenlight/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            ctx,
            server: server.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
            files: FileListCache::default(),
            downloads: DownloadCache::default(),
        })
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.server, url.trim_start_matches('/'))
        }
    }
}

impl ArtifactStore for ZeusStore {
    fn list_files(&self) -> Result<Vec<ArtifactFile>> {
        self.files.get_or_fetch(|| {
            let url = format!(
                "{}/api/repos/gh/{}/{}/releases/{}/artifacts",
                self.server, self.ctx.repo.owner, self.ctx.repo.repo, self.ctx.sha
            );
            let resp = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .context("artifact listing request failed")?;
            let payloads: Vec<ArtifactPayload> = match resp.status() {
                StatusCode::OK => resp.json().context("failed to parse artifact listing")?,
                // No release for this commit yet: nothing to publish.
                StatusCode::NOT_FOUND => Vec::new(),
                s => bail!("unexpected status while listing artifacts: {s}"),
            };
            let files = payloads
                .into_iter()
                .map(|payload| ArtifactFile {
                    name: payload.name,
                    key: payload.id,
                    download_url: Some(payload.download_url),
                    content_type: payload.content_type,
                })
                .collect::<Vec<_>>();
            self.ctx.logger.debug(&format!(
                "found {} artifacts for {}@{}",
                files.len(),
                self.ctx.repo,
                self.ctx.sha
            ));
            Ok(files)
        })
    }

    fn download_file(&self, file: &ArtifactFile) -> Result<PathBuf> {
        self.downloads.get_or_download(&file.key, || {
            let url = file
                .download_url
                .as_deref()
                .ok_or_else(|| anyhow!("artifact {} has no download URL", file.name))?;
            let resp = self
                .http
                .get(self.absolute(url))
                .bearer_auth(&self.token)
                .send()
                .context("artifact download request failed")?;
            let status = resp.status();
            if !status.is_success() {
                bail!("unexpected status while downloading {}: {status}", file.name);
            }
            let data = resp.bytes().context("failed to read artifact body")?;

            let path = self.ctx.dir.join(&file.name);
            let mut local = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            local.write_all(&data)?;
            // Flush to disk so peer targets reading the path see the full
            // file immediately.
            local.sync_all()?;
            self.ctx
                .logger
                .debug(&format!("downloaded {} ({} bytes)", file.name, data.len()));
            Ok(path)
        })
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            preserves_content_type: true,
        }
    }
}
