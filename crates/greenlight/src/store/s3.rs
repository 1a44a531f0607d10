//! Object-storage artifact store.
//!
//! CI uploads build outputs under `owner/repo/sha/` in a bucket; this
//! driver lists that prefix and downloads objects by key. The AWS SDK is
//! async, so the driver owns a small current-thread runtime and bridges
//! every call with `block_on`; the runtime lock serializes SDK access,
//! which is fine for the handful of objects a release carries.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;

use super::{ArtifactFile, ArtifactStore, FileListCache, DownloadCache, StoreCapabilities, StoreContext};
use crate::types::RepoKey;

/// Bucket holding build artifacts.
pub const BUCKET_ENV: &str = "S3_BUCKET";
/// Optional static credentials; the SDK's default chain applies otherwise.
pub const ACCESS_KEY_ENV: &str = "S3_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "S3_SECRET_KEY";
/// Optional region override, default `us-east-1`.
pub const REGION_ENV: &str = "S3_REGION";
/// Optional custom endpoint for S3-compatible services.
pub const ENDPOINT_ENV: &str = "S3_ENDPOINT";

#[derive(Debug)]
pub struct S3Store {
    ctx: StoreContext,
    bucket: String,
    client: Client,
    runtime: Mutex<tokio::runtime::Runtime>,
    files: FileListCache,
    downloads: DownloadCache,
}

/// Key prefix for one commit's artifacts.
fn artifact_prefix(repo: &RepoKey, sha: &str) -> String {
    format!("{}/{}/{sha}/", repo.owner, repo.repo)
}

fn object_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl S3Store {
    /// Build the driver from the process environment. Fails when
    /// `S3_BUCKET` is unset; credentials fall back to the SDK chain.
    pub fn from_env(ctx: StoreContext) -> Result<Self> {
        let bucket = std::env::var(BUCKET_ENV)
            .ok()
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| anyhow!("{BUCKET_ENV} must be set for the s3 artifact store"))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start s3 runtime")?;

        let region = std::env::var(REGION_ENV).unwrap_or_else(|_| "us-east-1".to_string());
        let config = runtime.block_on(async {
            let mut loader =
                aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
            if let (Ok(key), Ok(secret)) = (
                std::env::var(ACCESS_KEY_ENV),
                std::env::var(SECRET_KEY_ENV),
            ) {
                loader =
                    loader.credentials_provider(Credentials::new(key, secret, None, None, "greenlight"));
            }
            if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
                loader = loader.endpoint_url(endpoint);
            }
            loader.load().await
        });
        let client = Client::new(&config);

        Ok(Self {
            ctx,
            bucket,
            client,
            runtime: Mutex::new(runtime),
            files: FileListCache::default(),
            downloads: DownloadCache::default(),
        })
    }
}

impl ArtifactStore for S3Store {
    fn list_files(&self) -> Result<Vec<ArtifactFile>> {
        self.files.get_or_fetch(|| {
            let runtime = self.runtime.lock().unwrap();
            let prefix = artifact_prefix(&self.ctx.repo, &self.ctx.sha);
            let mut out = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&prefix);
                if let Some(token) = &token {
                    request = request.continuation_token(token);
                }
                let resp = runtime.block_on(request.send()).map_err(|err| {
                    anyhow!("failed to list s3://{}/{prefix}: {err}", self.bucket)
                })?;
                for object in resp.contents() {
                    let Some(key) = object.key() else { continue };
                    if key.ends_with('/') {
                        continue;
                    }
                    out.push(ArtifactFile {
                        name: object_basename(key).to_string(),
                        key: key.to_string(),
                        download_url: None,
                        content_type: None,
                    });
                }
                match resp.next_continuation_token() {
                    Some(next) => token = Some(next.to_string()),
                    None => break,
                }
            }
            self.ctx
                .logger
                .debug(&format!("found {} artifacts under {prefix}", out.len()));
            Ok(out)
        })
    }

    fn download_file(&self, file: &ArtifactFile) -> Result<PathBuf> {
        self.downloads.get_or_download(&file.key, || {
            let runtime = self.runtime.lock().unwrap();
            let resp = runtime
                .block_on(
                    self.client
                        .get_object()
                        .bucket(&self.bucket)
                        .key(&file.key)
                        .send(),
                )
                .map_err(|err| {
                    anyhow!("failed to fetch s3://{}/{}: {err}", self.bucket, file.key)
                })?;
            let data = runtime
                .block_on(resp.body.collect())
                .map_err(|err| anyhow!("failed to read s3://{}/{}: {err}", self.bucket, file.key))?
                .into_bytes();

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
            preserves_content_type: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenlight_log::MemoryLogger;
    use std::sync::Arc;

    fn ctx() -> StoreContext {
        StoreContext {
            repo: RepoKey::new("acme", "widget"),
            sha: "abc123".to_string(),
            dir: std::env::temp_dir(),
            logger: Arc::new(MemoryLogger::default()),
        }
    }

    #[test]
    fn prefix_is_owner_repo_sha() {
        let repo = RepoKey::new("acme", "widget");
        assert_eq!(artifact_prefix(&repo, "abc123"), "acme/widget/abc123/");
    }

    #[test]
    fn basename_strips_prefix() {
        assert_eq!(object_basename("acme/widget/abc/tool.tgz"), "tool.tgz");
        assert_eq!(object_basename("flat.bin"), "flat.bin");
    }

    #[test]
    fn missing_bucket_is_an_error() {
        temp_env::with_var_unset(BUCKET_ENV, || {
            let err = S3Store::from_env(ctx()).unwrap_err();
            assert!(err.to_string().contains(BUCKET_ENV), "{err}");
        });
    }

    #[test]
    fn empty_bucket_is_an_error() {
        temp_env::with_var(BUCKET_ENV, Some(""), || {
            assert!(S3Store::from_env(ctx()).is_err());
        });
    }
}
