//! Artifact stores: where CI left the build outputs for a commit.
//!
//! A store is bound to one `(repo, sha)` pair and one download directory
//! for the lifetime of a single release attempt. Listing and downloads are
//! memoized: the file list is fetched once, and concurrent downloads of the
//! same file share one transfer. Discovery is decoupled from retrieval —
//! a missing artifact shows up as a missing entry in [`ArtifactStore::list_files`],
//! never as a download error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Result, anyhow, bail};
use greenlight_log::Logger;

use crate::types::RepoKey;

pub mod s3;
pub mod zeus;

/// One build artifact, as enumerated by a store driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Basename used for local writes and asset uploads.
    pub name: String,
    /// Driver-internal identity (object key, artifact id). Memoization key.
    pub key: String,
    /// Pre-authenticated download location, when the backend provides one.
    pub download_url: Option<String>,
    /// Declared media type, when the backend preserves it.
    pub content_type: Option<String>,
}

/// Feature hints a driver exposes to targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Whether `content_type` on listed files is meaningful.
    pub preserves_content_type: bool,
}

/// A source of build artifacts bound to one commit and download directory.
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Enumerate all artifacts for the bound commit. Memoized.
    fn list_files(&self) -> Result<Vec<ArtifactFile>>;

    /// Download one artifact into the bound directory, returning its local
    /// path. Memoized by file key; concurrent callers share one transfer.
    fn download_file(&self, file: &ArtifactFile) -> Result<PathBuf>;

    fn capabilities(&self) -> StoreCapabilities;

    /// Download many artifacts in parallel via [`ArtifactStore::download_file`].
    fn download_files(&self, files: &[ArtifactFile]) -> Result<Vec<PathBuf>> {
        thread::scope(|scope| {
            let handles: Vec<_> = files
                .iter()
                .map(|file| scope.spawn(move || self.download_file(file)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("download thread panicked")))
                })
                .collect()
        })
    }

    /// Download every artifact the store lists.
    fn download_all(&self) -> Result<Vec<PathBuf>> {
        let files = self.list_files()?;
        self.download_files(&files)
    }
}

/// Everything a store driver is bound to for one release attempt.
pub struct StoreContext {
    pub repo: RepoKey,
    pub sha: String,
    /// Download directory; owned by the surrounding release workspace.
    pub dir: PathBuf,
    pub logger: Arc<dyn Logger>,
}

/// Instantiate the store driver named in the repository configuration.
pub fn create_store(name: &str, ctx: StoreContext) -> Result<Arc<dyn ArtifactStore>> {
    match name {
        "s3" => Ok(Arc::new(s3::S3Store::from_env(ctx)?)),
        "zeus" => Ok(Arc::new(zeus::ZeusStore::from_env(ctx)?)),
        #[cfg(test)]
        "memory" => Ok(Arc::new(memory::MemoryStore::new(ctx))),
        _ => bail!("unknown artifact store driver `{name}`"),
    }
}

/// Memoized file listing shared by the drivers.
#[derive(Default)]
pub(crate) struct FileListCache {
    files: Mutex<Option<Vec<ArtifactFile>>>,
}

impl FileListCache {
    pub(crate) fn get_or_fetch(
        &self,
        fetch: impl FnOnce() -> Result<Vec<ArtifactFile>>,
    ) -> Result<Vec<ArtifactFile>> {
        let mut files = self.files.lock().unwrap();
        if let Some(files) = files.as_ref() {
            return Ok(files.clone());
        }
        let fetched = fetch()?;
        *files = Some(fetched.clone());
        Ok(fetched)
    }
}

/// Memoized downloads, keyed by file key. The first caller performs the
/// transfer while holding the per-key slot; later callers block on the slot
/// and read the settled outcome.
#[derive(Default)]
pub(crate) struct DownloadCache {
    slots: Mutex<HashMap<String, Arc<Mutex<Option<Result<PathBuf, String>>>>>>,
}

impl DownloadCache {
    pub(crate) fn get_or_download(
        &self,
        key: &str,
        download: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<PathBuf> {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };
        let mut outcome = slot.lock().unwrap();
        match outcome.as_ref() {
            Some(Ok(path)) => Ok(path.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => {
                let result = download();
                *outcome = Some(match &result {
                    Ok(path) => Ok(path.clone()),
                    Err(err) => Err(format!("{err:#}")),
                });
                result
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store for engine tests: serves seeded byte blobs and
    //! counts backend hits so memoization can be asserted.

    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug)]
    pub(crate) struct MemoryStore {
        ctx: StoreContext,
        seeded: Vec<(String, Vec<u8>)>,
        pub list_calls: AtomicUsize,
        pub download_calls: AtomicUsize,
        files: FileListCache,
        downloads: DownloadCache,
    }

    impl MemoryStore {
        pub(crate) fn new(ctx: StoreContext) -> Self {
            Self {
                ctx,
                seeded: Vec::new(),
                list_calls: AtomicUsize::new(0),
                download_calls: AtomicUsize::new(0),
                files: FileListCache::default(),
                downloads: DownloadCache::default(),
            }
        }

        pub(crate) fn with_files(mut self, seeded: Vec<(&str, &[u8])>) -> Self {
            self.seeded = seeded
                .into_iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect();
            self
        }
    }

    impl ArtifactStore for MemoryStore {
        fn list_files(&self) -> Result<Vec<ArtifactFile>> {
            self.files.get_or_fetch(|| {
                self.list_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self
                    .seeded
                    .iter()
                    .map(|(name, _)| ArtifactFile {
                        name: name.clone(),
                        key: format!("{}/{}/{name}", self.ctx.repo, self.ctx.sha),
                        download_url: None,
                        content_type: None,
                    })
                    .collect())
            })
        }

        fn download_file(&self, file: &ArtifactFile) -> Result<PathBuf> {
            self.downloads.get_or_download(&file.key, || {
                self.download_calls.fetch_add(1, Ordering::SeqCst);
                let data = self
                    .seeded
                    .iter()
                    .find(|(name, _)| *name == file.name)
                    .map(|(_, data)| data.clone())
                    .ok_or_else(|| anyhow!("artifact {} not seeded", file.name))?;
                let path = self.ctx.dir.join(&file.name);
                std::fs::write(&path, data)?;
                Ok(path)
            })
        }

        fn capabilities(&self) -> StoreCapabilities {
            StoreCapabilities::default()
        }
    }
}
