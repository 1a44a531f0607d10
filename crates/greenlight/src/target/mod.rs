//! Release targets: one driver per publishing destination.
//!
//! A target receives everything one destination needs — the hosting
//! client, the bound artifact store, the resolved tag, its own options
//! from `release.yml` — and performs the publish. Drivers whose
//! credentials or configuration are absent skip cleanly with a log line;
//! that is not a failure. Real failures are isolated by the dispatcher so
//! one target cannot cancel its peers.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use greenlight_log::Logger;
use thiserror::Error;

use crate::config::TargetSpec;
use crate::github::HostClient;
use crate::store::ArtifactStore;
use crate::types::{RepoKey, Tag, release_id};

pub mod brew;
pub mod crates_io;
pub mod docker;
pub mod github;
pub mod npm;
pub mod pod;
pub mod pypi;

/// Configuration errors surfaced by [`run_target`].
#[derive(Debug, Error)]
pub enum TargetError {
    /// The spec was null, empty, or had no `name` key.
    #[error("release target specification is missing a driver name")]
    MissingSpec,
    /// No driver is registered under this name.
    #[error("unknown release target `{0}`")]
    Unknown(String),
}

/// A target spec normalized to `{name, options}`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSpec {
    pub name: String,
    pub options: serde_yaml::Mapping,
}

impl ResolvedSpec {
    /// Normalize a raw spec entry.
    pub fn resolve(spec: &TargetSpec) -> Result<Self, TargetError> {
        match spec {
            TargetSpec::Name(name) if !name.trim().is_empty() => Ok(Self {
                name: name.trim().to_string(),
                options: serde_yaml::Mapping::new(),
            }),
            TargetSpec::Name(_) => Err(TargetError::MissingSpec),
            TargetSpec::Table(options) => {
                let name = options
                    .get("name")
                    .and_then(serde_yaml::Value::as_str)
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or(TargetError::MissingSpec)?;
                Ok(Self {
                    name: name.to_string(),
                    options: options.clone(),
                })
            }
            TargetSpec::Other(_) => Err(TargetError::MissingSpec),
        }
    }

    /// A string-valued driver option.
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(serde_yaml::Value::as_str)
    }
}

/// Everything a target driver receives.
#[derive(Clone)]
pub struct TargetContext {
    pub repo: RepoKey,
    pub tag: Tag,
    /// The target's own resolved spec (name plus options).
    pub spec: ResolvedSpec,
    /// Changelog path from the repository configuration.
    pub changelog_path: String,
    /// The release workspace. Targets may write their own files here.
    pub dir: PathBuf,
    pub client: Arc<dyn HostClient>,
    pub store: Arc<dyn ArtifactStore>,
    pub logger: Arc<dyn Logger>,
}

type TargetFn = fn(&TargetContext) -> Result<()>;

fn driver(name: &str) -> Option<TargetFn> {
    match name {
        "github" => Some(github::run),
        "crates" => Some(crates_io::run),
        "npm" => Some(npm::run),
        "pypi" => Some(pypi::run),
        "pod" => Some(pod::run),
        "brew" => Some(brew::run),
        "docker" => Some(docker::run),
        _ => None,
    }
}

/// Resolve `spec` and invoke its driver with a fresh copy of `ctx`
/// extended by the target-specific fields.
pub fn run_target(spec: &TargetSpec, ctx: &TargetContext) -> Result<()> {
    let resolved = ResolvedSpec::resolve(spec)?;
    let Some(run) = driver(&resolved.name) else {
        return Err(TargetError::Unknown(resolved.name).into());
    };
    let name = resolved.name.clone();
    let mut ctx = ctx.clone();
    ctx.spec = resolved;
    ctx.logger.info(&format!(
        "running release target {name} for {}",
        release_id(&ctx.repo, &ctx.tag.ref_name)
    ));
    run(&ctx)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixture for driver tests: a fake host, a memory store, and a
    //! scratch workspace.

    use greenlight_log::MemoryLogger;

    use super::*;
    use crate::github::fake::FakeHost;
    use crate::store::StoreContext;
    use crate::store::memory::MemoryStore;

    pub(crate) struct Fixture {
        pub host: Arc<FakeHost>,
        pub logger: Arc<MemoryLogger>,
        pub dir: tempfile::TempDir,
    }

    pub(crate) fn fixture() -> Fixture {
        Fixture {
            host: Arc::new(FakeHost::default()),
            logger: Arc::new(MemoryLogger::default()),
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    impl Fixture {
        pub(crate) fn repo(&self) -> RepoKey {
            RepoKey::new("acme", "widget")
        }

        pub(crate) fn context(&self, files: Vec<(&str, &[u8])>) -> TargetContext {
            let store = MemoryStore::new(StoreContext {
                repo: self.repo(),
                sha: "abc123".to_string(),
                dir: self.dir.path().to_path_buf(),
                logger: Arc::clone(&self.logger) as Arc<dyn Logger>,
            })
            .with_files(files);
            TargetContext {
                repo: self.repo(),
                tag: Tag::new("v1.0.0", "abc123"),
                spec: ResolvedSpec::default(),
                changelog_path: "CHANGELOG.md".to_string(),
                dir: self.dir.path().to_path_buf(),
                client: Arc::clone(&self.host) as Arc<dyn HostClient>,
                store: Arc::new(store),
                logger: Arc::clone(&self.logger) as Arc<dyn Logger>,
            }
        }
    }

    pub(crate) fn options(yaml: &str) -> ResolvedSpec {
        let options: serde_yaml::Mapping = serde_yaml::from_str(yaml).expect("options yaml");
        ResolvedSpec {
            name: options
                .get("name")
                .and_then(serde_yaml::Value::as_str)
                .unwrap_or_default()
                .to_string(),
            options,
        }
    }
}
