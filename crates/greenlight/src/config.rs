//! Per-repository release configuration (`release.yml`).
//!
//! The file lives at the repository root on the default branch. A repository
//! without one is not managed by the bot; events for it are ignored.
//!
//! ```yaml
//! store: zeus
//! targets:
//!   - github
//!   - name: brew
//!     tap: acme/homebrew-tools
//! ignoredChecks: [codecov]
//! changelog: CHANGELOG.md
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::github::HostClient;
use crate::types::RepoKey;

/// Path of the configuration file inside the repository.
pub const CONFIG_PATH: &str = "release.yml";

/// Default changelog location.
pub const DEFAULT_CHANGELOG: &str = "CHANGELOG.md";

/// One entry of the `targets` list: a bare driver name or a mapping with a
/// `name` key plus driver-specific options.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Name(String),
    Table(serde_yaml::Mapping),
    Other(serde_yaml::Value),
}

/// Parsed `release.yml`, merged with defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    /// Artifact-store driver name.
    pub store: String,
    /// Release targets, dispatched in parallel. May be empty.
    pub targets: Vec<TargetSpec>,
    /// Status-context prefixes excluded from aggregation.
    #[serde(default, rename = "ignoredChecks")]
    pub ignored_checks: Vec<String>,
    /// Changelog path inside the repository.
    #[serde(default = "default_changelog")]
    pub changelog: String,
}

fn default_changelog() -> String {
    DEFAULT_CHANGELOG.to_string()
}

impl RepoConfig {
    /// Parse a `release.yml` document.
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).context("failed to parse release.yml")
    }
}

/// Load the repository's configuration. `Ok(None)` when the repository has
/// no `release.yml`; a malformed file is an error.
pub fn load(client: &dyn HostClient, repo: &RepoKey) -> Result<Option<RepoConfig>> {
    match client.get_content(repo, CONFIG_PATH, None)? {
        Some(content) => RepoConfig::parse(&content.data).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_and_table_targets() {
        let config = RepoConfig::parse(
            br#"
store: zeus
targets:
  - github
  - name: brew
    tap: acme/homebrew-tools
"#,
        )
        .expect("parse");
        assert_eq!(config.store, "zeus");
        assert_eq!(config.targets.len(), 2);
        assert!(matches!(&config.targets[0], TargetSpec::Name(name) if name == "github"));
        assert!(matches!(&config.targets[1], TargetSpec::Table(_)));
    }

    #[test]
    fn defaults_are_merged() {
        let config = RepoConfig::parse(b"store: s3\ntargets: []\n").expect("parse");
        assert!(config.targets.is_empty());
        assert!(config.ignored_checks.is_empty());
        assert_eq!(config.changelog, DEFAULT_CHANGELOG);
    }

    #[test]
    fn ignored_checks_use_wire_name() {
        let config =
            RepoConfig::parse(b"store: s3\ntargets: []\nignoredChecks: [codecov, license/]\n")
                .expect("parse");
        assert_eq!(config.ignored_checks, vec!["codecov", "license/"]);
    }

    #[test]
    fn missing_store_is_an_error() {
        assert!(RepoConfig::parse(b"targets: []\n").is_err());
    }

    #[test]
    fn missing_targets_is_an_error() {
        assert!(RepoConfig::parse(b"store: s3\n").is_err());
    }

    #[test]
    fn null_target_entry_parses_as_other() {
        let config = RepoConfig::parse(b"store: s3\ntargets:\n  - ~\n").expect("parse");
        assert!(matches!(&config.targets[0], TargetSpec::Other(_)));
    }

    #[test]
    fn load_returns_none_without_file() {
        let host = crate::github::fake::FakeHost::default();
        let repo = crate::types::RepoKey::new("acme", "widget");
        assert!(load(&host, &repo).expect("load").is_none());
    }

    #[test]
    fn load_parses_existing_file() {
        let host = crate::github::fake::FakeHost::default();
        let repo = crate::types::RepoKey::new("acme", "widget");
        host.put_content(&repo, CONFIG_PATH, b"store: zeus\ntargets: [github]\n");
        let config = load(&host, &repo).expect("load").expect("present");
        assert_eq!(config.store, "zeus");
    }
}
