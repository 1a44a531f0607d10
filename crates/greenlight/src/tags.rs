//! Process-wide cache of repository tags.
//!
//! The first lookup for a repository pulls every tag through the paginated
//! listing API; after that the list is mutated in place as tag events
//! arrive, so shas never go stale and the listing is fetched exactly once
//! per repository for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::github::HostClient;
use crate::types::{RepoKey, Tag};

const TAGS_PER_PAGE: u32 = 100;

#[derive(Default)]
struct RepoTags {
    // `None` until the initial listing completed. Holding this lock during
    // the fetch is what lets concurrent callers share one retrieval.
    tags: Mutex<Option<Vec<Tag>>>,
}

/// Cache of `(repo, ref) -> sha`, keyed per repository.
pub struct TagCache {
    client: Arc<dyn HostClient>,
    repos: Mutex<HashMap<RepoKey, Arc<RepoTags>>>,
}

impl TagCache {
    pub fn new(client: Arc<dyn HostClient>) -> Self {
        Self {
            client,
            repos: Mutex::new(HashMap::new()),
        }
    }

    fn entry(&self, repo: &RepoKey) -> Arc<RepoTags> {
        let mut repos = self.repos.lock().unwrap();
        Arc::clone(repos.entry(repo.clone()).or_default())
    }

    /// All known tags for `repo`, fetching the full listing on first use.
    pub fn get_tags(&self, repo: &RepoKey) -> Result<Vec<Tag>> {
        let entry = self.entry(repo);
        let mut tags = entry.tags.lock().unwrap();
        if let Some(tags) = tags.as_ref() {
            return Ok(tags.clone());
        }
        let fetched = self.fetch_all(repo)?;
        *tags = Some(fetched.clone());
        Ok(fetched)
    }

    fn fetch_all(&self, repo: &RepoKey) -> Result<Vec<Tag>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.client.list_tags(repo, page, TAGS_PER_PAGE)?;
            let len = batch.len();
            all.extend(
                batch
                    .into_iter()
                    .map(|t| Tag::new(t.name, t.commit.sha)),
            );
            if len < TAGS_PER_PAGE as usize {
                return Ok(all);
            }
            page += 1;
        }
    }

    /// The tag pointing at `sha`, if any.
    pub fn find_tag(&self, repo: &RepoKey, sha: &str) -> Result<Option<Tag>> {
        Ok(self
            .get_tags(repo)?
            .into_iter()
            .find(|tag| tag.sha == sha))
    }

    /// Record `ref_name -> sha`, replacing any previous entry for the ref.
    pub fn add_tag(&self, repo: &RepoKey, ref_name: &str, sha: &str) -> Result<Tag> {
        self.get_tags(repo)?;
        let entry = self.entry(repo);
        let mut tags = entry.tags.lock().unwrap();
        let list = tags.get_or_insert_with(Vec::new);
        list.retain(|tag| tag.ref_name != ref_name);
        let tag = Tag::new(ref_name, sha);
        list.push(tag.clone());
        Ok(tag)
    }

    /// Drop `ref_name`. Returns whether an entry was removed.
    pub fn remove_tag(&self, repo: &RepoKey, ref_name: &str) -> Result<bool> {
        self.get_tags(repo)?;
        let entry = self.entry(repo);
        let mut tags = entry.tags.lock().unwrap();
        let list = tags.get_or_insert_with(Vec::new);
        let before = list.len();
        list.retain(|tag| tag.ref_name != ref_name);
        Ok(list.len() != before)
    }
}
