//! Commit-status retrieval and classification.

use std::collections::HashMap;

use anyhow::Result;

use crate::github::{CommitStatus, HostClient};
use crate::types::{AggregateState, RepoKey, StatusState};

const STATUSES_PER_PAGE: u32 = 100;

/// Fetch the status checks for a commit.
///
/// The provider delivers the first page newest-first; when it does, that
/// page alone is authoritative (it contains the latest update for every
/// context that fits). The provider has been observed to return unsorted
/// first pages, so when the ordering does not hold we fall back to fetching
/// every page and sorting ascending by `updated_at` ourselves. Only the
/// first page is probed for ordering; later pages are assumed to share it.
pub fn get_statuses(
    client: &dyn HostClient,
    repo: &RepoKey,
    sha: &str,
) -> Result<Vec<CommitStatus>> {
    let first = client.list_statuses(repo, sha, 1, STATUSES_PER_PAGE)?;
    if is_sorted_descending(&first) {
        return Ok(first);
    }

    let mut all = first;
    let mut page = 2;
    loop {
        let batch = client.list_statuses(repo, sha, page, STATUSES_PER_PAGE)?;
        let len = batch.len();
        all.extend(batch);
        if len < STATUSES_PER_PAGE as usize {
            break;
        }
        page += 1;
    }
    all.sort_by_key(|status| status.updated_at);
    Ok(all)
}

fn is_sorted_descending(statuses: &[CommitStatus]) -> bool {
    statuses
        .windows(2)
        .all(|pair| pair[0].updated_at >= pair[1].updated_at)
}

/// Reduce raw checks to the authoritative one per context.
///
/// Contexts matching any `ignored` prefix are dropped; within each
/// remaining context only the entry with the greatest `updated_at`
/// survives. Output order is unspecified.
pub fn filter_latest_statuses(
    statuses: &[CommitStatus],
    ignored: &[String],
) -> Vec<CommitStatus> {
    let mut latest: HashMap<&str, &CommitStatus> = HashMap::new();
    for status in statuses {
        if ignored
            .iter()
            .any(|prefix| status.context.starts_with(prefix.as_str()))
        {
            continue;
        }
        match latest.get(status.context.as_str()) {
            Some(existing) if existing.updated_at >= status.updated_at => {}
            _ => {
                latest.insert(status.context.as_str(), status);
            }
        }
    }
    latest.into_values().cloned().collect()
}

/// Classify the kept checks. An empty set counts as pending: checks are
/// configured but have not reported yet.
pub fn aggregate(statuses: &[CommitStatus]) -> AggregateState {
    if statuses.is_empty() {
        return AggregateState::Pending;
    }
    if statuses
        .iter()
        .any(|status| status.state == StatusState::Pending)
    {
        return AggregateState::Pending;
    }
    if statuses
        .iter()
        .all(|status| status.state == StatusState::Success)
    {
        return AggregateState::Success;
    }
    AggregateState::Failed
}

#[cfg(test)]
pub(crate) fn check(context: &str, state: StatusState, minute: u32) -> CommitStatus {
    use chrono::TimeZone;
    CommitStatus {
        context: context.to_string(),
        state,
        updated_at: chrono::Utc
            .with_ymd_and_hms(2024, 5, 1, 12, minute, 0)
            .single()
            .expect("timestamp"),
    }
}
