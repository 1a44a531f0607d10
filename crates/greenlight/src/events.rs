//! Webhook event envelopes.
//!
//! The embedding runtime deserializes hosting-provider webhook payloads into
//! these types and feeds them to [`crate::dispatcher::Dispatcher`]. Field
//! names follow the provider's wire format.

use serde::Deserialize;

use crate::types::{RepoKey, StatusState};

/// Kind of reference named by a `create`/`delete` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    Branch,
    Tag,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
}

impl Repository {
    pub fn key(&self) -> RepoKey {
        RepoKey::new(self.owner.login.clone(), self.name.clone())
    }
}

/// `create` event: a branch or tag came into existence.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_type: RefType,
    pub repository: Repository,
}

/// `delete` event: a branch or tag was removed.
#[derive(Debug, Clone, Deserialize)]
pub struct DeletePayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub ref_type: RefType,
    pub repository: Repository,
}

/// `status` event: one check on a commit changed state.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub sha: String,
    pub state: StatusState,
    pub context: Option<String>,
    pub repository: Repository,
}

/// One hosting event, ready for dispatch.
#[derive(Debug, Clone)]
pub enum Event {
    Create(CreatePayload),
    Delete(DeletePayload),
    Status(StatusPayload),
}
