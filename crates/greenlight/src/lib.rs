//! # Greenlight
//!
//! An event-driven release bot: when every status check on a tagged commit
//! goes green, the build artifacts for that commit are published to the
//! destinations the repository configured.
//!
//! ## Pipeline
//!
//! The flow is **event → evaluate → debounce → dispatch**:
//!
//! 1. [`dispatcher::Dispatcher::handle_event`] receives tag-create,
//!    tag-delete, and commit-status webhooks, keeps the [`tags::TagCache`]
//!    current, and evaluates the affected tag.
//! 2. [`status`] reduces the commit's raw checks to the latest per context
//!    and classifies the aggregate as pending, success, or failed.
//! 3. [`scheduler::ReleaseScheduler`] debounces green evaluations: any
//!    further event for the same tag cancels the pending timer, so a burst
//!    of CI updates yields at most one release per quiet period.
//! 4. Dispatch acquires a scoped workspace ([`workdir`]), binds an
//!    artifact store ([`store`]) to the tagged commit, and runs every
//!    configured [`target`] in parallel with per-target error isolation.
//!
//! ## Configuration
//!
//! Repositories opt in with a `release.yml` ([`config`]) naming an
//! artifact-store driver and a list of target drivers. Setting `DRY_RUN`
//! ([`dryrun`]) runs every code path without external side effects.
//!
//! ## Modules
//!
//! - [`dispatcher`] — Webhook event handling and release dispatch
//! - [`scheduler`] — Per-tag debounce state machine
//! - [`status`] — Status-check retrieval and aggregation
//! - [`tags`] — Process-wide tag cache
//! - [`store`] — Artifact stores (object storage, build aggregator)
//! - [`target`] — Release targets (crates.io, npm, PyPI, GitHub releases,
//!   CocoaPods, Homebrew, container builds)
//! - [`config`] — `release.yml` loading
//! - [`github`] — Hosting-provider client trait and HTTP implementation
//! - [`events`] — Webhook payload types
//! - [`workdir`] — Scoped temp workspace
//! - [`dryrun`] — Process-wide dry-run gate
//! - [`types`] — Core domain types

/// `release.yml` loading and defaults.
pub mod config;

/// Webhook event handling and release dispatch.
pub mod dispatcher;

/// Process-wide dry-run gate.
pub mod dryrun;

/// Webhook payload types.
pub mod events;

/// Hosting-provider client trait and HTTP implementation.
pub mod github;

/// Per-tag debounce state machine.
pub mod scheduler;

/// Status-check retrieval and aggregation.
pub mod status;

/// Artifact stores.
pub mod store;

/// Process-wide tag cache.
pub mod tags;

/// Release targets.
pub mod target;

/// Core domain types.
pub mod types;

/// Scoped temp workspace.
pub mod workdir;

pub use greenlight_changes as changes;
pub use greenlight_log as log;
pub use greenlight_process as process;

/// Engine invariant tests.
#[cfg(test)]
mod property_tests;
