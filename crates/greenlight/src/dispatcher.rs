//! Event dispatcher: the seam between the webhook runtime and the engine.
//!
//! Three event families drive everything. Tag creation resolves the
//! reference (dereferencing annotated tags), records it in the tag cache,
//! and evaluates the commit's checks. Tag deletion evicts the cache entry.
//! Status updates look up the tag pointing at the commit and re-evaluate.
//! A green evaluation arms the scheduler; once the debounce window passes,
//! the release is dispatched: one scoped workspace, one store instance,
//! all targets in parallel with per-target error isolation.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use greenlight_log::Logger;

use crate::config::{self, RepoConfig};
use crate::events::{CreatePayload, DeletePayload, Event, RefType, StatusPayload};
use crate::github::HostClient;
use crate::scheduler::ReleaseScheduler;
use crate::status;
use crate::store::{self, StoreContext};
use crate::tags::TagCache;
use crate::target::{self, ResolvedSpec, TargetContext};
use crate::types::{RepoKey, Tag, release_id};
use crate::workdir;

pub struct Dispatcher {
    client: Arc<dyn HostClient>,
    logger: Arc<dyn Logger>,
    tags: TagCache,
    scheduler: ReleaseScheduler,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn HostClient>, logger: Arc<dyn Logger>) -> Self {
        Self {
            tags: TagCache::new(Arc::clone(&client)),
            scheduler: ReleaseScheduler::new(Arc::clone(&logger)),
            client,
            logger,
        }
    }

    /// Dispatcher with an explicit debounce window.
    pub fn with_debounce(
        client: Arc<dyn HostClient>,
        logger: Arc<dyn Logger>,
        debounce: Duration,
    ) -> Self {
        Self {
            tags: TagCache::new(Arc::clone(&client)),
            scheduler: ReleaseScheduler::with_timeout(debounce, Arc::clone(&logger)),
            client,
            logger,
        }
    }

    /// Entry point for the embedding webhook runtime.
    pub fn handle_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::Create(payload) => self.on_create(payload),
            Event::Delete(payload) => self.on_delete(payload),
            Event::Status(payload) => self.on_status(payload),
        }
    }

    fn on_create(&self, payload: &CreatePayload) -> Result<()> {
        if payload.ref_type != RefType::Tag {
            return Ok(());
        }
        let repo = payload.repository.key();
        let Some(config) = config::load(self.client.as_ref(), &repo)? else {
            self.logger
                .debug(&format!("{repo} has no release config; ignoring create event"));
            return Ok(());
        };

        let Some(object) = self
            .client
            .get_reference(&repo, &format!("tags/{}", payload.git_ref))?
        else {
            self.logger.warn(&format!(
                "reference tags/{} not found in {repo}",
                payload.git_ref
            ));
            return Ok(());
        };
        // Annotated tags point at a tag object; follow it to the commit.
        let sha = if object.kind == "tag" {
            self.client.get_tag(&repo, &object.sha)?.object.sha
        } else {
            object.sha
        };

        let tag = self.tags.add_tag(&repo, &payload.git_ref, &sha)?;
        self.logger
            .info(&format!("tag {} created at {} in {repo}", tag.ref_name, tag.sha));
        self.process_tag(&repo, &tag, &config)
    }

    fn on_delete(&self, payload: &DeletePayload) -> Result<()> {
        if payload.ref_type != RefType::Tag {
            return Ok(());
        }
        let repo = payload.repository.key();
        if config::load(self.client.as_ref(), &repo)?.is_none() {
            self.logger
                .debug(&format!("{repo} has no release config; ignoring delete event"));
            return Ok(());
        }
        if self.tags.remove_tag(&repo, &payload.git_ref)? {
            self.logger
                .info(&format!("tag {} deleted in {repo}", payload.git_ref));
        }
        Ok(())
    }

    fn on_status(&self, payload: &StatusPayload) -> Result<()> {
        let repo = payload.repository.key();
        let Some(config) = config::load(self.client.as_ref(), &repo)? else {
            self.logger
                .debug(&format!("{repo} has no release config; ignoring status event"));
            return Ok(());
        };
        let Some(tag) = self.tags.find_tag(&repo, &payload.sha)? else {
            self.logger.debug(&format!(
                "no tag points at {} in {repo}; ignoring status event",
                payload.sha
            ));
            return Ok(());
        };
        self.process_tag(&repo, &tag, &config)
    }

    /// Evaluate a tag's checks and feed the scheduler.
    pub fn process_tag(&self, repo: &RepoKey, tag: &Tag, config: &RepoConfig) -> Result<()> {
        let statuses = status::get_statuses(self.client.as_ref(), repo, &tag.sha)?;
        let latest = status::filter_latest_statuses(&statuses, &config.ignored_checks);
        let state = status::aggregate(&latest);

        let id = release_id(repo, &tag.ref_name);
        self.logger
            .debug(&format!("aggregate state for {id}: {state}"));

        let job = {
            let client = Arc::clone(&self.client);
            let logger = Arc::clone(&self.logger);
            let repo = repo.clone();
            let tag = tag.clone();
            let config = config.clone();
            let id = id.clone();
            move || match dispatch(client, Arc::clone(&logger), repo, tag, config) {
                Ok(()) => logger.info(&format!("release {id} finished")),
                Err(err) => logger.error(&format!("release {id} failed: {err:#}")),
            }
        };
        self.scheduler
            .evaluate(&id, state, !config.targets.is_empty(), job);
        Ok(())
    }
}

/// Run one release: scoped workspace, bound store, all targets in
/// parallel. A target failure is logged and does not touch its peers.
fn dispatch(
    client: Arc<dyn HostClient>,
    logger: Arc<dyn Logger>,
    repo: RepoKey,
    tag: Tag,
    config: RepoConfig,
) -> Result<()> {
    logger.info(&format!(
        "dispatching release for {}",
        release_id(&repo, &tag.ref_name)
    ));
    workdir::with_temp_dir(|dir| {
        let store = store::create_store(
            &config.store,
            StoreContext {
                repo: repo.clone(),
                sha: tag.sha.clone(),
                dir: dir.to_path_buf(),
                logger: Arc::clone(&logger),
            },
        )?;
        let ctx = TargetContext {
            repo: repo.clone(),
            tag: tag.clone(),
            spec: ResolvedSpec::default(),
            changelog_path: config.changelog.clone(),
            dir: dir.to_path_buf(),
            client: Arc::clone(&client),
            store,
            logger: Arc::clone(&logger),
        };

        thread::scope(|scope| {
            for spec in &config.targets {
                let ctx = &ctx;
                let logger = &logger;
                scope.spawn(move || {
                    if let Err(err) = target::run_target(spec, ctx) {
                        logger.error(&format!("release target failed: {err:#}"));
                    }
                });
            }
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dryrun::DRY_RUN_ENV;
    use crate::events::{Owner, Repository};
    use crate::github::fake::FakeHost;
    use crate::status::check;
    use crate::types::StatusState;
    use greenlight_log::{Level, MemoryLogger};

    const TICK: Duration = Duration::from_millis(30);
    const SHA: &str = "abc123";

    struct Harness {
        host: Arc<FakeHost>,
        logger: Arc<MemoryLogger>,
        dispatcher: Dispatcher,
    }

    fn repo() -> RepoKey {
        RepoKey::new("acme", "widget")
    }

    fn repository() -> Repository {
        Repository {
            name: "widget".to_string(),
            owner: Owner {
                login: "acme".to_string(),
            },
        }
    }

    fn harness(config: &str) -> Harness {
        let host = Arc::new(FakeHost::default());
        if !config.is_empty() {
            host.put_content(&repo(), config::CONFIG_PATH, config.as_bytes());
        }
        let logger = Arc::new(MemoryLogger::default());
        let dispatcher = Dispatcher::with_debounce(
            Arc::clone(&host) as Arc<dyn HostClient>,
            Arc::clone(&logger) as Arc<dyn Logger>,
            TICK,
        );
        Harness {
            host,
            logger,
            dispatcher,
        }
    }

    fn create_event(ref_name: &str) -> Event {
        Event::Create(CreatePayload {
            git_ref: ref_name.to_string(),
            ref_type: RefType::Tag,
            repository: repository(),
        })
    }

    fn delete_event(ref_name: &str) -> Event {
        Event::Delete(DeletePayload {
            git_ref: ref_name.to_string(),
            ref_type: RefType::Tag,
            repository: repository(),
        })
    }

    fn status_event(sha: &str, state: StatusState) -> Event {
        Event::Status(StatusPayload {
            sha: sha.to_string(),
            state,
            context: Some("ci/build".to_string()),
            repository: repository(),
        })
    }

    fn settle() {
        thread::sleep(TICK * 6);
    }

    #[test]
    fn happy_path_creates_release_for_new_tag() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            let h = harness("store: memory\ntargets: [github]\n");
            h.host.set_ref(&repo(), "tags/v1.0.0", "commit", SHA);
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

            h.dispatcher
                .handle_event(&create_event("v1.0.0"))
                .expect("create");
            settle();

            let mutations = h.host.mutation_log();
            assert_eq!(mutations, vec!["create_release v1.0.0".to_string()]);
            assert!(h.logger.contains(Level::Info, "release acme/widget:v1.0.0 finished"));
        });
    }

    #[test]
    fn annotated_tags_dereference_to_commit() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            let h = harness("store: memory\ntargets: [github]\n");
            h.host.set_ref(&repo(), "tags/v1.0.0", "tag", "tagobj");
            h.host.set_annotated_tag("tagobj", SHA);
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

            h.dispatcher
                .handle_event(&create_event("v1.0.0"))
                .expect("create");

            let tag = h
                .dispatcher
                .tags
                .find_tag(&repo(), SHA)
                .expect("lookup")
                .expect("cached");
            assert_eq!(tag.ref_name, "v1.0.0");
            settle();
        });
    }

    #[test]
    fn branch_events_are_ignored() {
        let h = harness("store: memory\ntargets: [github]\n");
        let event = Event::Create(CreatePayload {
            git_ref: "main".to_string(),
            ref_type: RefType::Branch,
            repository: repository(),
        });
        h.dispatcher.handle_event(&event).expect("handle");
        assert!(h.host.mutation_log().is_empty());
    }

    #[test]
    fn unconfigured_repo_is_ignored() {
        let h = harness("");
        h.dispatcher
            .handle_event(&create_event("v1.0.0"))
            .expect("handle");
        assert!(h.logger.contains(Level::Debug, "no release config"));
    }

    #[test]
    fn debounce_absorbs_regression_to_pending() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            let h = harness("store: memory\ntargets: [github]\n");
            h.host.seed_tag(&repo(), "v1.0.0", SHA);
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Success))
                .expect("status");
            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Success))
                .expect("status");
            // Checks regress before the window elapses.
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Pending, 2)]);
            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Pending))
                .expect("status");
            settle();

            assert!(h.host.mutation_log().is_empty());
        });
    }

    #[test]
    fn failed_checks_log_and_stay_idle() {
        let h = harness("store: memory\ntargets: [github]\n");
        h.host.seed_tag(&repo(), "v1.0.0", SHA);
        h.host
            .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Failure, 1)]);

        h.dispatcher
            .handle_event(&status_event(SHA, StatusState::Failure))
            .expect("status");
        settle();

        assert!(h.host.mutation_log().is_empty());
        assert!(h.logger.contains(Level::Info, "status checks have failed"));
    }

    #[test]
    fn status_without_matching_tag_is_ignored() {
        let h = harness("store: memory\ntargets: [github]\n");
        h.dispatcher
            .handle_event(&status_event("unknown-sha", StatusState::Success))
            .expect("status");
        assert!(h.logger.contains(Level::Debug, "no tag points at"));
    }

    #[test]
    fn deleted_tags_no_longer_resolve() {
        let h = harness("store: memory\ntargets: [github]\n");
        h.host.seed_tag(&repo(), "v1.0.0", SHA);
        assert!(
            h.dispatcher
                .tags
                .find_tag(&repo(), SHA)
                .expect("lookup")
                .is_some()
        );

        h.dispatcher
            .handle_event(&delete_event("v1.0.0"))
            .expect("delete");

        assert!(
            h.dispatcher
                .tags
                .find_tag(&repo(), SHA)
                .expect("lookup")
                .is_none()
        );
    }

    #[test]
    fn ignored_checks_do_not_block_release() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            let h = harness(
                "store: memory\ntargets: [github]\nignoredChecks: [codecov]\n",
            );
            h.host.seed_tag(&repo(), "v1.0.0", SHA);
            h.host.set_statuses(
                &repo(),
                SHA,
                vec![
                    check("codecov/patch", StatusState::Failure, 2),
                    check("ci/build", StatusState::Success, 1),
                ],
            );

            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Success))
                .expect("status");
            settle();

            assert_eq!(h.host.mutation_log(), vec!["create_release v1.0.0".to_string()]);
        });
    }

    #[test]
    fn failing_target_does_not_cancel_peers() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            let h = harness("store: memory\ntargets: [warehouse, github]\n");
            h.host.seed_tag(&repo(), "v1.0.0", SHA);
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Success))
                .expect("status");
            settle();

            assert!(h.logger.contains(Level::Error, "unknown release target `warehouse`"));
            assert_eq!(h.host.mutation_log(), vec!["create_release v1.0.0".to_string()]);
        });
    }

    #[test]
    fn empty_target_list_is_a_noop_release() {
        let h = harness("store: memory\ntargets: []\n");
        h.host.seed_tag(&repo(), "v1.0.0", SHA);
        h.host
            .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

        h.dispatcher
            .handle_event(&status_event(SHA, StatusState::Success))
            .expect("status");
        settle();

        assert!(h.host.mutation_log().is_empty());
        assert!(h.logger.contains(Level::Info, "no release targets configured"));
    }

    #[test]
    fn dry_run_release_mutates_nothing() {
        temp_env::with_var(DRY_RUN_ENV, Some("true"), || {
            let h = harness("store: memory\ntargets: [github]\n");
            h.host.seed_tag(&repo(), "v1.0.0", SHA);
            h.host
                .set_statuses(&repo(), SHA, vec![check("ci", StatusState::Success, 1)]);

            h.dispatcher
                .handle_event(&status_event(SHA, StatusState::Success))
                .expect("status");
            settle();

            assert!(h.host.mutation_log().is_empty());
            assert!(h.logger.contains(Level::Info, "[dry-run] creating release for v1.0.0"));
            assert!(h.logger.contains(Level::Info, "release acme/widget:v1.0.0 finished"));
        });
    }
}
