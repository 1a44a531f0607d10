//! crates.io target: publish every workspace crate at the tagged commit,
//! dependencies before dependents.
//!
//! The tagged sources are cloned into the release workspace, the package
//! graph is read via `cargo metadata`, and each member is published with
//! `cargo publish -p`. Publication order is computed by repeatedly taking
//! every crate whose in-workspace dependencies have all been emitted;
//! ties keep their input order, so the result is deterministic.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use cargo_metadata::{DependencyKind, MetadataCommand};
use greenlight_process::{SpawnOptions, spawn};

use super::TargetContext;
use crate::dryrun;

/// Registry token; the target skips cleanly without it.
pub const TOKEN_ENV: &str = "CARGO_REGISTRY_TOKEN";
/// Cargo binary override, default `cargo`.
pub const BIN_ENV: &str = "CARGO_BIN";

/// A workspace member and its declared dependency names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CratePackage {
    pub name: String,
    pub dependencies: Vec<String>,
}

/// Order `packages` so every crate appears after all of its dependencies
/// that are themselves in the set. Dependencies outside the set are
/// ignored. Crates ready in the same round keep their input order.
pub fn publish_order(packages: &[CratePackage]) -> Result<Vec<String>> {
    let in_set: BTreeSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut remaining: Vec<&CratePackage> = packages.iter().collect();
    let mut order = Vec::with_capacity(packages.len());

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|p| {
            p.dependencies
                .iter()
                .filter(|dep| in_set.contains(dep.as_str()))
                .all(|dep| emitted.contains(dep.as_str()))
        });
        if ready.is_empty() {
            bail!("dependency cycle detected among workspace crates");
        }
        for package in ready {
            emitted.insert(package.name.as_str());
            order.push(package.name.clone());
        }
        remaining = blocked;
    }
    Ok(order)
}

pub fn run(ctx: &TargetContext) -> Result<()> {
    let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) else {
        ctx.logger
            .info(&format!("skipping crates target: {TOKEN_ENV} is not set"));
        return Ok(());
    };
    let cargo_bin = std::env::var(BIN_ENV).unwrap_or_else(|_| "cargo".to_string());

    let tag = &ctx.tag.ref_name;
    let checkout = ctx.dir.join("crates-src");
    ctx.logger
        .info(&format!("{}cloning {} at {tag}", dryrun::prefix(), ctx.repo));
    if !dryrun::should_perform() {
        ctx.logger.info(&format!(
            "{}publishing workspace crates in dependency order",
            dryrun::prefix()
        ));
        return Ok(());
    }

    let clone_url = format!("https://github.com/{}/{}.git", ctx.repo.owner, ctx.repo.repo);
    let checkout_arg = checkout.to_string_lossy().into_owned();
    spawn(
        "git",
        &[
            "clone",
            "--depth",
            "1",
            "--branch",
            tag.as_str(),
            clone_url.as_str(),
            checkout_arg.as_str(),
        ],
        &SpawnOptions::default(),
        ctx.logger.as_ref(),
    )
    .context("failed to clone tagged sources")?;

    let metadata = MetadataCommand::new()
        .cargo_path(&cargo_bin)
        .manifest_path(checkout.join("Cargo.toml"))
        .no_deps()
        .exec()
        .context("failed to read workspace metadata")?;
    let members: BTreeSet<String> = metadata
        .workspace_packages()
        .iter()
        .map(|p| p.name.to_string())
        .collect();
    let packages: Vec<CratePackage> = metadata
        .workspace_packages()
        .iter()
        .map(|p| CratePackage {
            name: p.name.to_string(),
            dependencies: p
                .dependencies
                .iter()
                .filter(|dep| dep.kind != DependencyKind::Development)
                .map(|dep| dep.name.clone())
                .filter(|dep| members.contains(dep))
                .collect(),
        })
        .collect();

    ctx.logger
        .info("publishing workspace crates in dependency order");
    for name in publish_order(&packages)? {
        ctx.logger.info(&format!("publishing {name}"));
        spawn(
            &cargo_bin,
            &["publish", "-p", name.as_str()],
            &SpawnOptions::in_dir(&checkout).with_env(TOKEN_ENV, token.as_str()),
            ctx.logger.as_ref(),
        )
        .with_context(|| format!("failed to publish {name}"))?;
    }
    Ok(())
}
