//! Homebrew target: render a formula template with per-artifact checksums
//! and commit it to a tap repository through the hosting API.
//!
//! Template placeholders: `{{version}}`, `{{ref}}`, and
//! `{{sha256:<artifact-name>}}` for each downloaded artifact's digest.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use greenlight_changes::parse_version;
use sha2::{Digest, Sha256};

use super::TargetContext;
use crate::dryrun;
use crate::types::RepoKey;

pub fn run(ctx: &TargetContext) -> Result<()> {
    let Some(tap) = ctx.spec.opt_str("tap").map(str::to_string) else {
        ctx.logger
            .info("skipping brew target: no tap repository configured");
        return Ok(());
    };
    let Some(template) = ctx.spec.opt_str("template").map(str::to_string) else {
        ctx.logger
            .info("skipping brew target: no formula template configured");
        return Ok(());
    };
    let tap_repo = parse_tap(&tap)?;
    let formula_path = ctx
        .spec
        .opt_str("formula")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Formula/{}.rb", ctx.repo.repo));

    let tag = &ctx.tag.ref_name;
    let version = parse_version(tag)
        .map(|v| v.to_string())
        .unwrap_or_else(|| tag.clone());

    let files = ctx.store.list_files()?;
    let mut checksums = BTreeMap::new();
    for file in &files {
        let path = ctx.store.download_file(file)?;
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read downloaded artifact {}", path.display()))?;
        checksums.insert(file.name.clone(), hex::encode(Sha256::digest(&data)));
    }

    let formula = render(&template, &version, tag, &checksums);
    let message = format!("Update {} to {version}", ctx.repo.repo);

    let existing = ctx.client.get_content(&tap_repo, &formula_path, None)?;
    ctx.logger.info(&format!(
        "{}committing {formula_path} to {tap}",
        dryrun::prefix()
    ));
    if dryrun::should_perform() {
        match existing {
            Some(content) => ctx.client.update_file(
                &tap_repo,
                &formula_path,
                &message,
                formula.as_bytes(),
                &content.sha,
            )?,
            None => ctx
                .client
                .create_file(&tap_repo, &formula_path, &message, formula.as_bytes())?,
        }
    }
    Ok(())
}

fn parse_tap(tap: &str) -> Result<RepoKey> {
    match tap.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => {
            Ok(RepoKey::new(owner, repo))
        }
        _ => bail!("tap must be of the form owner/repo, got `{tap}`"),
    }
}

fn render(template: &str, version: &str, tag: &str, checksums: &BTreeMap<String, String>) -> String {
    let mut out = template
        .replace("{{version}}", version)
        .replace("{{ref}}", tag);
    for (name, digest) in checksums {
        out = out.replace(&format!("{{{{sha256:{name}}}}}"), digest);
    }
    out
}
