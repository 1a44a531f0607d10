//! GitHub release target: create or reuse the release for the tag and
//! upload every artifact as an asset. The release body is the changelog
//! section matching the tag's version, when one exists.

use anyhow::{Context, Result};
use greenlight_changes::{find_changeset, parse_version};

use super::TargetContext;
use crate::dryrun;
use crate::github::{Release, ReleaseParams};

const OCTET_STREAM: &str = "application/octet-stream";

pub fn run(ctx: &TargetContext) -> Result<()> {
    let tag = &ctx.tag.ref_name;

    let changeset = match ctx
        .client
        .get_content(&ctx.repo, &ctx.changelog_path, Some(&ctx.tag.sha))?
    {
        Some(content) => find_changeset(&String::from_utf8_lossy(&content.data), tag),
        None => None,
    };
    let (name, body) = match changeset {
        Some(changeset) => (changeset.name, changeset.body),
        None => (tag.clone(), String::new()),
    };
    let prerelease = parse_version(tag).is_some_and(|v| v.is_prerelease());

    let release = match ctx.client.get_release_by_tag(&ctx.repo, tag)? {
        Some(release) => {
            ctx.logger
                .info(&format!("release for {tag} already exists; reusing it"));
            release
        }
        None => {
            ctx.logger
                .info(&format!("{}creating release for {tag}", dryrun::prefix()));
            let params = ReleaseParams {
                tag_name: tag.clone(),
                name,
                body,
                draft: false,
                prerelease,
            };
            if dryrun::should_perform() {
                ctx.client.create_release(&ctx.repo, &params)?
            } else {
                Release::stub(tag)
            }
        }
    };

    let files = ctx.store.list_files()?;
    if files.is_empty() {
        ctx.logger.info(&format!("no artifacts to upload for {tag}"));
        return Ok(());
    }

    let preserves_type = ctx.store.capabilities().preserves_content_type;
    for file in &files {
        let path = ctx.store.download_file(file)?;
        let data = std::fs::read(&path)
            .with_context(|| format!("failed to read downloaded artifact {}", path.display()))?;
        let content_type = if preserves_type {
            file.content_type.as_deref().unwrap_or(OCTET_STREAM)
        } else {
            OCTET_STREAM
        };
        ctx.logger.info(&format!(
            "{}uploading asset {} ({} bytes)",
            dryrun::prefix(),
            file.name,
            data.len()
        ));
        if dryrun::should_perform() {
            ctx.client
                .upload_asset(&ctx.repo, &release, &file.name, &data, content_type)?;
        }
    }
    Ok(())
}
