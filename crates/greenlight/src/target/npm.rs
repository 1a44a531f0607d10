//! npm target: publish every packed tarball (`*.tgz`) artifact.

use anyhow::{Context, Result};
use greenlight_process::{SpawnOptions, command_exists, spawn};

use super::TargetContext;
use crate::dryrun;

/// npm binary override, default `npm`.
pub const BIN_ENV: &str = "NPM_BIN";

pub fn run(ctx: &TargetContext) -> Result<()> {
    let bin = std::env::var(BIN_ENV).unwrap_or_else(|_| "npm".to_string());
    if !command_exists(&bin) {
        ctx.logger
            .info(&format!("skipping npm target: `{bin}` is not installed"));
        return Ok(());
    }

    let files: Vec<_> = ctx
        .store
        .list_files()?
        .into_iter()
        .filter(|file| file.name.ends_with(".tgz"))
        .collect();
    if files.is_empty() {
        ctx.logger.info(&format!(
            "no npm packages found for {}",
            ctx.tag.ref_name
        ));
        return Ok(());
    }

    for file in &files {
        let path = ctx.store.download_file(file)?;
        ctx.logger.info(&format!(
            "{}publishing {} to npm",
            dryrun::prefix(),
            file.name
        ));
        if dryrun::should_perform() {
            let path_arg = path.to_string_lossy().into_owned();
            spawn(
                &bin,
                &["publish", path_arg.as_str()],
                &SpawnOptions::default(),
                ctx.logger.as_ref(),
            )
            .with_context(|| format!("failed to publish {}", file.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dryrun::DRY_RUN_ENV;
    use crate::target::testing::fixture;
    use greenlight_log::Level;

    #[test]
    fn skips_when_binary_is_missing() {
        temp_env::with_var(BIN_ENV, Some("greenlight-no-such-npm"), || {
            let fixture = fixture();
            let ctx = fixture.context(vec![("pkg-1.0.0.tgz", b"bytes")]);
            run(&ctx).expect("target");
            assert!(fixture.logger.contains(Level::Info, "skipping npm target"));
        });
    }

    #[test]
    fn skips_without_tarballs() {
        temp_env::with_var(BIN_ENV, Some("sh"), || {
            let fixture = fixture();
            let ctx = fixture.context(vec![("tool.whl", b"bytes")]);
            run(&ctx).expect("target");
            assert!(fixture.logger.contains(Level::Info, "no npm packages found"));
        });
    }

    #[test]
    fn dry_run_downloads_but_does_not_spawn() {
        temp_env::with_vars(
            [(BIN_ENV, Some("sh")), (DRY_RUN_ENV, Some("true"))],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![("pkg-1.0.0.tgz", b"bytes")]);
                run(&ctx).expect("target");
                assert!(
                    fixture
                        .logger
                        .contains(Level::Info, "[dry-run] publishing pkg-1.0.0.tgz to npm")
                );
                assert!(fixture.dir.path().join("pkg-1.0.0.tgz").exists());
            },
        );
    }
}
