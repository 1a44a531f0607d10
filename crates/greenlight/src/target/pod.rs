//! CocoaPods target: fetch the podspec from the tagged commit and push it
//! to trunk.

use anyhow::{Context, Result, bail};
use greenlight_process::{SpawnOptions, spawn};

use super::TargetContext;
use crate::dryrun;

pub const TOKEN_ENV: &str = "COCOAPODS_TRUNK_TOKEN";
/// pod binary override, default `pod`.
pub const BIN_ENV: &str = "COCOAPODS_BIN";

pub fn run(ctx: &TargetContext) -> Result<()> {
    let Some(token) = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()) else {
        ctx.logger
            .info(&format!("skipping pod target: {TOKEN_ENV} is not set"));
        return Ok(());
    };
    let bin = std::env::var(BIN_ENV).unwrap_or_else(|_| "pod".to_string());

    let spec_path = ctx
        .spec
        .opt_str("spec")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.podspec", ctx.repo.repo));

    let Some(content) = ctx
        .client
        .get_content(&ctx.repo, &spec_path, Some(&ctx.tag.sha))?
    else {
        bail!("podspec {spec_path} not found at {}", ctx.tag.ref_name);
    };

    let file_name = spec_path.rsplit('/').next().unwrap_or(spec_path.as_str());
    let local = ctx.dir.join(file_name);
    std::fs::write(&local, &content.data)
        .with_context(|| format!("failed to write {}", local.display()))?;

    ctx.logger.info(&format!(
        "{}pushing {file_name} to trunk",
        dryrun::prefix()
    ));
    if dryrun::should_perform() {
        let local_arg = local.to_string_lossy().into_owned();
        spawn(
            &bin,
            &["trunk", "push", local_arg.as_str()],
            &SpawnOptions::default().with_env(TOKEN_ENV, token.as_str()),
            ctx.logger.as_ref(),
        )
        .context("pod trunk push failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dryrun::DRY_RUN_ENV;
    use crate::target::testing::{fixture, options};
    use greenlight_log::Level;

    #[test]
    fn skips_without_token() {
        temp_env::with_var_unset(TOKEN_ENV, || {
            let fixture = fixture();
            let ctx = fixture.context(vec![]);
            run(&ctx).expect("target");
            assert!(fixture.logger.contains(Level::Info, "skipping pod target"));
        });
    }

    #[test]
    fn missing_podspec_is_an_error() {
        temp_env::with_vars(
            [(TOKEN_ENV, Some("token")), (DRY_RUN_ENV, Some("true"))],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![]);
                let err = run(&ctx).unwrap_err();
                assert!(err.to_string().contains("widget.podspec"), "{err}");
            },
        );
    }

    #[test]
    fn dry_run_stages_the_podspec_without_pushing() {
        temp_env::with_vars(
            [(TOKEN_ENV, Some("token")), (DRY_RUN_ENV, Some("true"))],
            || {
                let fixture = fixture();
                fixture
                    .host
                    .put_content(&fixture.repo(), "Specs/Widget.podspec", b"Pod::Spec.new");
                let mut ctx = fixture.context(vec![]);
                ctx.spec = options("name: pod\nspec: Specs/Widget.podspec\n");

                run(&ctx).expect("target");

                assert!(fixture.dir.path().join("Widget.podspec").exists());
                assert!(
                    fixture
                        .logger
                        .contains(Level::Info, "[dry-run] pushing Widget.podspec to trunk")
                );
            },
        );
    }
}
