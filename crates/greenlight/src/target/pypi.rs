//! PyPI target: upload wheels and sdists through `twine`.

use anyhow::{Context, Result};
use greenlight_process::{SpawnOptions, spawn};

use super::TargetContext;
use crate::dryrun;

pub const USERNAME_ENV: &str = "TWINE_USERNAME";
pub const PASSWORD_ENV: &str = "TWINE_PASSWORD";
/// twine binary override, default `twine`.
pub const BIN_ENV: &str = "TWINE_BIN";

const EXTENSIONS: [&str; 3] = [".whl", ".tar.gz", ".zip"];

pub fn run(ctx: &TargetContext) -> Result<()> {
    let credentials = (
        std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty()),
        std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty()),
    );
    let (Some(username), Some(password)) = credentials else {
        ctx.logger.info(&format!(
            "skipping pypi target: {USERNAME_ENV} and {PASSWORD_ENV} are not both set"
        ));
        return Ok(());
    };
    let bin = std::env::var(BIN_ENV).unwrap_or_else(|_| "twine".to_string());

    let files: Vec<_> = ctx
        .store
        .list_files()?
        .into_iter()
        .filter(|file| EXTENSIONS.iter().any(|ext| file.name.ends_with(ext)))
        .collect();
    if files.is_empty() {
        ctx.logger.info(&format!(
            "no Python distributions found for {}",
            ctx.tag.ref_name
        ));
        return Ok(());
    }

    let paths = ctx.store.download_files(&files)?;
    ctx.logger.info(&format!(
        "{}uploading {} distributions to PyPI",
        dryrun::prefix(),
        paths.len()
    ));
    if dryrun::should_perform() {
        let mut args = vec!["upload".to_string()];
        args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        spawn(
            &bin,
            &args,
            &SpawnOptions::default()
                .with_env(USERNAME_ENV, username)
                .with_env(PASSWORD_ENV, password),
            ctx.logger.as_ref(),
        )
        .context("twine upload failed")?;
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
    fn skips_without_credentials() {
        temp_env::with_vars([(USERNAME_ENV, None::<&str>), (PASSWORD_ENV, None)], || {
            let fixture = fixture();
            let ctx = fixture.context(vec![("pkg-1.0.0-py3-none-any.whl", b"bytes")]);
            run(&ctx).expect("target");
            assert!(fixture.logger.contains(Level::Info, "skipping pypi target"));
        });
    }

    #[test]
    fn skips_without_distributions() {
        temp_env::with_vars(
            [(USERNAME_ENV, Some("user")), (PASSWORD_ENV, Some("pass"))],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![("tool.tgz", b"bytes")]);
                run(&ctx).expect("target");
                assert!(
                    fixture
                        .logger
                        .contains(Level::Info, "no Python distributions found")
                );
            },
        );
    }

    #[test]
    fn dry_run_counts_distributions_without_uploading() {
        temp_env::with_vars(
            [
                (USERNAME_ENV, Some("user")),
                (PASSWORD_ENV, Some("pass")),
                (DRY_RUN_ENV, Some("true")),
            ],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![
                    ("pkg-1.0.0-py3-none-any.whl", b"a".as_slice()),
                    ("pkg-1.0.0.tar.gz", b"b".as_slice()),
                ]);
                run(&ctx).expect("target");
                assert!(
                    fixture
                        .logger
                        .contains(Level::Info, "[dry-run] uploading 2 distributions to PyPI")
                );
            },
        );
    }
}
