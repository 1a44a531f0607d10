//! Container-build trigger target: POST the tag to a build webhook.

use anyhow::{Context, Result, bail};
use serde_json::json;

use super::TargetContext;
use crate::dryrun;

/// Webhook endpoint; the target skips cleanly without it.
pub const TRIGGER_URL_ENV: &str = "DOCKER_TRIGGER_URL";

pub fn run(ctx: &TargetContext) -> Result<()> {
    let Some(url) = std::env::var(TRIGGER_URL_ENV).ok().filter(|u| !u.is_empty()) else {
        ctx.logger
            .info(&format!("skipping docker target: {TRIGGER_URL_ENV} is not set"));
        return Ok(());
    };

    let tag = &ctx.tag.ref_name;
    ctx.logger.info(&format!(
        "{}triggering container build for {tag}",
        dryrun::prefix()
    ));
    if dryrun::should_perform() {
        let payload = json!({
            "source_type": "Tag",
            "source_name": tag,
        });
        let resp = reqwest::blocking::Client::new()
            .post(&url)
            .json(&payload)
            .send()
            .context("container build trigger request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("unexpected status from container build trigger: {status}");
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
    use std::io::Read;
    use std::sync::Arc;

    #[test]
    fn skips_without_trigger_url() {
        temp_env::with_var_unset(TRIGGER_URL_ENV, || {
            let fixture = fixture();
            let ctx = fixture.context(vec![]);
            run(&ctx).expect("target");
            assert!(fixture.logger.contains(Level::Info, "skipping docker target"));
        });
    }

    #[test]
    fn posts_tag_payload() {
        let server = Arc::new(tiny_http::Server::http("127.0.0.1:0").expect("server"));
        let url = format!("http://{}/trigger", server.server_addr());
        let handle = {
            let server = Arc::clone(&server);
            std::thread::spawn(move || {
                let mut request = server.recv().expect("request");
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                request
                    .respond(tiny_http::Response::from_string("ok"))
                    .expect("respond");
                body
            })
        };

        temp_env::with_vars(
            [(TRIGGER_URL_ENV, Some(url.as_str())), (DRY_RUN_ENV, None)],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![]);
                run(&ctx).expect("target");
            },
        );

        let body = handle.join().expect("join");
        assert!(body.contains("\"source_type\":\"Tag\""), "{body}");
        assert!(body.contains("\"source_name\":\"v1.0.0\""), "{body}");
    }

    #[test]
    fn dry_run_does_not_post() {
        temp_env::with_vars(
            [
                (TRIGGER_URL_ENV, Some("http://127.0.0.1:1/unreachable")),
                (DRY_RUN_ENV, Some("true")),
            ],
            || {
                let fixture = fixture();
                let ctx = fixture.context(vec![]);
                // An unreachable endpoint proves nothing was sent.
                run(&ctx).expect("target");
                assert!(
                    fixture
                        .logger
                        .contains(Level::Info, "[dry-run] triggering container build")
                );
            },
        );
    }
}
