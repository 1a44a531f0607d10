//! Scoped working directory for one release attempt.

use std::path::Path;

use anyhow::{Context, Result};

/// Directory-name prefix under the system temp root.
const PREFIX: &str = "greenlight-";

/// Create a uniquely-named empty directory, run `body` with its path, and
/// remove the tree afterwards. Removal happens on every exit path: the
/// directory guard cleans up on drop, so an error or panic inside `body`
/// still releases the workspace.
pub fn with_temp_dir<T>(body: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    let dir = tempfile::Builder::new()
        .prefix(PREFIX)
        .tempdir()
        .context("failed to create working directory")?;
    let value = body(dir.path())?;
    dir.close().context("failed to remove working directory")?;
    Ok(value)
}
