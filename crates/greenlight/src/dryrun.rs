//! Process-wide dry-run gate.
//!
//! When `DRY_RUN` is set to a truthy value every side-effecting call in the
//! engine is skipped while the surrounding logic and logging still run, so a
//! dry release produces the same log shape as a real one modulo a constant
//! prefix.

/// Environment variable controlling the gate.
pub const DRY_RUN_ENV: &str = "DRY_RUN";

/// Whether external side effects should actually be performed.
///
/// `true`, `1`, and `yes` (case-insensitive) disable side effects; anything
/// else, including an unset variable, enables them.
pub fn should_perform() -> bool {
    match std::env::var(DRY_RUN_ENV) {
        Ok(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ),
        Err(_) => true,
    }
}

/// Log-line prefix marking skipped effects. Empty in live mode.
pub fn prefix() -> &'static str {
    if should_perform() { "" } else { "[dry-run] " }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_means_perform() {
        temp_env::with_var_unset(DRY_RUN_ENV, || {
            assert!(should_perform());
            assert_eq!(prefix(), "");
        });
    }

    #[test]
    fn truthy_values_disable_effects() {
        for value in ["true", "TRUE", "1", "yes", "Yes", " true "] {
            temp_env::with_var(DRY_RUN_ENV, Some(value), || {
                assert!(!should_perform(), "value {value:?}");
                assert_eq!(prefix(), "[dry-run] ");
            });
        }
    }

    #[test]
    fn other_values_keep_effects_on() {
        for value in ["false", "0", "no", "", "dry"] {
            temp_env::with_var(DRY_RUN_ENV, Some(value), || {
                assert!(should_perform(), "value {value:?}");
            });
        }
    }
}
