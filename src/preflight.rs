//! Infrastructure checks run once at startup.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use crate::garden_config::PreflightSection;
use crate::process::run_shell;

/// Run every configured check in `dir`. The first failing check aborts
/// with its output.
pub async fn run_checks(section: &PreflightSection, dir: &Path) -> Result<()> {
    let limit = Duration::from_secs(section.timeout_secs);
    for command in &section.commands {
        debug!(command = %command, "preflight check");
        let out = run_shell(command, dir, limit).await?;
        if !out.success() {
            bail!(
                "Preflight check `{}` failed: {}",
                command,
                out.output.trim()
            );
        }
    }
    info!(checks = section.commands.len(), "preflight checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_all_checks_pass() {
        let dir = tempdir().unwrap();
        let section = PreflightSection {
            commands: vec!["true".into(), "echo ok".into()],
            timeout_secs: 5,
        };
        run_checks(&section, dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_check_reports_command() {
        let dir = tempdir().unwrap();
        let section = PreflightSection {
            commands: vec!["true".into(), "echo 'daemon not running'; exit 1".into()],
            timeout_secs: 5,
        };
        let err = run_checks(&section, dir.path()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Preflight check"));
        assert!(msg.contains("daemon not running"));
    }

    #[tokio::test]
    async fn test_no_checks() {
        let dir = tempdir().unwrap();
        let section = PreflightSection {
            commands: vec![],
            timeout_secs: 5,
        };
        assert!(run_checks(&section, dir.path()).await.is_ok());
    }
}
