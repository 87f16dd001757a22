//! Bounded external command execution

use crate::error::{CharmError, Result};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default bound on any host command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a program and return its stdout.
///
/// Fails with [`CharmError::Timeout`] if it does not finish within `timeout`
/// and with [`CharmError::Service`] on a non-zero exit.
pub async fn output(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    debug!("Running {} {}", program, args.join(" "));
    let result = tokio::time::timeout(
        timeout,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await;

    match result {
        Ok(Ok(out)) if out.status.success() => Ok(String::from_utf8_lossy(&out.stdout).into_owned()),
        Ok(Ok(out)) => Err(CharmError::Service(format!(
            "{} {} failed ({}): {}",
            program,
            args.join(" "),
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ))),
        Ok(Err(e)) => Err(CharmError::Service(format!("Failed to execute {}: {}", program, e))),
        Err(_) => Err(CharmError::Timeout(format!(
            "{} {} did not finish within {:?}",
            program,
            args.join(" "),
            timeout
        ))),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output() {
        let out = output("echo", &["hello"], DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_failure_is_service_error() {
        let err = output("false", &[], DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, CharmError::Service(_)));

        let err = output("definitely-not-a-real-binary", &[], DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CharmError::Service(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = output("sleep", &["5"], Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, CharmError::Timeout(_)));
    }
}
