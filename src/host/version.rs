//! Installed containerd version

use super::command;
use crate::error::Result;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

static VERSION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Version:\s+([\d.]+)").unwrap());

/// Version reported by `ctr version`.
///
/// Client and server both report a version; the result is only returned
/// when exactly one distinct version appears.
pub fn parse_ctr_version(output: &str) -> Option<String> {
    let versions: BTreeSet<&str> = output
        .lines()
        .filter_map(|line| VERSION_LINE.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    if versions.len() == 1 {
        versions.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

/// Query the running containerd for its version
pub async fn containerd_version(timeout: Duration) -> Result<Option<String>> {
    let out = command::output("ctr", &["version"], timeout).await?;
    Ok(parse_ctr_version(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTR_VERSION: &str = "\
Client:
  Version:  1.6.12
  Revision: a05d175400b1145e5e6a735a6710579d181e7fb0
  Go version: go1.18.1

Server:
  Version:  1.6.12
  Revision: a05d175400b1145e5e6a735a6710579d181e7fb0
  UUID: 9e2cd9d2-4b5e-4b8a-8a0a-0b0b9c5a7f3e
";

    #[test]
    fn test_single_version() {
        assert_eq!(parse_ctr_version(CTR_VERSION).as_deref(), Some("1.6.12"));
    }

    #[test]
    fn test_mismatched_versions() {
        let output = CTR_VERSION.replacen("1.6.12", "1.5.9", 1);
        assert_eq!(parse_ctr_version(&output), None);
    }

    #[test]
    fn test_repeated_calls() {
        for _ in 0..3 {
            assert_eq!(parse_ctr_version(CTR_VERSION).as_deref(), Some("1.6.12"));
        }
        assert_eq!(
            parse_ctr_version("Server:\n\tVersion:\t2.0.0\n").as_deref(),
            Some("2.0.0")
        );
    }

    #[test]
    fn test_no_version() {
        assert_eq!(parse_ctr_version("ctr: connection refused\n"), None);
    }
}
