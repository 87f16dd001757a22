//! Table paths for the two containerd config schema versions
//!
//! containerd accepts two incompatible layouts for `config.toml`. Version 1
//! names its plugins by short id (`plugins.cri`), version 2 by fully
//! qualified id (`plugins."io.containerd.grpc.v1.cri"`) and nests registry
//! credentials differently. The renderer only ever asks a [`TablePaths`] for
//! table names, so nothing above this module branches on the version.

use crate::error::{CharmError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use toml_edit::Key;

/// containerd config schema version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    #[default]
    V2,
}

impl SchemaVersion {
    /// Table path provider for this version
    pub fn paths(self) -> &'static dyn TablePaths {
        match self {
            SchemaVersion::V1 => &V1Paths,
            SchemaVersion::V2 => &V2Paths,
        }
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = CharmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v1" => Ok(SchemaVersion::V1),
            "v2" => Ok(SchemaVersion::V2),
            other => Err(CharmError::Validation(format!(
                "unsupported config_version '{}', expected v1 or v2",
                other
            ))),
        }
    }
}

/// Logical config sections the renderer writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    CriRoot,
    CriContainerd,
    DefaultRuntime,
    UntrustedRuntime,
    CriRuntimes,
    CriCni,
    CriRegistry,
    CriRegistryMirrors,
    CriRegistryAuth,
    CriRegistryTls,
    Cgroups,
    DiffService,
    LinuxRuntime,
    Opt,
    Restart,
    Scheduler,
}

impl Section {
    pub const ALL: [Section; 16] = [
        Section::CriRoot,
        Section::CriContainerd,
        Section::DefaultRuntime,
        Section::UntrustedRuntime,
        Section::CriRuntimes,
        Section::CriCni,
        Section::CriRegistry,
        Section::CriRegistryMirrors,
        Section::CriRegistryAuth,
        Section::CriRegistryTls,
        Section::Cgroups,
        Section::DiffService,
        Section::LinuxRuntime,
        Section::Opt,
        Section::Restart,
        Section::Scheduler,
    ];

    /// Stable logical name
    pub fn name(self) -> &'static str {
        match self {
            Section::CriRoot => "cri_root",
            Section::CriContainerd => "cri_containerd",
            Section::DefaultRuntime => "default_runtime",
            Section::UntrustedRuntime => "untrusted_runtime",
            Section::CriRuntimes => "cri_runtimes",
            Section::CriCni => "cri_cni",
            Section::CriRegistry => "cri_registry",
            Section::CriRegistryMirrors => "cri_registry_mirrors",
            Section::CriRegistryAuth => "cri_registry_auth",
            Section::CriRegistryTls => "cri_registry_tls",
            Section::Cgroups => "cgroups",
            Section::DiffService => "diff_service",
            Section::LinuxRuntime => "linux_runtime",
            Section::Opt => "opt",
            Section::Restart => "restart",
            Section::Scheduler => "scheduler",
        }
    }
}

impl FromStr for Section {
    type Err = CharmError;

    fn from_str(s: &str) -> Result<Self> {
        Section::ALL
            .into_iter()
            .find(|section| section.name() == s)
            .ok_or_else(|| CharmError::Validation(format!("unknown config section '{}'", s)))
    }
}

/// Key segments of a table path
pub type TablePath = Vec<String>;

/// Version-specific table naming
pub trait TablePaths: Send + Sync {
    /// Schema version served by this provider
    fn version(&self) -> SchemaVersion;

    /// Key segments of a section's table
    fn table(&self, section: Section) -> &'static [&'static str];

    /// Top-level key preceding everything else
    fn header(&self) -> Option<(&'static str, i64)>;

    /// Whether the default runtime is selected by name (`default_runtime_name`)
    fn names_default_runtime(&self) -> bool;

    /// Table holding the username/password of a registry
    fn auth_table(&self, host: &str) -> TablePath;

    /// Table holding the TLS settings of a registry
    fn tls_table(&self, host: &str) -> TablePath {
        join(self.table(Section::CriRegistryTls), &[host, "tls"])
    }

    /// Mirror table of a registry
    fn mirror_table(&self, host: &str) -> TablePath {
        join(self.table(Section::CriRegistryMirrors), &[host])
    }

    /// Table of a named runtime
    fn runtime_table(&self, name: &str) -> TablePath {
        join(self.table(Section::CriRuntimes), &[name])
    }

    /// Lookup of every logical section name to its dotted table path
    fn lookup(&self) -> Vec<(&'static str, String)> {
        Section::ALL
            .into_iter()
            .map(|section| (section.name(), dotted(self.table(section))))
            .collect()
    }
}

/// Version 1 layout (`plugins.cri`)
pub struct V1Paths;

impl TablePaths for V1Paths {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V1
    }

    fn table(&self, section: Section) -> &'static [&'static str] {
        match section {
            Section::CriRoot => &["plugins", "cri"],
            Section::CriContainerd => &["plugins", "cri", "containerd"],
            Section::DefaultRuntime => &["plugins", "cri", "containerd", "default_runtime"],
            Section::UntrustedRuntime => {
                &["plugins", "cri", "containerd", "untrusted_workload_runtime"]
            }
            Section::CriRuntimes => &["plugins", "cri", "containerd", "runtimes"],
            Section::CriCni => &["plugins", "cri", "cni"],
            Section::CriRegistry => &["plugins", "cri", "registry"],
            Section::CriRegistryMirrors => &["plugins", "cri", "registry", "mirrors"],
            Section::CriRegistryAuth => &["plugins", "cri", "registry", "auths"],
            Section::CriRegistryTls => &["plugins", "cri", "registry", "configs"],
            Section::Cgroups => &["plugins", "cgroups"],
            Section::DiffService => &["plugins", "diff-service"],
            Section::LinuxRuntime => &["plugins", "linux"],
            Section::Opt => &["plugins", "opt"],
            Section::Restart => &["plugins", "restart"],
            Section::Scheduler => &["plugins", "scheduler"],
        }
    }

    fn header(&self) -> Option<(&'static str, i64)> {
        None
    }

    fn names_default_runtime(&self) -> bool {
        false
    }

    fn auth_table(&self, host: &str) -> TablePath {
        join(self.table(Section::CriRegistryAuth), &[host])
    }
}

const V2_CRI: &str = "io.containerd.grpc.v1.cri";

/// Version 2 layout (`plugins."io.containerd.grpc.v1.cri"`)
pub struct V2Paths;

impl TablePaths for V2Paths {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::V2
    }

    fn table(&self, section: Section) -> &'static [&'static str] {
        match section {
            Section::CriRoot => &["plugins", V2_CRI],
            Section::CriContainerd => &["plugins", V2_CRI, "containerd"],
            Section::DefaultRuntime => &["plugins", V2_CRI, "containerd", "default_runtime"],
            Section::UntrustedRuntime => {
                &["plugins", V2_CRI, "containerd", "untrusted_workload_runtime"]
            }
            Section::CriRuntimes => &["plugins", V2_CRI, "containerd", "runtimes"],
            Section::CriCni => &["plugins", V2_CRI, "cni"],
            Section::CriRegistry => &["plugins", V2_CRI, "registry"],
            Section::CriRegistryMirrors => &["plugins", V2_CRI, "registry", "mirrors"],
            Section::CriRegistryAuth | Section::CriRegistryTls => {
                &["plugins", V2_CRI, "registry", "configs"]
            }
            Section::Cgroups => &["plugins", "io.containerd.monitor.v1.cgroups"],
            Section::DiffService => &["plugins", "io.containerd.service.v1.diff-service"],
            Section::LinuxRuntime => &["plugins", "io.containerd.runtime.v1.linux"],
            Section::Opt => &["plugins", "io.containerd.internal.v1.opt"],
            Section::Restart => &["plugins", "io.containerd.internal.v1.restart"],
            Section::Scheduler => &["plugins", "io.containerd.gc.v1.scheduler"],
        }
    }

    fn header(&self) -> Option<(&'static str, i64)> {
        Some(("version", 2))
    }

    fn names_default_runtime(&self) -> bool {
        true
    }

    fn auth_table(&self, host: &str) -> TablePath {
        join(self.table(Section::CriRegistryAuth), &[host, "auth"])
    }
}

fn join(base: &[&str], tail: &[&str]) -> TablePath {
    base.iter().chain(tail).map(|s| s.to_string()).collect()
}

/// Dotted form of a table path, each key quoted only where TOML requires it
pub fn dotted<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| Key::new(segment.as_ref()).to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_version() {
        assert_eq!("v1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert_eq!("v2".parse::<SchemaVersion>().unwrap(), SchemaVersion::V2);
        assert!("v3".parse::<SchemaVersion>().unwrap_err().is_validation());
        assert!("V2".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_v1_credentials_split_across_tables() {
        let paths = SchemaVersion::V1.paths();
        assert_eq!(
            dotted(&paths.auth_table("my.registry:port")),
            r#"plugins.cri.registry.auths."my.registry:port""#
        );
        assert_eq!(
            dotted(&paths.tls_table("my.registry:port")),
            r#"plugins.cri.registry.configs."my.registry:port".tls"#
        );
    }

    #[test]
    fn test_v2_credentials_share_host_table() {
        let paths = SchemaVersion::V2.paths();
        assert_eq!(
            dotted(&paths.auth_table("my.registry:port")),
            r#"plugins."io.containerd.grpc.v1.cri".registry.configs."my.registry:port".auth"#
        );
        assert_eq!(
            dotted(&paths.tls_table("my.registry:port")),
            r#"plugins."io.containerd.grpc.v1.cri".registry.configs."my.registry:port".tls"#
        );
    }

    #[test]
    fn test_runtime_tables() {
        assert_eq!(
            dotted(&SchemaVersion::V2.paths().runtime_table("nvidia-container-runtime")),
            r#"plugins."io.containerd.grpc.v1.cri".containerd.runtimes.nvidia-container-runtime"#
        );
        assert_eq!(
            dotted(&SchemaVersion::V1.paths().runtime_table("my.runtime")),
            r#"plugins.cri.containerd.runtimes."my.runtime""#
        );
    }

    #[test]
    fn test_lookup_covers_every_section() {
        for version in [SchemaVersion::V1, SchemaVersion::V2] {
            let lookup = version.paths().lookup();
            assert_eq!(lookup.len(), Section::ALL.len());
            assert!(lookup.iter().all(|(_, path)| path.starts_with("plugins.")));
        }
        let v1 = SchemaVersion::V1.paths().lookup();
        assert!(v1.contains(&("cri_root", "plugins.cri".to_string())));
        let v2 = SchemaVersion::V2.paths().lookup();
        assert!(v2.contains(&(
            "cri_registry_auth",
            r#"plugins."io.containerd.grpc.v1.cri".registry.configs"#.to_string()
        )));
    }

    #[test]
    fn test_section_names_round_trip() {
        for section in Section::ALL {
            assert_eq!(section.name().parse::<Section>().unwrap(), section);
        }
        assert!("nope".parse::<Section>().is_err());
    }

    #[test]
    fn test_header_and_selector() {
        assert_eq!(SchemaVersion::V1.paths().header(), None);
        assert_eq!(SchemaVersion::V2.paths().header(), Some(("version", 2)));
        assert!(!SchemaVersion::V1.paths().names_default_runtime());
        assert!(SchemaVersion::V2.paths().names_default_runtime());
        assert_eq!(SchemaVersion::V1.paths().version(), SchemaVersion::V1);
    }
}
