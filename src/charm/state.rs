//! Unit state
//!
//! Relation data received from other charms and a record of what was last
//! applied. Passed explicitly into every reconciliation and persisted as JSON
//! between hook invocations.

use super::persist::write_atomic;
use super::proxy::ProxySettings;
use crate::config::CharmConfig;
use crate::error::Result;
use crate::registry::{strip_url, RegistryCredential, TlsKind, TlsSource};
use crate::render::{Password, UntrustedRuntime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CA certificate shared with the docker-registry charm
pub const CA_CRT_PATH: &str = "/root/cdk/ca.crt";
/// Client certificate for the related docker registry
pub const SERVER_CRT_PATH: &str = "/root/cdk/server.crt";
/// Client key for the related docker registry
pub const SERVER_KEY_PATH: &str = "/root/cdk/server.key";

/// Socket published to the principal charm
pub const CONTAINERD_SOCKET: &str = "unix:///var/run/containerd/containerd.sock";

/// Data from the docker-registry relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerRegistryRelation {
    /// `host[:port]` of the registry
    pub netloc: String,
    #[serde(default)]
    pub basic_user: Option<String>,
    #[serde(default)]
    pub basic_password: Option<String>,
    /// Whether the registry serves TLS signed by the shared CA
    #[serde(default)]
    pub tls: bool,
}

impl DockerRegistryRelation {
    /// Registry credential for the related registry
    pub fn credential(&self) -> RegistryCredential {
        let mut credential = RegistryCredential::with_host(strip_url(&self.netloc), &self.netloc);
        if let (Some(user), Some(password)) = (&self.basic_user, &self.basic_password) {
            credential.username = Some(user.clone());
            credential.password = Some(Password::PlainText(password.clone()));
        }
        if self.tls {
            credential.set_tls_source(TlsKind::Ca, TlsSource::Path(PathBuf::from(CA_CRT_PATH)));
            credential.set_tls_source(
                TlsKind::Cert,
                TlsSource::Path(PathBuf::from(SERVER_CRT_PATH)),
            );
            credential.set_tls_source(
                TlsKind::Key,
                TlsSource::Path(PathBuf::from(SERVER_KEY_PATH)),
            );
        }
        credential
    }
}

/// Data from the principal charm on the containerd relation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalRelation {
    /// Sandbox image requested by the principal
    pub sandbox_image: Option<String>,
    /// Proxy overrides; these win over configured values
    pub proxy: ProxySettings,
}

/// What the last reconciliation applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppliedState {
    /// `custom_registries` as last rendered, for TLS file cleanup
    pub custom_registries: Option<String>,
    pub proxy: Option<ProxySettings>,
    /// Digest of the persisted `config.toml`
    pub config_digest: Option<String>,
    /// A restart was requested but has not succeeded yet
    pub restart_pending: bool,
}

/// Explicit state record of one unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitState {
    pub docker_registry: Option<DockerRegistryRelation>,
    pub untrusted: Option<UntrustedRuntime>,
    pub principal: PrincipalRelation,
    /// Names of applications related on the containerd endpoint
    pub related_applications: Vec<String>,
    /// Result of the NVIDIA hardware probe, `None` until probed
    pub gpu_present: Option<bool>,
    pub applied: AppliedState,
}

impl UnitState {
    /// Load state, starting fresh when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist state atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())
    }
}

/// Relation data published to the principal charm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEndpoint {
    pub socket: String,
    pub runtime: String,
    pub nvidia_enabled: bool,
}

impl RuntimeEndpoint {
    pub fn from_state(config: &CharmConfig, state: &UnitState) -> Result<Self> {
        let gpu = config.gpu_driver()?;
        Ok(Self {
            socket: CONTAINERD_SOCKET.to_string(),
            runtime: "remote".to_string(),
            nvidia_enabled: gpu.resolve(state.gpu_present.unwrap_or(false)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_docker_registry_credential() {
        let relation = DockerRegistryRelation {
            netloc: "10.0.0.5:5000".to_string(),
            basic_user: Some("admin".to_string()),
            basic_password: Some("secret".to_string()),
            tls: true,
        };
        let credential = relation.credential();
        assert_eq!(credential.host, "10.0.0.5:5000");
        assert_eq!(credential.url, "10.0.0.5:5000");
        assert_eq!(credential.username.as_deref(), Some("admin"));
        assert_eq!(
            credential.tls_source(TlsKind::Key),
            Some(&TlsSource::Path(PathBuf::from(SERVER_KEY_PATH)))
        );
    }

    #[test]
    fn test_docker_registry_without_auth() {
        let relation = DockerRegistryRelation {
            netloc: "registry.local".to_string(),
            basic_user: Some("admin".to_string()),
            basic_password: None,
            tls: false,
        };
        let credential = relation.credential();
        assert!(!credential.has_auth());
        assert!(!credential.has_tls());
    }

    #[test]
    fn test_state_round_trip() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        assert_eq!(UnitState::load(&path).unwrap(), UnitState::default());

        let mut state = UnitState::default();
        state.related_applications = vec!["kubernetes-worker".to_string()];
        state.gpu_present = Some(true);
        state.applied.restart_pending = true;
        state.save(&path).unwrap();

        assert_eq!(UnitState::load(&path).unwrap(), state);
    }

    #[test]
    fn test_partial_state_json() {
        let state: UnitState =
            serde_json::from_str(r#"{"untrusted": {"name": "kata", "binary_path": "/usr/bin/kata-runtime"}}"#)
                .unwrap();
        assert_eq!(state.untrusted.unwrap().name, "kata");
        assert!(state.docker_registry.is_none());
    }

    #[test]
    fn test_runtime_endpoint() {
        let mut state = UnitState::default();
        let config = CharmConfig::default();
        assert!(!RuntimeEndpoint::from_state(&config, &state).unwrap().nvidia_enabled);

        state.gpu_present = Some(true);
        let endpoint = RuntimeEndpoint::from_state(&config, &state).unwrap();
        assert!(endpoint.nvidia_enabled);
        assert_eq!(endpoint.socket, CONTAINERD_SOCKET);
        assert_eq!(endpoint.runtime, "remote");
    }
}
