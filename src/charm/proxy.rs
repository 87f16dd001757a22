//! Proxy settings for the containerd service

use crate::config::CharmConfig;
use serde::{Deserialize, Serialize};

/// systemd drop-in carrying the proxy environment
pub const PROXY_DROP_IN: &str = "/etc/systemd/system/containerd.service.d/proxy.conf";

/// HTTP(S) proxy settings; empty strings mean unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy: String,
}

impl ProxySettings {
    /// Juju model proxy settings from the hook environment
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            http_proxy: var("JUJU_CHARM_HTTP_PROXY"),
            https_proxy: var("JUJU_CHARM_HTTPS_PROXY"),
            no_proxy: var("JUJU_CHARM_NO_PROXY"),
        }
    }

    /// Explicitly configured charm options
    pub fn from_config(config: &CharmConfig) -> Self {
        Self {
            http_proxy: config.http_proxy.clone(),
            https_proxy: config.https_proxy.clone(),
            no_proxy: config.no_proxy.clone(),
        }
    }

    /// Effective settings, per key: principal override, then charm
    /// config, then the Juju model environment
    pub fn resolve(config: &CharmConfig, juju: &ProxySettings, principal: &ProxySettings) -> Self {
        let configured = Self::from_config(config);
        let empty = Self::default();
        let model = if config.disable_juju_proxy { &empty } else { juju };

        Self {
            http_proxy: first_set([&principal.http_proxy, &configured.http_proxy, &model.http_proxy]),
            https_proxy: first_set([
                &principal.https_proxy,
                &configured.https_proxy,
                &model.https_proxy,
            ]),
            no_proxy: first_set([&principal.no_proxy, &configured.no_proxy, &model.no_proxy]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.http_proxy.is_empty() && self.https_proxy.is_empty() && self.no_proxy.is_empty()
    }

    /// systemd drop-in text, `None` when no proxy is set
    pub fn render_drop_in(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut out = String::from("[Service]\n");
        for (name, value) in [
            ("HTTP_PROXY", &self.http_proxy),
            ("HTTPS_PROXY", &self.https_proxy),
            ("NO_PROXY", &self.no_proxy),
        ] {
            if value.is_empty() {
                continue;
            }
            let value = systemd_escape(value);
            out.push_str(&format!("Environment=\"{}={}\"\n", name, value));
            out.push_str(&format!(
                "Environment=\"{}={}\"\n",
                name.to_lowercase(),
                value
            ));
        }
        Some(out)
    }
}

fn first_set(candidates: [&String; 3]) -> String {
    candidates
        .into_iter()
        .find(|value| !value.is_empty())
        .cloned()
        .unwrap_or_default()
}

fn systemd_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(http: &str, https: &str, no: &str) -> ProxySettings {
        ProxySettings {
            http_proxy: http.to_string(),
            https_proxy: https.to_string(),
            no_proxy: no.to_string(),
        }
    }

    #[test]
    fn test_precedence() {
        let config = CharmConfig {
            http_proxy: "http://config:3128".to_string(),
            https_proxy: "http://config:3128".to_string(),
            ..CharmConfig::default()
        };
        let juju = settings("http://juju:3128", "http://juju:3128", "10.0.0.0/8");
        let principal = settings("", "http://principal:3128", "");

        let resolved = ProxySettings::resolve(&config, &juju, &principal);
        assert_eq!(resolved.http_proxy, "http://config:3128");
        assert_eq!(resolved.https_proxy, "http://principal:3128");
        assert_eq!(resolved.no_proxy, "10.0.0.0/8");
    }

    #[test]
    fn test_disable_juju_proxy() {
        let config = CharmConfig {
            disable_juju_proxy: true,
            ..CharmConfig::default()
        };
        let juju = settings("http://juju:3128", "", "");
        let resolved = ProxySettings::resolve(&config, &juju, &ProxySettings::default());
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_drop_in() {
        let text = settings("http://proxy:3128", "", "localhost,127.0.0.1")
            .render_drop_in()
            .unwrap();
        assert_eq!(
            text,
            "[Service]\n\
             Environment=\"HTTP_PROXY=http://proxy:3128\"\n\
             Environment=\"http_proxy=http://proxy:3128\"\n\
             Environment=\"NO_PROXY=localhost,127.0.0.1\"\n\
             Environment=\"no_proxy=localhost,127.0.0.1\"\n"
        );
    }

    #[test]
    fn test_no_drop_in_without_proxy() {
        assert!(ProxySettings::default().render_drop_in().is_none());
    }
}
