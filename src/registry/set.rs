//! Ordered registry set keyed by host

use super::credential::{RegistryCredential, DEFAULT_MIRROR_HOST};
use crate::error::{CharmError, Result};
use indexmap::IndexMap;
use serde_json::Value;

/// Registries keyed by host.
///
/// Iteration follows the first-seen order of each host; a later entry for
/// the same host replaces the earlier value in place. This keeps re-renders
/// of identical input byte-for-byte identical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySet {
    entries: IndexMap<String, RegistryCredential>,
}

impl RegistrySet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate the `custom_registries` JSON array
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| CharmError::Validation(format!("Failed to decode json string: {}", e)))?;
        let items = match value {
            Value::Array(items) => items,
            _ => {
                return Err(CharmError::Validation(
                    "custom_registries is not a list".to_string(),
                ))
            }
        };

        let mut set = Self::new();
        for (index, item) in items.iter().enumerate() {
            set.insert(RegistryCredential::from_value(index, item)?);
        }
        Ok(set)
    }

    /// Insert a credential; an existing host keeps its position
    pub fn insert(&mut self, credential: RegistryCredential) {
        self.entries.insert(credential.host.clone(), credential);
    }

    /// Add a relation-supplied registry after the configured ones
    pub fn merge(mut self, credential: RegistryCredential) -> Self {
        self.insert(credential);
        self
    }

    /// Ensure a `docker.io` mirror exists, placing the default one first
    pub fn with_default_mirror(self) -> Self {
        if self.entries.contains_key(DEFAULT_MIRROR_HOST) {
            return self;
        }
        let mut entries = IndexMap::with_capacity(self.entries.len() + 1);
        entries.insert(
            DEFAULT_MIRROR_HOST.to_string(),
            RegistryCredential::default_mirror(),
        );
        entries.extend(self.entries);
        Self { entries }
    }

    /// Look up a registry by host
    pub fn get(&self, host: &str) -> Option<&RegistryCredential> {
        self.entries.get(host)
    }

    /// Registries in render order
    pub fn iter(&self) -> impl Iterator<Item = &RegistryCredential> {
        self.entries.values()
    }

    /// Hosts in render order
    pub fn hosts(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RegistryCredential> for RegistrySet {
    fn from_iter<I: IntoIterator<Item = RegistryCredential>>(iter: I) -> Self {
        let mut set = Self::new();
        for credential in iter {
            set.insert(credential);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::password::Password;

    #[test]
    fn test_parse_empty() {
        assert!(RegistrySet::parse("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        let err = RegistrySet::parse("[{").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Failed to decode json string"));

        let err = RegistrySet::parse(r#"{"url": "r.io"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: custom_registries is not a list"
        );
    }

    #[test]
    fn test_missing_url_fails_whole_set() {
        let json = r#"[{"url": "https://a.io"}, {"username": "u"}]"#;
        assert!(RegistrySet::parse(json).unwrap_err().is_validation());
    }

    #[test]
    fn test_duplicate_host_last_wins() {
        let json = r#"[
            {"url": "https://a.io", "username": "first"},
            {"url": "https://b.io"},
            {"url": "http://a.io/", "username": "second"}
        ]"#;
        let set = RegistrySet::parse(json).unwrap();
        assert_eq!(set.hosts(), vec!["a.io", "b.io"]);
        let a = set.get("a.io").unwrap();
        assert_eq!(a.username.as_deref(), Some("second"));
        assert_eq!(a.url, "http://a.io/");
    }

    #[test]
    fn test_default_mirror_inserted_first() {
        let set = RegistrySet::parse(r#"[{"url": "https://a.io"}]"#)
            .unwrap()
            .with_default_mirror();
        assert_eq!(set.hosts(), vec!["docker.io", "a.io"]);
        assert_eq!(
            set.get("docker.io").unwrap().url,
            "https://registry-1.docker.io"
        );
    }

    #[test]
    fn test_configured_docker_io_overrides_default() {
        let set = RegistrySet::parse(r#"[{"url": "https://mirror.local", "host": "docker.io"}]"#)
            .unwrap()
            .with_default_mirror();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("docker.io").unwrap().url, "https://mirror.local");
    }

    #[test]
    fn test_merge_relation_registry() {
        let mut relation = RegistryCredential::new("10.0.0.5:5000");
        relation.username = Some("admin".to_string());
        relation.password = Some(Password::PlainText("secret".to_string()));

        let set = RegistrySet::parse(r#"[{"url": "https://a.io"}]"#)
            .unwrap()
            .merge(relation);
        assert_eq!(set.hosts(), vec!["a.io", "10.0.0.5:5000"]);
        assert!(set.get("10.0.0.5:5000").unwrap().has_auth());
    }

    #[test]
    fn test_collect() {
        let set: RegistrySet = ["https://a.io", "https://b.io", "https://a.io"]
            .into_iter()
            .map(RegistryCredential::new)
            .collect();
        assert_eq!(set.hosts(), vec!["a.io", "b.io"]);
    }
}
