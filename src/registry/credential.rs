//! Registry credentials
//!
//! Each entry of the `custom_registries` option is a JSON object describing
//! one registry: its URL, optional basic-auth credentials and optional TLS
//! material. Entries are validated individually and keyed by host.

use crate::error::{CharmError, Result};
use crate::render::password::Password;
use base64::Engine;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Host of the registry mirror that is always configured
pub const DEFAULT_MIRROR_HOST: &str = "docker.io";

/// Endpoint of the default mirror
pub const DEFAULT_MIRROR_URL: &str = "https://registry-1.docker.io";

const STRING_FIELDS: &[&str] = &["url", "host", "username", "ca_file", "cert_file", "key_file"];

const KNOWN_FIELDS: &[&str] = &[
    "url",
    "host",
    "username",
    "password",
    "ca_file",
    "cert_file",
    "key_file",
    "insecure_skip_verify",
];

/// Strip the scheme and trailing slashes of a URL, keeping `host[:port]`.
///
/// `http://10.10.10.10:8000` becomes `10.10.10.10:8000`, and
/// `https://myregistry.io:8000/` becomes `myregistry.io:8000`. Input without
/// a scheme is returned unchanged.
pub fn strip_url(url: &str) -> &str {
    let trimmed = url.trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    }
}

/// Decode inline TLS material, ignoring embedded whitespace
pub fn decode_base64(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

/// Kind of TLS file attached to a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsKind {
    Ca,
    Cert,
    Key,
}

impl TlsKind {
    pub const ALL: [TlsKind; 3] = [TlsKind::Ca, TlsKind::Cert, TlsKind::Key];

    /// Option field holding this file
    pub fn field(self) -> &'static str {
        match self {
            TlsKind::Ca => "ca_file",
            TlsKind::Cert => "cert_file",
            TlsKind::Key => "key_file",
        }
    }

    /// Extension of the materialized file
    pub fn extension(self) -> &'static str {
        match self {
            TlsKind::Ca => "ca",
            TlsKind::Cert => "cert",
            TlsKind::Key => "key",
        }
    }
}

/// Where TLS material comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsSource {
    /// Base64-encoded file contents, written under the config directory
    Inline(String),
    /// Existing file on disk
    Path(PathBuf),
}

/// A validated registry credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    /// Registry endpoint, the identity of the entry
    pub url: String,
    /// `host[:port]` key into the mirrors and configs tables
    pub host: String,
    pub username: Option<String>,
    pub password: Option<Password>,
    pub ca_file: Option<TlsSource>,
    pub cert_file: Option<TlsSource>,
    pub key_file: Option<TlsSource>,
    pub insecure_skip_verify: bool,
}

impl RegistryCredential {
    /// Credential-less registry, host derived from the URL
    pub fn new(url: &str) -> Self {
        Self::with_host(strip_url(url), url)
    }

    /// Credential-less registry with an explicit host
    pub fn with_host(host: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            host: host.to_string(),
            username: None,
            password: None,
            ca_file: None,
            cert_file: None,
            key_file: None,
            insecure_skip_verify: false,
        }
    }

    /// The default `docker.io` mirror
    pub fn default_mirror() -> Self {
        Self::with_host(DEFAULT_MIRROR_HOST, DEFAULT_MIRROR_URL)
    }

    /// Validate one raw `custom_registries` entry
    pub fn from_value(index: usize, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            CharmError::Validation(format!("registry #{} is not in object form", index))
        })?;

        if !obj.contains_key("url") {
            return Err(invalid(index, "missing required field url"));
        }
        for field in STRING_FIELDS {
            match obj.get(*field) {
                None | Some(Value::Null) | Some(Value::String(_)) => {}
                Some(other) => {
                    return Err(invalid(
                        index,
                        &format!("field {}={} is not a string", field, other),
                    ))
                }
            }
        }
        if let Some(value) = obj.get("insecure_skip_verify") {
            if !value.is_boolean() {
                return Err(invalid(
                    index,
                    &format!("field insecure_skip_verify='{}' is not a boolean", value),
                ));
            }
        }
        if let Some(field) = obj.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
            return Err(invalid(index, &format!("field {} may not be specified", field)));
        }

        let url = string_field(obj, "url")
            .ok_or_else(|| invalid(index, "field url may not be empty"))?;
        if url.chars().any(char::is_whitespace) || strip_url(&url).is_empty() {
            return Err(invalid(
                index,
                &format!("field url='{}' is not a valid registry url", url),
            ));
        }
        let host = string_field(obj, "host").unwrap_or_else(|| strip_url(&url).to_string());

        let password = match obj.get("password") {
            Some(value) => Password::classify(value).map_err(|e| match e {
                CharmError::Validation(msg) => invalid(index, &format!("field password: {}", msg)),
                other => other,
            })?,
            None => None,
        };

        let mut credential = Self {
            username: string_field(obj, "username"),
            password,
            insecure_skip_verify: obj
                .get("insecure_skip_verify")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            ..Self::with_host(&host, &url)
        };

        for kind in TlsKind::ALL {
            if let Some(data) = string_field(obj, kind.field()) {
                if decode_base64(&data).is_err() {
                    return Err(invalid(
                        index,
                        &format!("field {} is not valid base64", kind.field()),
                    ));
                }
                credential.set_tls_source(kind, TlsSource::Inline(data));
            }
        }

        Ok(credential)
    }

    /// TLS source of the given kind
    pub fn tls_source(&self, kind: TlsKind) -> Option<&TlsSource> {
        match kind {
            TlsKind::Ca => self.ca_file.as_ref(),
            TlsKind::Cert => self.cert_file.as_ref(),
            TlsKind::Key => self.key_file.as_ref(),
        }
    }

    /// Set the TLS source of the given kind
    pub fn set_tls_source(&mut self, kind: TlsKind, source: TlsSource) {
        let slot = match kind {
            TlsKind::Ca => &mut self.ca_file,
            TlsKind::Cert => &mut self.cert_file,
            TlsKind::Key => &mut self.key_file,
        };
        *slot = Some(source);
    }

    /// Whether basic-auth settings are present
    pub fn has_auth(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Whether a TLS table is needed
    pub fn has_tls(&self) -> bool {
        self.insecure_skip_verify || TlsKind::ALL.iter().any(|k| self.tls_source(*k).is_some())
    }

    /// File name stem of materialized TLS files
    pub fn tls_file_stem(&self) -> &str {
        strip_url(&self.url)
    }
}

fn invalid(index: usize, message: &str) -> CharmError {
    CharmError::Validation(format!("registry #{} {}", index, message))
}

/// Non-empty string value of a field
fn string_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_url() {
        assert_eq!(strip_url("http://10.10.10.10:8000"), "10.10.10.10:8000");
        assert_eq!(strip_url("https://myregistry.io:8000/"), "myregistry.io:8000");
        assert_eq!(strip_url("myregistry.io:8000"), "myregistry.io:8000");
    }

    #[test]
    fn test_host_derived_from_url() {
        let cred =
            RegistryCredential::from_value(0, &json!({"url": "http://10.10.10.10:8000"})).unwrap();
        assert_eq!(cred.host, "10.10.10.10:8000");
        assert!(!cred.has_auth());
        assert!(!cred.has_tls());
    }

    #[test]
    fn test_explicit_host_kept() {
        let cred = RegistryCredential::from_value(
            0,
            &json!({"url": "https://mirror.local", "host": "docker.io"}),
        )
        .unwrap();
        assert_eq!(cred.host, "docker.io");
        assert_eq!(cred.tls_file_stem(), "mirror.local");
    }

    #[test]
    fn test_empty_host_is_derived() {
        let cred =
            RegistryCredential::from_value(0, &json!({"url": "https://r.io", "host": ""})).unwrap();
        assert_eq!(cred.host, "r.io");
    }

    #[test]
    fn test_full_entry() {
        let cred = RegistryCredential::from_value(
            0,
            &json!({
                "url": "https://my.registry:5000",
                "username": "user",
                "password": "pass",
                "ca_file": "aGVsbG8gd29ybGQgY2EtZmlsZQ==",
                "insecure_skip_verify": true
            }),
        )
        .unwrap();
        assert_eq!(cred.username.as_deref(), Some("user"));
        assert_eq!(cred.password, Some(Password::PlainText("pass".to_string())));
        assert_eq!(
            cred.tls_source(TlsKind::Ca),
            Some(&TlsSource::Inline("aGVsbG8gd29ybGQgY2EtZmlsZQ==".to_string()))
        );
        assert!(cred.insecure_skip_verify);
        assert!(cred.has_auth());
        assert!(cred.has_tls());
    }

    #[test]
    fn test_missing_url() {
        let err = RegistryCredential::from_value(1, &json!({"host": "r.io"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: registry #1 missing required field url"
        );
    }

    #[test]
    fn test_invalid_entries() {
        let cases = [
            json!("https://r.io"),
            json!({"url": ""}),
            json!({"url": "https://"}),
            json!({"url": "https://r .io"}),
            json!({"url": 5}),
            json!({"url": "https://r.io", "username": ["a"]}),
            json!({"url": "https://r.io", "insecure_skip_verify": "yes"}),
            json!({"url": "https://r.io", "mirror": "x"}),
            json!({"url": "https://r.io", "password": 12}),
            json!({"url": "https://r.io", "ca_file": "not base64!"}),
        ];
        for case in cases {
            let result = RegistryCredential::from_value(0, &case);
            assert!(
                result.as_ref().is_err_and(|e| e.is_validation()),
                "expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn test_password_error_names_entry() {
        let err = RegistryCredential::from_value(3, &json!({"url": "r.io", "password": [1]}))
            .unwrap_err();
        assert!(err.to_string().contains("registry #3 field password"));
    }

    #[test]
    fn test_base64_with_newlines() {
        assert_eq!(decode_base64("aGVs\nbG8=\n").unwrap(), b"hello");
    }
}
