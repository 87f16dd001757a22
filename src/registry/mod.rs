//! Custom registry credentials
//!
//! Parsing and validation of the `custom_registries` option, the ordered
//! host-keyed registry set, and the TLS files referenced by it.

pub mod credential;
pub mod set;
pub mod tls;

pub use credential::{strip_url, RegistryCredential, TlsKind, TlsSource};
pub use set::RegistrySet;
pub use tls::TlsMaterializer;
