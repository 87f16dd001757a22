//! containerd-charm - Registry-aware containerd configuration
//!
//! Operates containerd on a Juju unit. Its core renders a complete
//! containerd `config.toml` for either config schema from:
//!
//! - Custom registry credentials (auth, TLS material, mirrors)
//! - A runtime selection, with automatic NVIDIA runtime injection
//! - Relation data from the principal and docker-registry charms
//!
//! Around that core sit atomic persistence, proxy drop-ins and service
//! restarts.

pub mod charm;
pub mod config;
pub mod error;
pub mod host;
pub mod registry;
pub mod render;

pub use error::{CharmError, Result};
