//! Charm behaviour
//!
//! Unit state, relation-derived settings and the reconciliation pass that
//! ties rendering to the host.

pub mod persist;
pub mod proxy;
pub mod reconcile;
pub mod sandbox;
pub mod state;

pub use proxy::ProxySettings;
pub use reconcile::{Outcome, Reconciler};
pub use sandbox::sandbox_image;
pub use state::{DockerRegistryRelation, PrincipalRelation, RuntimeEndpoint, UnitState};
