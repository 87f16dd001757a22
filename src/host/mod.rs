//! Host interaction
//!
//! Everything that shells out: service control, hardware probing and
//! version queries. Each command runs with a bounded timeout.

pub mod command;
pub mod gpu;
pub mod service;
pub mod version;

pub use gpu::{has_nvidia_device, probe_nvidia};
pub use service::{ServiceControl, Systemctl, CONTAINERD_SERVICE};
pub use version::{containerd_version, parse_ctr_version};
