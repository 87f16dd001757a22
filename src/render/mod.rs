//! Registry-aware containerd config rendering
//!
//! Turns a resolved registry set, a runtime selection and a handful of
//! scalar settings into a complete `config.toml` for either containerd
//! config schema. Rendering is pure: no filesystem, network or process I/O
//! happens here.

pub mod password;
pub mod renderer;
pub mod runtime;
pub mod schema;

pub use password::Password;
pub use renderer::{
    digest_hex, render_config, ConfigRenderer, RenderInput, RenderSettings, RenderedConfig,
};
pub use runtime::{GpuDriver, GpuRuntime, RuntimeSelection, UntrustedRuntime};
pub use schema::{SchemaVersion, Section, TablePaths};
