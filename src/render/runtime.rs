//! Runtime selection and GPU runtime injection

use super::schema::SchemaVersion;
use crate::error::{CharmError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Always-present fallback runtime
pub const RUNC: &str = "runc";

/// Shim v2 runtime type used by runc-compatible runtimes
pub const RUNC_V2_TYPE: &str = "io.containerd.runc.v2";

/// Runtime type of the legacy v1 linux shim
pub const LEGACY_LINUX_TYPE: &str = "io.containerd.runtime.v1.linux";

/// Default shim binary
pub const DEFAULT_SHIM: &str = "containerd-shim";

/// GPU driver option
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuDriver {
    /// Enable when NVIDIA hardware is present
    #[default]
    Auto,
    /// Always enable
    Nvidia,
    /// Never enable
    None,
}

impl GpuDriver {
    /// Resolve to a concrete on/off decision given the hardware probe result
    pub fn resolve(self, hardware_present: bool) -> bool {
        match self {
            GpuDriver::Auto => hardware_present,
            GpuDriver::Nvidia => true,
            GpuDriver::None => false,
        }
    }
}

impl std::fmt::Display for GpuDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuDriver::Auto => write!(f, "auto"),
            GpuDriver::Nvidia => write!(f, "nvidia"),
            GpuDriver::None => write!(f, "none"),
        }
    }
}

impl FromStr for GpuDriver {
    type Err = CharmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(GpuDriver::Auto),
            "nvidia" => Ok(GpuDriver::Nvidia),
            "none" => Ok(GpuDriver::None),
            other => Err(CharmError::Validation(format!(
                "{} is an invalid option for gpu_driver",
                other
            ))),
        }
    }
}

/// GPU container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuRuntime {
    /// Runtime table name
    pub name: String,
    /// Path of the runtime binary
    pub binary_path: String,
}

impl Default for GpuRuntime {
    fn default() -> Self {
        Self {
            name: "nvidia-container-runtime".to_string(),
            binary_path: "/usr/bin/nvidia-container-runtime".to_string(),
        }
    }
}

impl GpuRuntime {
    /// File name of the runtime binary
    pub fn binary_name(&self) -> &str {
        self.binary_path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Sandboxed runtime offered by a related charm (e.g. kata)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedRuntime {
    /// Runtime name
    pub name: String,
    /// Path of the runtime binary
    pub binary_path: String,
}

impl UntrustedRuntime {
    /// Shim v2 runtime type
    pub fn runtime_type(&self) -> String {
        format!("io.containerd.{}.v2", self.name)
    }
}

/// One entry of the CRI runtimes table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEntry {
    pub name: String,
    pub runtime_type: String,
    pub runtime_engine: Option<String>,
    pub runtime_root: Option<String>,
    pub privileged_without_host_devices: Option<bool>,
    /// `options.BinaryName`
    pub binary_name: Option<String>,
}

impl RuntimeEntry {
    fn runc() -> Self {
        Self {
            name: RUNC.to_string(),
            runtime_type: RUNC_V2_TYPE.to_string(),
            runtime_engine: None,
            runtime_root: None,
            privileged_without_host_devices: None,
            binary_name: None,
        }
    }

    fn gpu(gpu: &GpuRuntime) -> Self {
        Self {
            name: gpu.name.clone(),
            runtime_type: RUNC_V2_TYPE.to_string(),
            runtime_engine: Some(String::new()),
            runtime_root: Some(String::new()),
            privileged_without_host_devices: Some(false),
            binary_name: Some(gpu.binary_path.clone()),
        }
    }

    fn untrusted(untrusted: &UntrustedRuntime) -> Self {
        Self {
            name: untrusted.name.clone(),
            runtime_type: untrusted.runtime_type(),
            runtime_engine: Some(untrusted.binary_path.clone()),
            runtime_root: Some(String::new()),
            privileged_without_host_devices: None,
            binary_name: None,
        }
    }
}

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSelection {
    /// Name of the default runtime
    pub default_runtime: String,
    /// Shim binary of the legacy linux runtime plugin
    pub shim: String,
    /// Injected GPU runtime
    pub gpu: Option<GpuRuntime>,
    /// Related untrusted runtime
    pub untrusted: Option<UntrustedRuntime>,
}

impl Default for RuntimeSelection {
    fn default() -> Self {
        Self {
            default_runtime: RUNC.to_string(),
            shim: DEFAULT_SHIM.to_string(),
            gpu: None,
            untrusted: None,
        }
    }
}

impl RuntimeSelection {
    /// Resolve the `runtime` option.
    ///
    /// `gpu_enabled` must already be a concrete decision (see
    /// [`GpuDriver::resolve`]). An enabled GPU always becomes the default
    /// runtime; `auto` otherwise means `runc`. Naming the GPU runtime
    /// explicitly injects it even without GPU mode.
    pub fn resolve(
        runtime: &str,
        shim: &str,
        gpu_enabled: bool,
        untrusted: Option<UntrustedRuntime>,
    ) -> Self {
        let runtime = runtime.trim();
        let shim = shim.trim();
        let mut selection = Self {
            default_runtime: match runtime {
                "" | "auto" => RUNC.to_string(),
                name => name.to_string(),
            },
            shim: if shim.is_empty() {
                DEFAULT_SHIM.to_string()
            } else {
                shim.to_string()
            },
            gpu: None,
            untrusted,
        };

        let gpu = GpuRuntime::default();
        if gpu_enabled || selection.default_runtime == gpu.name {
            selection.inject_gpu(gpu);
        }
        selection
    }

    /// Add a GPU runtime entry and make it the default
    pub fn inject_gpu(&mut self, gpu: GpuRuntime) {
        self.default_runtime = gpu.name.clone();
        self.gpu = Some(gpu);
    }

    /// Whether the GPU runtime is the default
    pub fn gpu_is_default(&self) -> bool {
        self.gpu
            .as_ref()
            .is_some_and(|gpu| gpu.name == self.default_runtime)
    }

    /// Entries of the runtimes table, `runc` first
    pub fn entries(&self, schema: SchemaVersion) -> Vec<RuntimeEntry> {
        let mut entries = vec![RuntimeEntry::runc()];
        if let Some(gpu) = &self.gpu {
            entries.push(RuntimeEntry::gpu(gpu));
        }
        // v1 declares the untrusted runtime in its own section
        if schema == SchemaVersion::V2 {
            if let Some(untrusted) = &self.untrusted {
                if !entries.iter().any(|e| e.name == untrusted.name) {
                    entries.push(RuntimeEntry::untrusted(untrusted));
                }
            }
        }
        entries
    }

    /// Value of the legacy linux plugin's `runtime` field
    pub fn legacy_runtime(&self) -> &str {
        match &self.gpu {
            Some(gpu) if self.gpu_is_default() => gpu.binary_name(),
            _ => &self.default_runtime,
        }
    }

    /// Check the selection can be expressed in the given schema
    pub fn validate(&self, schema: SchemaVersion) -> Result<()> {
        if !schema.paths().names_default_runtime() {
            return Ok(());
        }
        let entries = self.entries(schema);
        if entries.iter().any(|e| e.name == self.default_runtime) {
            Ok(())
        } else {
            let known: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            Err(CharmError::Validation(format!(
                "runtime '{}' is not a configured runtime (expected one of: {})",
                self.default_runtime,
                known.join(", ")
            )))
        }
    }
}
