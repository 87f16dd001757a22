//! containerd `config.toml` rendering

use super::runtime::{RuntimeEntry, RuntimeSelection, LEGACY_LINUX_TYPE};
use super::schema::{SchemaVersion, Section, TablePaths};
use crate::error::{CharmError, Result};
use crate::registry::credential::{RegistryCredential, TlsKind};
use crate::registry::set::RegistrySet;
use crate::registry::tls::tls_source_path;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use toml_edit::{value, Array, DocumentMut, Item, Table};
use tracing::debug;

/// Default sandbox (pause) image
pub const DEFAULT_SANDBOX_IMAGE: &str = "k8s.gcr.io/pause:3.6";

/// containerd configuration directory
pub const CONFIG_DIRECTORY: &str = "/etc/containerd";

/// Name of the rendered file inside [`CONFIG_DIRECTORY`]
pub const CONFIG_FILE: &str = "config.toml";

const CNI_BIN_DIR: &str = "/opt/cni/bin";
const CNI_CONF_DIR: &str = "/etc/cni/net.d";

/// Scalar settings substituted into the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub sandbox_image: String,
    /// Directory holding `config.toml` and materialized TLS files
    pub config_dir: PathBuf,
    pub root: String,
    pub state: String,
    pub grpc_address: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            config_dir: PathBuf::from(CONFIG_DIRECTORY),
            root: "/var/lib/containerd".to_string(),
            state: "/run/containerd".to_string(),
            grpc_address: "/run/containerd/containerd.sock".to_string(),
        }
    }
}

/// Everything one render depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderInput {
    pub schema: SchemaVersion,
    pub registries: RegistrySet,
    pub runtime: RuntimeSelection,
    pub settings: RenderSettings,
}

/// A complete rendered config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    schema: SchemaVersion,
    text: String,
}

impl RenderedConfig {
    pub fn schema(&self) -> SchemaVersion {
        self.schema
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// SHA-256 of the document, hex encoded
    pub fn digest(&self) -> String {
        digest_hex(self.text.as_bytes())
    }
}

impl std::fmt::Display for RenderedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// SHA-256 of arbitrary bytes, hex encoded
pub fn digest_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Parse, resolve and render in one call.
///
/// `schema` is the `config_version` option and `gpu_enabled` the already
/// resolved GPU decision.
pub fn render_config(
    registries_json: &str,
    schema: &str,
    gpu_enabled: bool,
    runtime: &str,
    shim: &str,
    settings: RenderSettings,
) -> Result<RenderedConfig> {
    let input = RenderInput {
        schema: schema.parse()?,
        registries: RegistrySet::parse(registries_json)?,
        runtime: RuntimeSelection::resolve(runtime, shim, gpu_enabled, None),
        settings,
    };
    ConfigRenderer::render(&input)
}

/// Renders `config.toml` for either schema version
pub struct ConfigRenderer;

impl ConfigRenderer {
    /// Render the full document. Either the whole document is returned or
    /// an error; there is no partial output.
    pub fn render(input: &RenderInput) -> Result<RenderedConfig> {
        let paths = input.schema.paths();
        input.runtime.validate(input.schema)?;
        debug!(
            "Rendering {} config with {} registries, default runtime {}",
            input.schema,
            input.registries.len(),
            input.runtime.default_runtime
        );

        let mut doc = DocumentMut::new();
        if let Some((key, version)) = paths.header() {
            doc.insert(key, value(version));
        }
        write_globals(&mut doc, &input.settings)?;

        table(&mut doc, paths.table(Section::Cgroups))?.insert("no_prometheus", value(false));
        write_cri(&mut doc, paths, input)?;
        write_plugins_tail(&mut doc, paths, &input.runtime)?;

        let text = doc.to_string();
        toml::from_str::<toml::Table>(&text)
            .map_err(|e| CharmError::Render(format!("rendered config is not valid TOML: {}", e)))?;

        Ok(RenderedConfig {
            schema: input.schema,
            text,
        })
    }
}

/// Explicit table at `path`, creating parents as implicit tables
fn table<'a, S: AsRef<str>>(doc: &'a mut DocumentMut, path: &[S]) -> Result<&'a mut Table> {
    let mut current = doc.as_table_mut();
    for segment in path {
        let segment = segment.as_ref();
        current = current
            .entry(segment)
            .or_insert_with(|| {
                let mut table = Table::new();
                table.set_implicit(true);
                Item::Table(table)
            })
            .as_table_mut()
            .ok_or_else(|| CharmError::Render(format!("{} is not a table", segment)))?;
    }
    current.set_implicit(false);
    Ok(current)
}

fn write_globals(doc: &mut DocumentMut, settings: &RenderSettings) -> Result<()> {
    doc.insert("root", value(settings.root.as_str()));
    doc.insert("state", value(settings.state.as_str()));
    doc.insert("oom_score", value(0i64));

    let grpc = table(doc, &["grpc"])?;
    grpc.insert("address", value(settings.grpc_address.as_str()));
    grpc.insert("uid", value(0i64));
    grpc.insert("gid", value(0i64));
    grpc.insert("max_recv_message_size", value(16777216i64));
    grpc.insert("max_send_message_size", value(16777216i64));

    let debug = table(doc, &["debug"])?;
    debug.insert("address", value(""));
    debug.insert("uid", value(0i64));
    debug.insert("gid", value(0i64));
    debug.insert("level", value(""));

    let metrics = table(doc, &["metrics"])?;
    metrics.insert("address", value(""));
    metrics.insert("grpc_histogram", value(false));

    table(doc, &["cgroup"])?.insert("path", value(""));
    Ok(())
}

fn write_cri(doc: &mut DocumentMut, paths: &dyn TablePaths, input: &RenderInput) -> Result<()> {
    let cri = table(doc, paths.table(Section::CriRoot))?;
    cri.insert("stream_server_address", value("127.0.0.1"));
    cri.insert("stream_server_port", value("0"));
    cri.insert("enable_selinux", value(false));
    cri.insert("sandbox_image", value(input.settings.sandbox_image.as_str()));
    cri.insert("stats_collect_period", value(10i64));
    cri.insert("systemd_cgroup", value(false));
    cri.insert("enable_tls_streaming", value(false));
    cri.insert("max_container_log_line_size", value(16384i64));

    write_runtimes(doc, paths, &input.runtime)?;

    let cni = table(doc, paths.table(Section::CriCni))?;
    cni.insert("bin_dir", value(CNI_BIN_DIR));
    cni.insert("conf_dir", value(CNI_CONF_DIR));
    cni.insert("conf_template", value(""));

    table(doc, paths.table(Section::CriRegistry))?;
    table(doc, paths.table(Section::CriRegistryMirrors))?;
    for registry in input.registries.iter() {
        let endpoint = Array::from_iter([registry.url.as_str()]);
        table(doc, &paths.mirror_table(&registry.host))?.insert("endpoint", value(endpoint));
    }
    for registry in input.registries.iter() {
        write_credentials(doc, paths, registry, &input.settings)?;
    }
    Ok(())
}

fn write_runtimes(
    doc: &mut DocumentMut,
    paths: &dyn TablePaths,
    runtime: &RuntimeSelection,
) -> Result<()> {
    let containerd = table(doc, paths.table(Section::CriContainerd))?;
    containerd.insert("snapshotter", value("overlayfs"));
    containerd.insert("no_pivot", value(false));

    if paths.names_default_runtime() {
        containerd.insert("default_runtime_name", value(runtime.default_runtime.as_str()));
    } else {
        let legacy = table(doc, paths.table(Section::DefaultRuntime))?;
        legacy.insert("runtime_type", value(LEGACY_LINUX_TYPE));
        legacy.insert("runtime_engine", value(""));
        legacy.insert("runtime_root", value(""));
        if let Some(untrusted) = &runtime.untrusted {
            let entry = table(doc, paths.table(Section::UntrustedRuntime))?;
            entry.insert("runtime_type", value(LEGACY_LINUX_TYPE));
            entry.insert("runtime_engine", value(untrusted.binary_path.as_str()));
            entry.insert("runtime_root", value(""));
        }
    }

    table(doc, paths.table(Section::CriRuntimes))?;
    for entry in runtime.entries(paths.version()) {
        write_runtime_entry(doc, paths, &entry)?;
    }
    Ok(())
}

fn write_runtime_entry(
    doc: &mut DocumentMut,
    paths: &dyn TablePaths,
    entry: &RuntimeEntry,
) -> Result<()> {
    let mut path = paths.runtime_table(&entry.name);
    let runtime = table(doc, &path)?;
    runtime.insert("runtime_type", value(entry.runtime_type.as_str()));
    if let Some(engine) = &entry.runtime_engine {
        runtime.insert("runtime_engine", value(engine.as_str()));
    }
    if let Some(root) = &entry.runtime_root {
        runtime.insert("runtime_root", value(root.as_str()));
    }
    if let Some(privileged) = entry.privileged_without_host_devices {
        runtime.insert("privileged_without_host_devices", value(privileged));
    }
    if let Some(binary) = &entry.binary_name {
        path.push("options".to_string());
        table(doc, &path)?.insert("BinaryName", value(binary.as_str()));
    }
    Ok(())
}

fn write_credentials(
    doc: &mut DocumentMut,
    paths: &dyn TablePaths,
    registry: &RegistryCredential,
    settings: &RenderSettings,
) -> Result<()> {
    if registry.has_auth() {
        let password = registry
            .password
            .as_ref()
            .map(|password| password.to_toml())
            .transpose()
            .map_err(|e| match e {
                CharmError::Validation(msg) => {
                    CharmError::Validation(format!("registry {}: {}", registry.host, msg))
                }
                other => other,
            })?;
        let auth = table(doc, &paths.auth_table(&registry.host))?;
        if let Some(username) = &registry.username {
            auth.insert("username", value(username.as_str()));
        }
        if let Some(password) = password {
            auth.insert("password", value(password));
        }
    }

    if registry.has_tls() {
        let tls = table(doc, &paths.tls_table(&registry.host))?;
        for kind in TlsKind::ALL {
            if let Some(path) = tls_source_path(&settings.config_dir, registry, kind) {
                tls.insert(kind.field(), value(path.to_string_lossy().into_owned()));
            }
        }
        tls.insert("insecure_skip_verify", value(registry.insecure_skip_verify));
    }
    Ok(())
}

fn write_plugins_tail(
    doc: &mut DocumentMut,
    paths: &dyn TablePaths,
    runtime: &RuntimeSelection,
) -> Result<()> {
    table(doc, paths.table(Section::DiffService))?
        .insert("default", value(Array::from_iter(["walking"])));

    let linux = table(doc, paths.table(Section::LinuxRuntime))?;
    linux.insert("shim", value(runtime.shim.as_str()));
    linux.insert("runtime", value(runtime.legacy_runtime()));
    linux.insert("runtime_root", value(""));
    linux.insert("no_shim", value(false));
    linux.insert("shim_debug", value(false));

    table(doc, paths.table(Section::Opt))?.insert("path", value("/opt/containerd"));
    table(doc, paths.table(Section::Restart))?.insert("interval", value("10s"));

    let scheduler = table(doc, paths.table(Section::Scheduler))?;
    scheduler.insert("pause_threshold", value(0.02));
    scheduler.insert("deletion_threshold", value(0i64));
    scheduler.insert("mutation_threshold", value(100i64));
    scheduler.insert("schedule_delay", value("0s"));
    scheduler.insert("startup_delay", value("100ms"));
    Ok(())
}
