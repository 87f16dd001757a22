//! Reconciliation
//!
//! One pass takes the charm options and the unit state to a persisted
//! `config.toml`, TLS files, proxy drop-in and a running containerd. The
//! document is fully rendered before anything on disk is touched, and the
//! service is only restarted once everything is persisted.

use super::persist::{remove_if_exists, unchanged, write_atomic};
use super::proxy::{ProxySettings, PROXY_DROP_IN};
use super::sandbox::sandbox_image;
use super::state::UnitState;
use crate::config::CharmConfig;
use crate::error::Result;
use crate::host::{ServiceControl, CONTAINERD_SERVICE};
use crate::registry::{RegistrySet, TlsMaterializer};
use crate::render::renderer::{CONFIG_DIRECTORY, CONFIG_FILE};
use crate::render::{
    ConfigRenderer, RenderInput, RenderSettings, RenderedConfig, RuntimeSelection,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a reconciliation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// `config.toml` was (re)written
    pub config_written: bool,
    /// The proxy drop-in was written or removed
    pub proxy_changed: bool,
    /// containerd was restarted
    pub restarted: bool,
    /// Materialized TLS files
    pub tls_files: Vec<PathBuf>,
    /// SHA-256 of the rendered document
    pub digest: String,
}

/// Drives containerd towards the configured state
pub struct Reconciler<S> {
    service: S,
    config_dir: PathBuf,
    proxy_drop_in: PathBuf,
    juju_proxy: ProxySettings,
}

impl<S: ServiceControl> Reconciler<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            config_dir: PathBuf::from(CONFIG_DIRECTORY),
            proxy_drop_in: PathBuf::from(PROXY_DROP_IN),
            juju_proxy: ProxySettings::default(),
        }
    }

    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn with_proxy_drop_in(mut self, path: impl Into<PathBuf>) -> Self {
        self.proxy_drop_in = path.into();
        self
    }

    /// Proxy settings of the Juju model
    pub fn with_juju_proxy(mut self, proxy: ProxySettings) -> Self {
        self.juju_proxy = proxy;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Resolve options and relation data into a render input.
    ///
    /// The default `docker.io` mirror is placed first and the related
    /// docker registry last, after the configured registries.
    pub fn build_input(&self, config: &CharmConfig, state: &UnitState) -> Result<RenderInput> {
        config.validate()?;

        let mut registries = config.registries()?.with_default_mirror();
        if let Some(relation) = &state.docker_registry {
            registries = registries.merge(relation.credential());
        }

        let gpu_enabled = config
            .gpu_driver()?
            .resolve(state.gpu_present.unwrap_or(false));
        let runtime = RuntimeSelection::resolve(
            &config.runtime,
            &config.shim,
            gpu_enabled,
            state.untrusted.clone(),
        );

        let settings = RenderSettings {
            sandbox_image: sandbox_image(
                state.principal.sandbox_image.as_deref(),
                state.docker_registry.as_ref(),
                &state.related_applications,
            ),
            config_dir: self.config_dir.clone(),
            ..RenderSettings::default()
        };

        Ok(RenderInput {
            schema: config.schema_version()?,
            registries,
            runtime,
            settings,
        })
    }

    /// Render without touching the host
    pub fn render(&self, config: &CharmConfig, state: &UnitState) -> Result<RenderedConfig> {
        ConfigRenderer::render(&self.build_input(config, state)?)
    }

    /// Run one reconciliation pass.
    ///
    /// `state.applied` is updated as each step is persisted, so a failed
    /// restart is retried on the next pass.
    pub async fn reconcile(&self, config: &CharmConfig, state: &mut UnitState) -> Result<Outcome> {
        let input = self.build_input(config, state)?;
        let rendered = ConfigRenderer::render(&input)?;
        let digest = rendered.digest();
        let mut outcome = Outcome {
            digest: digest.clone(),
            ..Outcome::default()
        };

        let previous = previous_registries(state);
        outcome.tls_files =
            TlsMaterializer::new(&self.config_dir).apply(&input.registries, previous.as_ref())?;
        state.applied.custom_registries = Some(config.custom_registries.clone());

        let config_path = self.config_path();
        if unchanged(&config_path, &digest)? {
            debug!("{} is up to date", config_path.display());
        } else {
            write_atomic(&config_path, rendered.as_str().as_bytes())?;
            info!(
                "Wrote {} config to {}",
                rendered.schema(),
                config_path.display()
            );
            outcome.config_written = true;
            state.applied.restart_pending = true;
        }
        state.applied.config_digest = Some(digest);

        let proxy = ProxySettings::resolve(config, &self.juju_proxy, &state.principal.proxy);
        if state.applied.proxy.clone().unwrap_or_default() != proxy {
            self.apply_proxy(&proxy).await?;
            state.applied.proxy = Some(proxy);
            state.applied.restart_pending = true;
            outcome.proxy_changed = true;
        }

        if state.applied.restart_pending {
            self.service.restart(CONTAINERD_SERVICE).await?;
            state.applied.restart_pending = false;
            outcome.restarted = true;
        }
        Ok(outcome)
    }

    async fn apply_proxy(&self, proxy: &ProxySettings) -> Result<()> {
        match proxy.render_drop_in() {
            Some(text) => {
                write_atomic(&self.proxy_drop_in, text.as_bytes())?;
                info!("Wrote proxy drop-in {}", self.proxy_drop_in.display());
            }
            None => {
                if remove_if_exists(&self.proxy_drop_in)? {
                    info!("Removed proxy drop-in {}", self.proxy_drop_in.display());
                }
            }
        }
        self.service.daemon_reload().await
    }
}

fn previous_registries(state: &UnitState) -> Option<RegistrySet> {
    let json = state.applied.custom_registries.as_deref()?;
    match RegistrySet::parse(json) {
        Ok(set) => Some(set),
        Err(e) => {
            warn!("Ignoring previously applied custom_registries: {}", e);
            None
        }
    }
}
