//! Sandbox (pause) image selection

use super::state::DockerRegistryRelation;

/// Registry used when deployed alongside Charmed Kubernetes
pub const CANONICAL_REGISTRY: &str = "rocks.canonical.com:443/cdk";

/// Registry used otherwise
pub const UPSTREAM_REGISTRY: &str = "k8s.gcr.io";

/// Pause image name and tag
pub const PAUSE_IMAGE: &str = "pause:3.6";

const KUBERNETES_APPLICATIONS: &[&str] = &[
    "kubernetes-control-plane",
    "kubernetes-master",
    "kubernetes-worker",
];

/// Pick the sandbox image.
///
/// Precedence: the principal's explicit choice, a related docker registry,
/// the Canonical registry when related to Kubernetes, then upstream.
pub fn sandbox_image(
    principal: Option<&str>,
    docker_registry: Option<&DockerRegistryRelation>,
    related_applications: &[String],
) -> String {
    if let Some(image) = principal.filter(|i| !i.is_empty()) {
        return image.to_string();
    }
    let registry = match docker_registry {
        Some(registry) => registry.netloc.as_str(),
        None if related_applications
            .iter()
            .any(|app| KUBERNETES_APPLICATIONS.contains(&app.as_str())) =>
        {
            CANONICAL_REGISTRY
        }
        None => UPSTREAM_REGISTRY,
    };
    format!("{}/{}", registry, PAUSE_IMAGE)
}
