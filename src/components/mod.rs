//! Per-component flag maps
//!
//! Every managed component resolves its flag map the same way. Computed
//! defaults fill keys the user left out, user values win over defaults, and
//! static keys the system must own overwrite both. [`merge_layers`] is that
//! rule; each submodule only builds its default and static maps.

pub mod apiserver;
pub mod controller_manager;
pub mod feature_gates;
pub mod kubelet;
pub mod pod_security_policy;
pub mod scheduler;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ResolutionContext;
use crate::model::{ClusterSpecification, ComponentConfig, KubernetesConfig};

/// Flag key shared by every component that accepts feature gates
pub const FEATURE_GATES: &str = "--feature-gates";

/// A control plane or node component with a managed flag map
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    /// Node agent
    Kubelet,
    /// kube-controller-manager
    ControllerManager,
    /// Out-of-tree cloud controller manager
    CloudControllerManager,
    /// kube-apiserver
    #[serde(rename = "apiserver")]
    ApiServer,
    /// kube-scheduler
    Scheduler,
    /// Pod security policy settings
    PodSecurityPolicy,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubelet => write!(f, "kubelet"),
            Self::ControllerManager => write!(f, "controller-manager"),
            Self::CloudControllerManager => write!(f, "cloud-controller-manager"),
            Self::ApiServer => write!(f, "apiserver"),
            Self::Scheduler => write!(f, "scheduler"),
            Self::PodSecurityPolicy => write!(f, "pod-security-policy"),
        }
    }
}

/// Insert each default key the user map lacks
///
/// An empty user map adopts the defaults wholesale.
pub fn fill_missing(config: &mut ComponentConfig, defaults: &ComponentConfig) {
    if config.is_empty() {
        config.clone_from(defaults);
        return;
    }
    for (key, value) in defaults {
        config
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Overwrite every static key regardless of the user's value
pub fn apply_static(config: &mut ComponentConfig, statics: &ComponentConfig) {
    for (key, value) in statics {
        config.insert(key.clone(), value.clone());
    }
}

/// Three-tier merge: computed default < user value < static key
pub fn merge_layers(
    config: &mut ComponentConfig,
    defaults: &ComponentConfig,
    statics: &ComponentConfig,
) {
    fill_missing(config, defaults);
    apply_static(config, statics);
}

/// Build a flag map from literal pairs
pub(crate) fn flags<const N: usize>(pairs: [(&str, String); N]) -> ComponentConfig {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// `--cloud-provider` and `--cloud-config` unless an out-of-tree cloud
/// controller manager owns cloud integration
pub(crate) fn cloud_provider_flags(k8s: &KubernetesConfig) -> ComponentConfig {
    if KubernetesConfig::is_true(k8s.use_cloud_controller_manager) {
        return ComponentConfig::new();
    }
    flags([
        ("--cloud-provider", "azure".to_string()),
        ("--cloud-config", crate::CLOUD_CONFIG_PATH.to_string()),
    ])
}

pub(crate) fn cert_path(file: &str) -> String {
    format!("{}/{}", crate::CERTS_DIR, file)
}

/// Resolve every component flag map of a Kubernetes cluster
pub fn resolve_all(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    kubelet::resolve(spec, ctx);
    controller_manager::resolve(spec, ctx);
    if KubernetesConfig::is_true(
        spec.orchestrator_profile
            .kubernetes_config
            .use_cloud_controller_manager,
    ) {
        controller_manager::resolve_cloud(spec, ctx);
    }
    apiserver::resolve(spec, ctx);
    scheduler::resolve(spec, ctx);
    pod_security_policy::resolve(spec, ctx);

    let k8s = &spec.orchestrator_profile.kubernetes_config;
    debug!(
        version = %spec.orchestrator_profile.orchestrator_version,
        kubelet_flags = k8s.kubelet_config.len(),
        apiserver_flags = k8s.apiserver_config.len(),
        controller_manager_flags = k8s.controller_manager_config.len(),
        "Resolved component flag maps"
    );
}
