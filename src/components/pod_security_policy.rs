//! Pod security policy settings
//!
//! Not a process flag map: the keys configure the policy manifests rendered
//! alongside the admission plugin.

use tracing::debug;

use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{ClusterSpecification, KubernetesConfig};

use super::{flags, merge_layers, Component};

/// Name of the unrestricted policy bound to system components
pub const PRIVILEGED_POLICY: &str = "privileged";

/// Name of the default policy for workloads
pub const RESTRICTED_POLICY: &str = "restricted";

/// Resolve the pod security policy settings
///
/// Releases below the policy floor manage no settings, so the map is cleared.
pub fn resolve(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let version = &spec.orchestrator_profile.orchestrator_version;
    let k8s = &mut spec.orchestrator_profile.kubernetes_config;

    if !is_version_gte(version, &ctx.gates.pod_security_policy) {
        if !k8s.pod_security_policy_config.is_empty() {
            debug!(version = %version, "Clearing pod security policy settings below version floor");
        }
        k8s.pod_security_policy_config.clear();
        return;
    }

    let statics = flags([(
        "enabled",
        KubernetesConfig::is_true(k8s.enable_pod_security_policy).to_string(),
    )]);
    let defaults = flags([
        ("privilegedPolicyName", PRIVILEGED_POLICY.to_string()),
        ("restrictedPolicyName", RESTRICTED_POLICY.to_string()),
    ]);
    merge_layers(&mut k8s.pod_security_policy_config, &defaults, &statics);
    ctx.remove_unsupported_flags(
        Component::PodSecurityPolicy,
        &mut k8s.pod_security_policy_config,
        version,
    );
}
