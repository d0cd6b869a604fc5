//! kube-scheduler flags

use crate::context::ResolutionContext;
use crate::model::ClusterSpecification;

use super::{flags, merge_layers, Component};

/// Resolve the kube-scheduler flag map
pub fn resolve(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let statics = flags([
        ("--kubeconfig", "/var/lib/kubelet/kubeconfig".to_string()),
        ("--leader-elect", "true".to_string()),
        ("--profiling", "false".to_string()),
    ]);
    let defaults = flags([("--v", "2".to_string())]);

    let version = &spec.orchestrator_profile.orchestrator_version;
    let config = &mut spec.orchestrator_profile.kubernetes_config.scheduler_config;
    merge_layers(config, &defaults, &statics);
    ctx.remove_unsupported_flags(Component::Scheduler, config, version);
}
