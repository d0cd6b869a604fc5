//! kube-controller-manager and cloud-controller-manager flags

use crate::context::ResolutionContext;
use crate::model::{load_balancer_sku, ClusterSpecification, ComponentConfig, KubernetesConfig};

use super::feature_gates::combine;
use super::{cert_path, cloud_provider_flags, flags, merge_layers, Component, FEATURE_GATES};

const KUBECONFIG: &str = "/var/lib/kubelet/kubeconfig";

/// Flags both controller managers derive from the network layout
fn network_statics(spec: &ClusterSpecification) -> ComponentConfig {
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    flags([
        ("--kubeconfig", KUBECONFIG.to_string()),
        ("--allocate-node-cidrs", (!k8s.is_azure_cni()).to_string()),
        (
            "--configure-cloud-routes",
            k8s.require_route_table().to_string(),
        ),
        ("--cluster-cidr", k8s.cluster_subnet.clone()),
        ("--leader-elect", "true".to_string()),
        ("--v", "2".to_string()),
        ("--cluster-name", spec.dns_prefix().unwrap_or_default().to_string()),
    ])
}

/// Resolve the kube-controller-manager flag map
pub fn resolve(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let version = spec.orchestrator_profile.orchestrator_version.clone();
    let mut statics = network_statics(spec);
    let k8s = &mut spec.orchestrator_profile.kubernetes_config;

    statics.extend(flags([
        ("--root-ca-file", cert_path("ca.crt")),
        ("--cluster-signing-cert-file", cert_path("ca.crt")),
        ("--cluster-signing-key-file", cert_path("ca.key")),
        (
            "--service-account-private-key-file",
            cert_path("apiserver.key"),
        ),
        ("--profiling", "false".to_string()),
    ]));
    statics.extend(cloud_provider_flags(k8s));

    let defaults = flags([
        ("--node-monitor-grace-period", "40s".to_string()),
        ("--pod-eviction-timeout", "5m0s".to_string()),
        ("--route-reconciliation-period", "10s".to_string()),
        ("--terminated-pod-gc-threshold", "5000".to_string()),
        ("--use-service-account-credentials", "false".to_string()),
    ]);

    merge_layers(&mut k8s.controller_manager_config, &defaults, &statics);

    if k8s.load_balancer_sku == load_balancer_sku::STANDARD {
        let existing = k8s
            .controller_manager_config
            .get(FEATURE_GATES)
            .map_or("", String::as_str);
        let gates = combine(
            existing,
            "ServiceNodeExclusion=true",
            &ctx.gates.service_node_exclusion,
            &version,
        );
        k8s.controller_manager_config
            .insert(FEATURE_GATES.to_string(), gates);
    }

    ctx.remove_unsupported_flags(
        Component::ControllerManager,
        &mut k8s.controller_manager_config,
        &version,
    );
}

/// Resolve the cloud-controller-manager flag map
pub fn resolve_cloud(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let version = spec.orchestrator_profile.orchestrator_version.clone();
    let mut statics = network_statics(spec);
    statics.extend(flags([
        ("--cloud-provider", "azure".to_string()),
        ("--cloud-config", crate::CLOUD_CONFIG_PATH.to_string()),
    ]));
    let defaults = flags([("--route-reconciliation-period", "10s".to_string())]);

    let k8s: &mut KubernetesConfig = &mut spec.orchestrator_profile.kubernetes_config;
    merge_layers(&mut k8s.cloud_controller_manager_config, &defaults, &statics);
    ctx.remove_unsupported_flags(
        Component::CloudControllerManager,
        &mut k8s.cloud_controller_manager_config,
        &version,
    );
}
