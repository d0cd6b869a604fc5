//! kubelet flags for the cluster, the masters and every agent pool

use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{
    is_n_series_sku, network_policy, ClusterSpecification, ComponentConfig, KubernetesConfig,
    NetworkPlugin, OsType,
};

use super::feature_gates::combine;
use super::{cert_path, flags, merge_layers, Component, FEATURE_GATES};

/// Hard eviction thresholds
pub const DEFAULT_EVICTION_HARD: &str =
    "memory.available<100Mi,nodefs.available<10%,nodefs.inodesFree<5%";

/// Traffic to this range is not masqueraded
pub const DEFAULT_NON_MASQUERADE_CIDR: &str = "10.0.0.0/8";

const SECURE_KUBELET_FLAGS: [&str; 2] = ["--anonymous-auth", "--client-ca-file"];

fn linux_static(k8s: &KubernetesConfig) -> ComponentConfig {
    let mut statics = flags([
        ("--address", "0.0.0.0".to_string()),
        ("--allow-privileged", "true".to_string()),
        ("--anonymous-auth", "false".to_string()),
        ("--authorization-mode", "Webhook".to_string()),
        ("--client-ca-file", cert_path("ca.crt")),
        ("--pod-manifest-path", "/etc/kubernetes/manifests".to_string()),
        ("--cluster-dns", k8s.dns_service_ip.clone()),
        ("--cgroups-per-qos", "true".to_string()),
        ("--enforce-node-allocatable", "pods".to_string()),
        ("--kubeconfig", "/var/lib/kubelet/kubeconfig".to_string()),
        ("--keep-terminated-pod-volumes", "false".to_string()),
    ]);
    if KubernetesConfig::is_true(k8s.use_cloud_controller_manager) {
        statics.insert("--cloud-provider".to_string(), "external".to_string());
    }
    statics
}

fn windows_static(k8s: &KubernetesConfig) -> ComponentConfig {
    let mut statics = linux_static(k8s);
    statics.extend(flags([
        ("--azure-container-registry-config", r"c:\k\azure.json".to_string()),
        ("--pod-infra-container-image", "kubletwin/pause".to_string()),
        ("--kubeconfig", r"c:\k\config".to_string()),
        ("--cloud-config", r"c:\k\azure.json".to_string()),
        ("--cgroups-per-qos", "false".to_string()),
        ("--enforce-node-allocatable", String::new()),
        ("--client-ca-file", r"c:\k\ca.crt".to_string()),
        ("--hairpin-mode", "promiscuous-bridge".to_string()),
        ("--image-pull-progress-deadline", "20m".to_string()),
        ("--resolv-conf", String::new()),
    ]));
    statics
}

fn static_for(os: OsType, k8s: &KubernetesConfig) -> ComponentConfig {
    match os {
        OsType::Linux => linux_static(k8s),
        OsType::Windows => windows_static(k8s),
    }
}

/// Default pods per node for the cluster's network plugin
pub fn default_max_pods(k8s: &KubernetesConfig) -> u32 {
    if k8s.is_azure_cni() {
        crate::DEFAULT_AZURE_CNI_MAX_PODS
    } else {
        crate::DEFAULT_KUBERNETES_MAX_PODS
    }
}

fn defaults(k8s: &KubernetesConfig, ctx: &ResolutionContext, version: &str) -> ComponentConfig {
    let images = ctx.images.images_for(version);
    flags([
        ("--cluster-domain", crate::DEFAULT_CLUSTER_DOMAIN.to_string()),
        ("--network-plugin", "cni".to_string()),
        (
            "--pod-infra-container-image",
            format!("{}{}", k8s.kubernetes_image_base, images.pause),
        ),
        ("--max-pods", default_max_pods(k8s).to_string()),
        ("--eviction-hard", DEFAULT_EVICTION_HARD.to_string()),
        (
            "--node-status-update-frequency",
            images.node_status_update_frequency,
        ),
        ("--image-gc-high-threshold", k8s.gc_high_threshold.to_string()),
        ("--image-gc-low-threshold", k8s.gc_low_threshold.to_string()),
        ("--non-masquerade-cidr", DEFAULT_NON_MASQUERADE_CIDR.to_string()),
        ("--cloud-provider", "azure".to_string()),
        ("--cloud-config", crate::CLOUD_CONFIG_PATH.to_string()),
        (
            "--azure-container-registry-config",
            crate::CLOUD_CONFIG_PATH.to_string(),
        ),
        ("--event-qps", "0".to_string()),
        ("--cadvisor-port", "0".to_string()),
        ("--pod-max-pids", "100".to_string()),
        ("--image-pull-progress-deadline", "30m".to_string()),
    ])
}

/// Resolve the cluster kubelet map, then the master and pool maps
///
/// Master and pool maps inherit every key they lack from the resolved
/// cluster map. A pool without its own map starts from its OS's static flags.
pub fn resolve(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let version = spec.orchestrator_profile.orchestrator_version.clone();
    let device_plugin_enabled = spec.is_nvidia_device_plugin_enabled();
    let k8s = &mut spec.orchestrator_profile.kubernetes_config;

    let statics = linux_static(k8s);
    let defaults = defaults(k8s, ctx, &version);
    let mut cluster = std::mem::take(&mut k8s.kubelet_config);
    merge_layers(&mut cluster, &defaults, &ComponentConfig::new());

    let gates = cluster.get(FEATURE_GATES).map_or("", String::as_str);
    let gates = combine(gates, "", "", &version);
    cluster.insert(FEATURE_GATES.to_string(), gates);

    if k8s.plugin() == Some(NetworkPlugin::Kubenet) && k8s.network_policy != network_policy::CALICO
    {
        cluster.insert(
            "--network-plugin".to_string(),
            NetworkPlugin::Kubenet.as_str().to_string(),
        );
    }

    merge_layers(&mut cluster, &ComponentConfig::new(), &statics);
    if !KubernetesConfig::is_true(k8s.enable_secure_kubelet) {
        for key in SECURE_KUBELET_FLAGS {
            cluster.remove(key);
        }
    }
    ctx.remove_unsupported_flags(Component::Kubelet, &mut cluster, &version);

    if let Some(master) = spec.master_profile.as_mut() {
        let master_config = master
            .kubelet_config
            .get_or_insert_with(|| static_for(OsType::Linux, k8s));
        inherit(master_config, &cluster);
        ctx.remove_unsupported_flags(Component::Kubelet, master_config, &version);
    }

    for pool in &mut spec.agent_pool_profiles {
        let os_type = pool.os_type;
        let pool_config = pool
            .kubelet_config
            .get_or_insert_with(|| static_for(os_type, k8s));
        if let Some(max_pods) = pool.max_pods {
            pool_config
                .entry("--max-pods".to_string())
                .or_insert_with(|| max_pods.to_string());
        }
        inherit(pool_config, &cluster);

        if is_n_series_sku(&pool.vm_size)
            && !device_plugin_enabled
            && !is_version_gte(&version, &ctx.gates.native_device_plugins)
        {
            let existing = pool_config.get(FEATURE_GATES).map_or("", String::as_str);
            let gates = combine(
                existing,
                "Accelerators=true",
                &ctx.gates.accelerators_gate,
                &version,
            );
            pool_config.insert(FEATURE_GATES.to_string(), gates);
        }
        ctx.remove_unsupported_flags(Component::Kubelet, pool_config, &version);
    }

    k8s.kubelet_config = cluster;
}

fn inherit(config: &mut ComponentConfig, cluster: &ComponentConfig) {
    for (key, value) in cluster {
        config
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
