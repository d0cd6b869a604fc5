//! Master and agent pool profile defaults
//!
//! Addressing, per-node IP counts, distro, storage and placement. Every rule
//! fills a blank field only, so a running cluster's addressing and OS image
//! never move on upgrade or scale.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use tracing::{debug, warn};

use crate::components::kubelet::default_max_pods;
use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{
    is_n_series_sku, AvailabilityProfile, ClusterSpecification, ComponentConfig, Distro,
    KubernetesConfig, OrchestratorType, StorageProfile,
};

/// Master subnet when masters do not share the pod range
pub const DEFAULT_MASTER_SUBNET: &str = "10.240.0.0/16";

/// Agent subnet when masters run on a scale set
pub const DEFAULT_SCALE_SET_AGENT_SUBNET: &str = "10.248.0.0/13";

/// First master IP when the master subnet cannot be parsed
pub const DEFAULT_FIRST_CONSECUTIVE_STATIC_IP: &str = "10.240.255.5";

/// Smallest OS disk that fits the pre-baked node image
pub const MIN_PREBAKED_OS_DISK_GB: u32 = 30;

/// Scale sets larger than this span several placement groups
pub const MAX_SINGLE_PLACEMENT_GROUP_COUNT: u32 = 100;

/// First master address inside `subnet`
///
/// Scale-set masters take the fifth address of the subnet. Availability-set
/// masters take `.5` in the subnet's last /24, away from dynamically
/// allocated node addresses.
fn first_static_ip(subnet: &str, scale_set: bool) -> String {
    let Ok(net) = subnet.parse::<Ipv4Net>() else {
        return DEFAULT_FIRST_CONSECUTIVE_STATIC_IP.to_string();
    };
    if scale_set {
        let first = u32::from(net.network()).saturating_add(4);
        return Ipv4Addr::from(first).to_string();
    }
    let [a, b, c, _] = net.broadcast().octets();
    Ipv4Addr::new(a, b, c, 5).to_string()
}

/// Pods per node for IP allocation
fn max_pods(k8s: &KubernetesConfig, own: Option<&ComponentConfig>, explicit: Option<u32>) -> u32 {
    explicit
        .or_else(|| own.and_then(|c| c.get("--max-pods")).and_then(|v| v.parse().ok()))
        .or_else(|| k8s.kubelet_config.get("--max-pods").and_then(|v| v.parse().ok()))
        .unwrap_or_else(|| default_max_pods(k8s))
}

/// One address for the node, plus one per pod under the cloud CNI plugin
fn ip_address_count(k8s: &KubernetesConfig, max_pods: u32) -> u32 {
    if k8s.is_azure_cni() {
        1 + max_pods
    } else {
        1
    }
}

fn default_storage(orchestrator: OrchestratorType) -> StorageProfile {
    if orchestrator.is_kubernetes() {
        StorageProfile::ManagedDisks
    } else {
        StorageProfile::StorageAccount
    }
}

fn default_distro(os_disk_size_gb: u32, gpu: bool) -> Distro {
    if os_disk_size_gb > 0 && os_disk_size_gb < MIN_PREBAKED_OS_DISK_GB {
        Distro::Ubuntu
    } else if gpu {
        Distro::AksGpu
    } else {
        Distro::Aks
    }
}

/// Downgrade a scale set below the version floor
fn placement(
    requested: AvailabilityProfile,
    orchestrator: OrchestratorType,
    version: &str,
    ctx: &ResolutionContext,
    profile: &str,
) -> AvailabilityProfile {
    if requested == AvailabilityProfile::VirtualMachineScaleSets
        && orchestrator.is_kubernetes()
        && !is_version_gte(version, &ctx.gates.scale_set_floor)
    {
        warn!(
            profile = %profile,
            version = %version,
            floor = %ctx.gates.scale_set_floor,
            "Scale sets unsupported at this version, using availability set"
        );
        return AvailabilityProfile::AvailabilitySet;
    }
    requested
}

/// Fill the master profile's blanks
pub fn resolve_master(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let orchestrator = spec.orchestrator_profile.orchestrator_type;
    let version = spec.orchestrator_profile.orchestrator_version.as_str();
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    let Some(master) = spec.master_profile.as_mut() else {
        return;
    };

    let requested = master
        .availability_profile
        .unwrap_or(AvailabilityProfile::AvailabilitySet);
    master.availability_profile = Some(placement(requested, orchestrator, version, ctx, "master"));
    let scale_set = master.is_virtual_machine_scale_sets();

    if orchestrator.is_kubernetes() && !master.is_custom_vnet() {
        if master.subnet.is_empty() {
            master.subnet = if k8s.is_azure_cni() && !scale_set {
                k8s.cluster_subnet.clone()
            } else {
                DEFAULT_MASTER_SUBNET.to_string()
            };
        }
        if scale_set && master.agent_subnet.is_empty() {
            master.agent_subnet = DEFAULT_SCALE_SET_AGENT_SUBNET.to_string();
        }
        if master.first_consecutive_static_ip.is_empty() {
            master.first_consecutive_static_ip = first_static_ip(&master.subnet, scale_set);
        }
    }

    if master.ip_address_count == 0 {
        let pods = max_pods(k8s, master.kubelet_config.as_ref(), None);
        master.ip_address_count = ip_address_count(k8s, pods);
    }
    if master.storage_profile.is_none() {
        master.storage_profile = Some(default_storage(orchestrator));
    }
    if orchestrator.is_kubernetes() && master.distro.is_none() {
        master.distro = Some(default_distro(master.os_disk_size_gb, false));
    }

    debug!(
        subnet = %master.subnet,
        first_ip = %master.first_consecutive_static_ip,
        ip_address_count = master.ip_address_count,
        "Resolved master profile"
    );
}

/// Fill every agent pool's blanks
///
/// On create, GPU pools on the plain pre-baked image move to the GPU image.
/// On upgrade or scale a distro that is already set is kept.
pub fn resolve_agent_pools(
    spec: &mut ClusterSpecification,
    ctx: &ResolutionContext,
    is_update_or_scale: bool,
) {
    let orchestrator = spec.orchestrator_profile.orchestrator_type;
    let version = spec.orchestrator_profile.orchestrator_version.as_str();
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    let master_subnet = spec
        .master_profile
        .as_ref()
        .filter(|m| !m.is_custom_vnet())
        .map(|m| {
            if m.is_virtual_machine_scale_sets() {
                m.agent_subnet.clone()
            } else {
                m.subnet.clone()
            }
        });

    for pool in &mut spec.agent_pool_profiles {
        let requested = pool
            .availability_profile
            .unwrap_or(AvailabilityProfile::VirtualMachineScaleSets);
        pool.availability_profile =
            Some(placement(requested, orchestrator, version, ctx, &pool.name));

        if pool.is_virtual_machine_scale_sets() {
            if pool.single_placement_group.is_none() {
                pool.single_placement_group = Some(true);
            }
            if pool.count > MAX_SINGLE_PLACEMENT_GROUP_COUNT {
                pool.single_placement_group = Some(false);
            }
        }

        if pool.storage_profile.is_none() {
            pool.storage_profile = Some(default_storage(orchestrator));
        }

        if orchestrator.is_kubernetes() && !pool.is_windows() {
            let gpu = is_n_series_sku(&pool.vm_size);
            pool.distro = match pool.distro {
                None => Some(default_distro(pool.os_disk_size_gb, gpu)),
                Some(Distro::Aks) if gpu && !is_update_or_scale => Some(Distro::AksGpu),
                keep => keep,
            };
        }

        if pool.subnet.is_empty() {
            if let Some(subnet) = master_subnet.as_ref() {
                pool.subnet.clone_from(subnet);
            }
        }

        if orchestrator.is_kubernetes() && pool.ip_address_count == 0 {
            let pods = max_pods(k8s, pool.kubelet_config.as_ref(), pool.max_pods);
            pool.ip_address_count = ip_address_count(k8s, pods);
        }
    }
}
