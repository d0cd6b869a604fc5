//! Orchestrator defaulting entry point
//!
//! [`OrchestratorDefaultsResolver::resolve`] fills every unset orchestrator
//! scalar, then master and pool profiles, then add-ons and component flag
//! maps. It never fails: input shape problems are rejected by validation
//! before a pass runs. Every rule only fills blanks, so a second pass over a
//! resolved specification is a no-op.

mod profiles;

pub use profiles::{resolve_agent_pools, resolve_master, DEFAULT_FIRST_CONSECUTIVE_STATIC_IP};

use base64::Engine;
use tracing::{debug, info};

use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{
    load_balancer_sku, network_policy, ClusterSpecification, KubernetesConfig, NetworkPlugin,
};
use crate::{addons, components, pki, Result};

/// etcd release for new clusters
pub const DEFAULT_ETCD_VERSION: &str = "3.2.24";

/// Pod range under the cloud CNI plugin
pub const DEFAULT_AZURE_CNI_CLUSTER_SUBNET: &str = "10.240.0.0/12";

/// Pod range under kubenet and overlay plugins
pub const DEFAULT_KUBERNETES_CLUSTER_SUBNET: &str = "10.244.0.0/16";

/// Cluster DNS service address
pub const DEFAULT_DNS_SERVICE_IP: &str = "10.0.0.10";

/// Service ClusterIP range
pub const DEFAULT_SERVICE_CIDR: &str = "10.0.0.0/16";

/// Docker bridge address
pub const DEFAULT_DOCKER_BRIDGE_SUBNET: &str = "172.17.0.1/16";

/// Image GC high watermark
pub const DEFAULT_GC_HIGH_THRESHOLD: u32 = 85;

/// Image GC low watermark
pub const DEFAULT_GC_LOW_THRESHOLD: u32 = 80;

/// Random bytes in a generated etcd encryption key
pub const ETCD_ENCRYPTION_KEY_BYTES: usize = 32;

/// etcd data disk size in GB for the cluster's total node count
pub fn etcd_disk_size_gb(total_nodes: u32) -> &'static str {
    match total_nodes {
        n if n > 20 => "2048",
        n if n > 10 => "1024",
        n if n > 3 => "512",
        _ => "256",
    }
}

/// Generate a base64 etcd encryption key from the system CSPRNG
///
/// Returns `None` when the random source is unavailable.
pub fn generate_etcd_encryption_key() -> Option<String> {
    let mut bytes = [0u8; ETCD_ENCRYPTION_KEY_BYTES];
    aws_lc_rs::rand::fill(&mut bytes).ok()?;
    Some(base64::engine::general_purpose::URL_SAFE.encode(bytes))
}

fn fill(field: &mut String, value: &str) {
    if field.is_empty() {
        *field = value.to_string();
    }
}

fn fill_flag(flag: &mut Option<bool>, value: bool) {
    if flag.is_none() {
        *flag = Some(value);
    }
}

/// Expand the legacy policy field into plugin and policy
///
/// Only applies while the plugin is unset.
fn expand_legacy_network_policy(k8s: &mut KubernetesConfig) {
    if !k8s.network_plugin.is_empty() {
        return;
    }
    let (plugin, policy) = match k8s.network_policy.as_str() {
        network_policy::AZURE => (NetworkPlugin::Azure, network_policy::DEFAULT),
        network_policy::NONE => (NetworkPlugin::Kubenet, network_policy::DEFAULT),
        network_policy::CALICO => (NetworkPlugin::Kubenet, network_policy::CALICO),
        network_policy::CILIUM => (NetworkPlugin::Cilium, network_policy::CILIUM),
        _ => return,
    };
    k8s.network_plugin = plugin.as_str().to_string();
    k8s.network_policy = policy.to_string();
}

/// Top-level defaulting for one resolution pass
pub struct OrchestratorDefaultsResolver<'a> {
    ctx: &'a ResolutionContext,
}

impl<'a> OrchestratorDefaultsResolver<'a> {
    /// Create a resolver reading the given lookup tables
    pub fn new(ctx: &'a ResolutionContext) -> Self {
        Self { ctx }
    }

    /// Fill every unset value of the specification in place
    ///
    /// `is_update_or_scale` keeps deprecated versions, user distros and
    /// existing addressing, and moves add-on images forward.
    pub fn resolve(&self, spec: &mut ClusterSpecification, is_update_or_scale: bool) {
        let is_kubernetes = spec.orchestrator_profile.orchestrator_type.is_kubernetes();
        if is_kubernetes {
            self.resolve_orchestrator(spec, is_update_or_scale);
        }

        resolve_master(spec, self.ctx);
        resolve_agent_pools(spec, self.ctx, is_update_or_scale);

        if is_kubernetes {
            let catalog = addons::builtin_catalog(spec, self.ctx);
            let k8s = &mut spec.orchestrator_profile.kubernetes_config;
            let user = std::mem::take(&mut k8s.addons);
            k8s.addons = addons::resolve(user, &catalog, is_update_or_scale);
            components::resolve_all(spec, self.ctx);
        }
    }

    /// Run [`Self::resolve`] and then certificate bootstrap
    ///
    /// Returns true when certificates were (re)generated and the caller
    /// should persist the specification.
    pub fn resolve_with_certificates(
        &self,
        spec: &mut ClusterSpecification,
        is_update_or_scale: bool,
    ) -> Result<bool> {
        self.resolve(spec, is_update_or_scale);
        Ok(pki::set_default_certs(spec, self.ctx)?)
    }

    fn resolve_orchestrator(&self, spec: &mut ClusterSpecification, is_update_or_scale: bool) {
        let has_windows = spec.has_windows();
        let total_nodes = spec.total_nodes();
        let has_zones = spec.has_availability_zones();
        let cloud = self.ctx.cloud_for_location(&spec.location);
        let profile = &mut spec.orchestrator_profile;

        let requested = profile.orchestrator_version.clone();
        profile.orchestrator_version =
            self.ctx
                .versions
                .valid_patch_version(&requested, is_update_or_scale, has_windows);
        if requested != profile.orchestrator_version {
            info!(
                requested = %requested,
                resolved = %profile.orchestrator_version,
                "Normalized orchestrator version"
            );
        }
        let version = profile.orchestrator_version.as_str();
        let k8s = &mut profile.kubernetes_config;

        expand_legacy_network_policy(k8s);
        fill(&mut k8s.network_plugin, NetworkPlugin::Kubenet.as_str());

        fill(&mut k8s.kubernetes_image_base, &cloud.kubernetes_image_base);
        fill(&mut k8s.etcd_version, DEFAULT_ETCD_VERSION);
        let cluster_subnet = if k8s.is_azure_cni() {
            DEFAULT_AZURE_CNI_CLUSTER_SUBNET
        } else {
            DEFAULT_KUBERNETES_CLUSTER_SUBNET
        };
        fill(&mut k8s.cluster_subnet, cluster_subnet);
        if k8s.gc_high_threshold == 0 {
            k8s.gc_high_threshold = DEFAULT_GC_HIGH_THRESHOLD;
        }
        if k8s.gc_low_threshold == 0 {
            k8s.gc_low_threshold = DEFAULT_GC_LOW_THRESHOLD;
        }
        fill(&mut k8s.dns_service_ip, DEFAULT_DNS_SERVICE_IP);
        fill(&mut k8s.docker_bridge_subnet, DEFAULT_DOCKER_BRIDGE_SUBNET);
        fill(&mut k8s.service_cidr, DEFAULT_SERVICE_CIDR);
        fill(&mut k8s.etcd_disk_size_gb, etcd_disk_size_gb(total_nodes));

        fill_flag(&mut k8s.enable_rbac, true);
        fill_flag(&mut k8s.enable_secure_kubelet, true);
        fill_flag(&mut k8s.use_instance_metadata, true);

        if has_zones {
            k8s.load_balancer_sku = load_balancer_sku::STANDARD.to_string();
        }
        fill(&mut k8s.load_balancer_sku, load_balancer_sku::BASIC);
        if k8s.load_balancer_sku == load_balancer_sku::STANDARD {
            fill_flag(&mut k8s.exclude_master_from_standard_lb, true);
        }

        if KubernetesConfig::is_true(k8s.enable_data_encryption_at_rest)
            && k8s.etcd_encryption_key.is_empty()
        {
            match generate_etcd_encryption_key() {
                Some(key) => {
                    info!("Generated etcd encryption key");
                    k8s.etcd_encryption_key = key;
                }
                // Left empty so the next pass retries.
                None => tracing::warn!("System random source unavailable for etcd encryption key"),
            }
        }

        if KubernetesConfig::is_true(k8s.enable_rbac)
            && is_version_gte(version, &self.ctx.gates.aggregated_apis)
        {
            k8s.enable_aggregated_apis = true;
        }

        debug!(
            version = %version,
            network_plugin = %k8s.network_plugin,
            network_policy = %k8s.network_policy,
            cluster_subnet = %k8s.cluster_subnet,
            etcd_disk_size_gb = %k8s.etcd_disk_size_gb,
            "Resolved orchestrator defaults"
        );
    }
}
