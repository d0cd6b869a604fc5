//! Cluster specification aggregate and its profiles
//!
//! A [`ClusterSpecification`] is produced by the host's schema adapter,
//! mutated in place by one resolution pass, then handed to artifact
//! generation. Scalar fields use the empty string (or zero) for "unset" so
//! that resolvers can fill them only where the user left them blank.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::addon::Addon;
use super::types::{
    AvailabilityProfile, Distro, NetworkPlugin, OrchestratorType, OsType, StorageProfile,
};

/// Option-flag name to value, one map per managed component
pub type ComponentConfig = BTreeMap<String, String>;

static N_SERIES_SKU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^standard_n[cdv]\d").expect("valid N-series pattern"));

/// Returns true if the VM size belongs to the GPU-class N-series
pub fn is_n_series_sku(vm_size: &str) -> bool {
    N_SERIES_SKU.is_match(vm_size)
}

/// Root aggregate resolved by one defaulting pass
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpecification {
    /// Cloud region (selects the cloud environment)
    #[serde(default)]
    pub location: String,

    /// Orchestrator kind, version and component configuration
    pub orchestrator_profile: OrchestratorProfile,

    /// Self-hosted control plane; absent for hosted-control-plane clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_profile: Option<MasterProfile>,

    /// Hosted control plane endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_master_profile: Option<HostedMasterProfile>,

    /// Ordered agent pools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,

    /// Declared network profile (hosted clusters)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<NetworkProfile>,

    /// Directory integration for API server OIDC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_profile: Option<AadProfile>,

    /// PKI material
    #[serde(default)]
    pub certificate_profile: CertificateProfile,
}

impl ClusterSpecification {
    /// Masters plus all agent pool instances
    pub fn total_nodes(&self) -> u32 {
        let masters = self.master_profile.as_ref().map_or(0, |m| m.count);
        masters
            + self
                .agent_pool_profiles
                .iter()
                .map(|p| p.count)
                .sum::<u32>()
    }

    /// Returns true if any agent pool runs Windows
    pub fn has_windows(&self) -> bool {
        self.agent_pool_profiles
            .iter()
            .any(|p| p.os_type == OsType::Windows)
    }

    /// Returns true if the master or any pool requests availability zones
    pub fn has_availability_zones(&self) -> bool {
        let master = self
            .master_profile
            .as_ref()
            .is_some_and(|m| !m.availability_zones.is_empty());
        master
            || self
                .agent_pool_profiles
                .iter()
                .any(|p| !p.availability_zones.is_empty())
    }

    /// Returns true if any agent pool uses a GPU-class VM size
    pub fn has_n_series_sku(&self) -> bool {
        self.agent_pool_profiles
            .iter()
            .any(|p| is_n_series_sku(&p.vm_size))
    }

    /// Look up a declared add-on by name
    pub fn addon(&self, name: &str) -> Option<&Addon> {
        self.orchestrator_profile
            .kubernetes_config
            .addons
            .iter()
            .find(|a| a.name == name)
    }

    /// Returns true if the add-on is declared and explicitly enabled
    pub fn is_addon_enabled(&self, name: &str) -> bool {
        self.addon(name).is_some_and(|a| a.enabled == Some(true))
    }

    /// Returns true if the GPU device plugin add-on is explicitly enabled
    pub fn is_nvidia_device_plugin_enabled(&self) -> bool {
        self.is_addon_enabled(crate::addons::names::NVIDIA_DEVICE_PLUGIN)
    }

    /// DNS prefix of the control plane, self-hosted or hosted
    pub fn dns_prefix(&self) -> Option<&str> {
        self.master_profile
            .as_ref()
            .map(|m| m.dns_prefix.as_str())
            .or_else(|| {
                self.hosted_master_profile
                    .as_ref()
                    .map(|h| h.dns_prefix.as_str())
            })
    }

    /// Serialize to JSON for persistence by the host
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::Error::serialization(e.to_string()))
    }

    /// Deserialize from the canonical JSON form
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::serialization(e.to_string()))
    }
}

/// Orchestrator kind, version and Kubernetes configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProfile {
    /// Orchestrator family
    #[serde(default)]
    pub orchestrator_type: OrchestratorType,

    /// Orchestrator version (e.g. "1.10.8"); empty selects the default
    #[serde(default)]
    pub orchestrator_version: String,

    /// Kubernetes-specific settings
    #[serde(default)]
    pub kubernetes_config: KubernetesConfig,
}

/// Kubernetes scalar settings, add-ons and per-component flag maps
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// Registry prefix for control plane images
    #[serde(default)]
    pub kubernetes_image_base: String,
    /// etcd release
    #[serde(default)]
    pub etcd_version: String,
    /// etcd data disk size in GB
    #[serde(default, rename = "etcdDiskSizeGB")]
    pub etcd_disk_size_gb: String,
    /// Base64 secret used for encryption at rest
    #[serde(default)]
    pub etcd_encryption_key: String,
    /// Enables etcd encryption at rest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_data_encryption_at_rest: Option<bool>,
    /// Enables RBAC authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_rbac: Option<bool>,
    /// Enables the aggregated API layer (derived from RBAC and version)
    #[serde(default, rename = "enableAggregatedAPIs")]
    pub enable_aggregated_apis: bool,
    /// Enables authenticated kubelet endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_secure_kubelet: Option<bool>,
    /// Enables the pod security policy admission plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_pod_security_policy: Option<bool>,
    /// Runs cloud integration out of tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_cloud_controller_manager: Option<bool>,
    /// Uses the instance metadata service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_instance_metadata: Option<bool>,
    /// CNI plugin name (raw; see [`NetworkPlugin`])
    #[serde(default)]
    pub network_plugin: String,
    /// Network policy (legacy values also name a plugin)
    #[serde(default)]
    pub network_policy: String,
    /// Pod address range
    #[serde(default)]
    pub cluster_subnet: String,
    /// Cluster DNS service address
    #[serde(default, rename = "dnsServiceIP")]
    pub dns_service_ip: String,
    /// Service ClusterIP range
    #[serde(default, rename = "serviceCidr")]
    pub service_cidr: String,
    /// Docker bridge address
    #[serde(default)]
    pub docker_bridge_subnet: String,
    /// Image GC high watermark percentage
    #[serde(default, rename = "gcHighThreshold")]
    pub gc_high_threshold: u32,
    /// Image GC low watermark percentage
    #[serde(default, rename = "gcLowThreshold")]
    pub gc_low_threshold: u32,
    /// Load balancer tier ("Basic" or "Standard")
    #[serde(default)]
    pub load_balancer_sku: String,
    /// Keeps masters out of the Standard load balancer backend
    #[serde(default, rename = "excludeMasterFromStandardLB", skip_serializing_if = "Option::is_none")]
    pub exclude_master_from_standard_lb: Option<bool>,
    /// Add-on declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<Addon>,
    /// kubelet flags
    #[serde(default)]
    pub kubelet_config: ComponentConfig,
    /// kube-controller-manager flags
    #[serde(default)]
    pub controller_manager_config: ComponentConfig,
    /// cloud-controller-manager flags
    #[serde(default)]
    pub cloud_controller_manager_config: ComponentConfig,
    /// kube-apiserver flags
    #[serde(default, rename = "apiServerConfig")]
    pub apiserver_config: ComponentConfig,
    /// kube-scheduler flags
    #[serde(default)]
    pub scheduler_config: ComponentConfig,
    /// Pod security policy settings
    #[serde(default)]
    pub pod_security_policy_config: ComponentConfig,
}

impl KubernetesConfig {
    /// Parsed network plugin, if the raw value is supported
    pub fn plugin(&self) -> Option<NetworkPlugin> {
        self.network_plugin.parse().ok()
    }

    /// Returns true when pods get routable VNET addresses
    pub fn is_azure_cni(&self) -> bool {
        self.plugin() == Some(NetworkPlugin::Azure)
    }

    /// Returns true when pod traffic is routed through a route table
    pub fn require_route_table(&self) -> bool {
        self.network_plugin.is_empty() || self.plugin() == Some(NetworkPlugin::Kubenet)
    }

    /// Explicit true for an optional flag
    pub(crate) fn is_true(flag: Option<bool>) -> bool {
        flag == Some(true)
    }
}

/// Self-hosted control plane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterProfile {
    /// Number of masters (1, 3 or 5)
    pub count: u32,
    /// DNS prefix for the master endpoint
    #[serde(default)]
    pub dns_prefix: String,
    /// VM size
    #[serde(default)]
    pub vm_size: String,
    /// OS disk size in GB (0 = platform default)
    #[serde(default, rename = "osDiskSizeGB")]
    pub os_disk_size_gb: u32,
    /// Node image flavor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<Distro>,
    /// Disk attachment model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
    /// Placement model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_profile: Option<AvailabilityProfile>,
    /// Requested availability zones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,
    /// Custom VNET subnet resource ID
    #[serde(default, rename = "vnetSubnetID")]
    pub vnet_subnet_id: String,
    /// Master subnet CIDR
    #[serde(default)]
    pub subnet: String,
    /// Agent subnet CIDR when masters run on a scale set
    #[serde(default)]
    pub agent_subnet: String,
    /// First master private IP; later masters follow it
    #[serde(default)]
    pub first_consecutive_static_ip: String,
    /// Private IPs allocated per master node
    #[serde(default)]
    pub ip_address_count: u32,
    /// Extra SANs for the API server certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_alt_names: Vec<String>,
    /// Master kubelet flags; inherits the cluster map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_config: Option<ComponentConfig>,
}

impl MasterProfile {
    /// Returns true if the masters join a user-provided VNET
    pub fn is_custom_vnet(&self) -> bool {
        !self.vnet_subnet_id.is_empty()
    }

    /// Returns true if the masters run on a scale set
    pub fn is_virtual_machine_scale_sets(&self) -> bool {
        self.availability_profile == Some(AvailabilityProfile::VirtualMachineScaleSets)
    }
}

/// Hosted control plane endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostedMasterProfile {
    /// DNS prefix for the hosted endpoint
    pub dns_prefix: String,
    /// Resolved FQDN
    #[serde(default)]
    pub fqdn: String,
}

/// One agent pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    /// Pool name (lowercase alphanumeric, at most 12 characters)
    pub name: String,
    /// Instance count
    pub count: u32,
    /// VM size
    #[serde(default)]
    pub vm_size: String,
    /// Operating system
    #[serde(default)]
    pub os_type: OsType,
    /// OS disk size in GB (0 = platform default)
    #[serde(default, rename = "osDiskSizeGB")]
    pub os_disk_size_gb: u32,
    /// Node image flavor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distro: Option<Distro>,
    /// Disk attachment model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
    /// Placement model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_profile: Option<AvailabilityProfile>,
    /// Requested availability zones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_zones: Vec<String>,
    /// Scale set placement group mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_placement_group: Option<bool>,
    /// Custom VNET subnet resource ID
    #[serde(default, rename = "vnetSubnetID")]
    pub vnet_subnet_id: String,
    /// Pool subnet CIDR
    #[serde(default)]
    pub subnet: String,
    /// Private IPs allocated per node
    #[serde(default)]
    pub ip_address_count: u32,
    /// Pods per node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    /// Pool kubelet flags; inherits the cluster map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_config: Option<ComponentConfig>,
}

impl AgentPoolProfile {
    /// Returns true if the pool joins a user-provided VNET
    pub fn is_custom_vnet(&self) -> bool {
        !self.vnet_subnet_id.is_empty()
    }

    /// Returns true if the pool runs on a scale set
    pub fn is_virtual_machine_scale_sets(&self) -> bool {
        self.availability_profile == Some(AvailabilityProfile::VirtualMachineScaleSets)
    }

    /// Returns true if the pool runs Windows
    pub fn is_windows(&self) -> bool {
        self.os_type == OsType::Windows
    }
}

/// Declared network profile for hosted clusters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// CNI plugin name
    #[serde(default)]
    pub network_plugin: String,
    /// Pod CIDR (kubenet only)
    #[serde(default)]
    pub pod_cidr: String,
    /// Service CIDR
    #[serde(default)]
    pub service_cidr: String,
    /// DNS service IP inside the service CIDR
    #[serde(default, rename = "dnsServiceIP")]
    pub dns_service_ip: String,
    /// Docker bridge CIDR
    #[serde(default)]
    pub docker_bridge_cidr: String,
}

/// Directory integration settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AadProfile {
    /// Client application ID
    #[serde(default, rename = "clientAppID")]
    pub client_app_id: String,
    /// Server application ID (the OIDC audience)
    #[serde(default, rename = "serverAppID")]
    pub server_app_id: String,
    /// Directory tenant ID
    #[serde(default, rename = "tenantID")]
    pub tenant_id: String,
}

/// PEM-encoded PKI material
///
/// Every certificate travels with its private key; a group counts as present
/// only when all of its members are non-empty.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateProfile {
    /// Cluster CA certificate
    #[serde(default)]
    pub ca_certificate: String,
    /// Cluster CA key
    #[serde(default)]
    pub ca_private_key: String,
    /// API server certificate
    #[serde(default, rename = "apiServerCertificate")]
    pub apiserver_certificate: String,
    /// API server key
    #[serde(default, rename = "apiServerPrivateKey")]
    pub apiserver_private_key: String,
    /// kubelet client certificate
    #[serde(default)]
    pub client_certificate: String,
    /// kubelet client key
    #[serde(default)]
    pub client_private_key: String,
    /// Admin kubeconfig certificate
    #[serde(default)]
    pub kube_config_certificate: String,
    /// Admin kubeconfig key
    #[serde(default)]
    pub kube_config_private_key: String,
    /// etcd server certificate
    #[serde(default)]
    pub etcd_server_certificate: String,
    /// etcd server key
    #[serde(default)]
    pub etcd_server_private_key: String,
    /// etcd client certificate
    #[serde(default)]
    pub etcd_client_certificate: String,
    /// etcd client key
    #[serde(default)]
    pub etcd_client_private_key: String,
    /// One etcd peer certificate per master
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_peer_certificates: Vec<String>,
    /// One etcd peer key per master
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub etcd_peer_private_keys: Vec<String>,
}

fn pair_present(cert: &str, key: &str) -> bool {
    !cert.is_empty() && !key.is_empty()
}

impl CertificateProfile {
    /// CA certificate and key are both present
    pub fn has_ca(&self) -> bool {
        pair_present(&self.ca_certificate, &self.ca_private_key)
    }

    /// API server pair is present
    pub fn has_apiserver(&self) -> bool {
        pair_present(&self.apiserver_certificate, &self.apiserver_private_key)
    }

    /// kubelet client pair is present
    pub fn has_client(&self) -> bool {
        pair_present(&self.client_certificate, &self.client_private_key)
    }

    /// kubeconfig pair is present
    pub fn has_kube_config(&self) -> bool {
        pair_present(&self.kube_config_certificate, &self.kube_config_private_key)
    }

    /// etcd server, client and exactly `master_count` peer pairs are present
    pub fn has_etcd(&self, master_count: u32) -> bool {
        let expected = master_count as usize;
        let peers = self.etcd_peer_certificates.len() == expected
            && self.etcd_peer_private_keys.len() == expected
            && self
                .etcd_peer_certificates
                .iter()
                .zip(&self.etcd_peer_private_keys)
                .all(|(cert, key)| pair_present(cert, key));

        peers
            && pair_present(&self.etcd_server_certificate, &self.etcd_server_private_key)
            && pair_present(&self.etcd_client_certificate, &self.etcd_client_private_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str, count: u32, vm_size: &str) -> AgentPoolProfile {
        AgentPoolProfile {
            name: name.to_string(),
            count,
            vm_size: vm_size.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn n_series_detection() {
        assert!(is_n_series_sku("Standard_NC6"));
        assert!(is_n_series_sku("Standard_NV12"));
        assert!(is_n_series_sku("standard_nd24s"));
        assert!(!is_n_series_sku("Standard_D2_v2"));
        assert!(!is_n_series_sku("Standard_NetworkThing"));
        assert!(!is_n_series_sku(""));
    }

    #[test]
    fn total_nodes_counts_masters_and_pools() {
        let spec = ClusterSpecification {
            master_profile: Some(MasterProfile {
                count: 5,
                ..Default::default()
            }),
            agent_pool_profiles: vec![pool("a", 10, "Standard_D2_v2"), pool("b", 6, "x")],
            ..Default::default()
        };
        assert_eq!(spec.total_nodes(), 21);
    }

    #[test]
    fn zones_on_any_profile_count() {
        let mut spec = ClusterSpecification {
            agent_pool_profiles: vec![pool("a", 1, "x")],
            ..Default::default()
        };
        assert!(!spec.has_availability_zones());
        spec.agent_pool_profiles[0].availability_zones = vec!["1".to_string()];
        assert!(spec.has_availability_zones());
    }

    #[test]
    fn dns_prefix_prefers_master_then_hosted() {
        let mut spec = ClusterSpecification {
            hosted_master_profile: Some(HostedMasterProfile {
                dns_prefix: "hosted".to_string(),
                fqdn: String::new(),
            }),
            ..Default::default()
        };
        assert_eq!(spec.dns_prefix(), Some("hosted"));
        spec.master_profile = Some(MasterProfile {
            dns_prefix: "self".to_string(),
            ..Default::default()
        });
        assert_eq!(spec.dns_prefix(), Some("self"));
    }

    #[test]
    fn route_table_required_for_kubenet_only() {
        let mut config = KubernetesConfig {
            network_plugin: "kubenet".to_string(),
            ..Default::default()
        };
        assert!(config.require_route_table());
        config.network_plugin = "azure".to_string();
        assert!(!config.require_route_table());
        assert!(config.is_azure_cni());
        config.network_plugin = "cilium".to_string();
        assert!(!config.require_route_table());
    }

    mod certificate_groups {
        use super::*;

        fn etcd_complete(masters: usize) -> CertificateProfile {
            CertificateProfile {
                etcd_server_certificate: "c".into(),
                etcd_server_private_key: "k".into(),
                etcd_client_certificate: "c".into(),
                etcd_client_private_key: "k".into(),
                etcd_peer_certificates: vec!["c".into(); masters],
                etcd_peer_private_keys: vec!["k".into(); masters],
                ..Default::default()
            }
        }

        #[test]
        fn half_populated_pair_is_absent() {
            let profile = CertificateProfile {
                ca_certificate: "cert".into(),
                ..Default::default()
            };
            assert!(!profile.has_ca());
        }

        #[test]
        fn etcd_requires_peer_per_master() {
            let profile = etcd_complete(3);
            assert!(profile.has_etcd(3));
            assert!(!profile.has_etcd(5));
            assert!(!profile.has_etcd(1));
        }

        #[test]
        fn etcd_rejects_empty_peer_key() {
            let mut profile = etcd_complete(3);
            profile.etcd_peer_private_keys[1].clear();
            assert!(!profile.has_etcd(3));
        }
    }

    #[test]
    fn json_round_trip_preserves_spec() {
        let spec = ClusterSpecification {
            location: "westus2".to_string(),
            master_profile: Some(MasterProfile {
                count: 3,
                dns_prefix: "demo".to_string(),
                ..Default::default()
            }),
            agent_pool_profiles: vec![pool("agentpool1", 3, "Standard_D2_v2")],
            ..Default::default()
        };
        let json = spec.to_json().unwrap();
        assert!(json.contains("\"orchestratorProfile\""));
        assert_eq!(ClusterSpecification::from_json(&json).unwrap(), spec);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ClusterSpecification::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::Error::Serialization { .. }));
    }
}
