//! Enumerations shared by the cluster specification profiles

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Orchestrator family a cluster runs
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrchestratorType {
    /// Kubernetes (the only family the component and PKI stages handle)
    #[default]
    Kubernetes,
    /// Mesosphere DC/OS
    #[serde(rename = "DCOS")]
    Dcos,
    /// Legacy Docker Swarm
    Swarm,
    /// Docker Swarm mode
    #[serde(rename = "SwarmMode")]
    SwarmMode,
}

impl OrchestratorType {
    /// Returns true for the Kubernetes orchestrator
    pub fn is_kubernetes(&self) -> bool {
        matches!(self, Self::Kubernetes)
    }
}

impl std::fmt::Display for OrchestratorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubernetes => write!(f, "Kubernetes"),
            Self::Dcos => write!(f, "DCOS"),
            Self::Swarm => write!(f, "Swarm"),
            Self::SwarmMode => write!(f, "SwarmMode"),
        }
    }
}

/// Container networking plugin
///
/// Kubernetes config stores the plugin as a raw string so that unsupported
/// values survive until validation; this enum is the parsed form.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPlugin {
    /// Native cloud CNI: one routable VNET address per pod
    Azure,
    /// Kubenet bridge with a route table
    Kubenet,
    /// Flannel overlay
    Flannel,
    /// Cilium eBPF networking
    Cilium,
}

impl NetworkPlugin {
    /// Wire name of the plugin
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::Kubenet => "kubenet",
            Self::Flannel => "flannel",
            Self::Cilium => "cilium",
        }
    }
}

impl std::str::FromStr for NetworkPlugin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "azure" => Ok(Self::Azure),
            "kubenet" => Ok(Self::Kubenet),
            "flannel" => Ok(Self::Flannel),
            "cilium" => Ok(Self::Cilium),
            _ => Err(format!(
                "invalid network plugin: {s}, expected one of: azure, kubenet, flannel, cilium"
            )),
        }
    }
}

impl std::fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy network policy values (the field once named both plugin and policy)
pub mod network_policy {
    /// Native cloud network policy
    pub const AZURE: &str = "azure";
    /// No policy enforcement
    pub const NONE: &str = "none";
    /// Calico policy enforcement on top of kubenet
    pub const CALICO: &str = "calico";
    /// Cilium policy enforcement
    pub const CILIUM: &str = "cilium";
    /// The resolved "no explicit policy" value
    pub const DEFAULT: &str = "";
}

/// VM placement model for a master or agent pool
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AvailabilityProfile {
    /// Fixed-size availability set
    AvailabilitySet,
    /// Elastic virtual machine scale set
    VirtualMachineScaleSets,
}

/// Disk attachment model
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StorageProfile {
    /// Platform-managed disks
    ManagedDisks,
    /// Disks stored in a storage account
    StorageAccount,
}

/// Node operating system image flavor
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Distro {
    /// Stock Ubuntu image
    Ubuntu,
    /// Pre-baked node image
    Aks,
    /// Pre-baked node image with GPU drivers
    AksGpu,
}

impl std::fmt::Display for Distro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ubuntu => write!(f, "ubuntu"),
            Self::Aks => write!(f, "aks"),
            Self::AksGpu => write!(f, "aks-gpu"),
        }
    }
}

/// Node operating system
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum OsType {
    /// Linux nodes
    #[default]
    Linux,
    /// Windows nodes
    Windows,
}

/// Load balancer tier
pub mod load_balancer_sku {
    /// Zone-unaware tier
    pub const BASIC: &str = "Basic";
    /// Zone-aware tier
    pub const STANDARD: &str = "Standard";
}
