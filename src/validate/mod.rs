//! Network topology and profile validation
//!
//! Each rule has its own error variant so callers and tests match on which
//! rule failed. Validation is independent of defaulting and is usually run
//! by the host before a resolution pass.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use ipnet::Ipv4Net;
use regex::Regex;
use thiserror::Error;

use crate::model::{AgentPoolProfile, ClusterSpecification, NetworkPlugin, NetworkProfile};

/// Largest service CIDR, in host bits
pub const MAX_SERVICE_CIDR_HOST_BITS: u8 = 20;

/// Smallest allowed pods-per-node
pub const MIN_MAX_PODS: u32 = 5;

/// Longest agent pool name
pub const MAX_AGENT_POOL_NAME_LEN: usize = 12;

static SUBNET_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^/subscriptions/([^/]*)/resourceGroups/([^/]*)/providers/Microsoft.Network/virtualNetworks/([^/]*)/subnets/([^/]*)$",
    )
    .expect("valid subnet ID pattern")
});

/// Network topology rule failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Some profiles use a custom VNET subnet and others do not
    #[error("custom VNET subnets must be set on all agent pools or none")]
    CustomSubnetMixed,

    /// Only part of service CIDR, DNS service IP and docker bridge CIDR is set
    #[error("serviceCidr, dnsServiceIP and dockerBridgeCidr must all be set or all be empty")]
    PartialNetworkProfile,

    /// Service CIDR does not parse
    #[error("invalid service CIDR: {0}")]
    InvalidServiceCidr(String),

    /// Service CIDR has too many host bits
    #[error("service CIDR {cidr} is too large: {host_bits} host bits, at most 20 allowed")]
    ServiceCidrTooLarge {
        /// The offending CIDR
        cidr: String,
        /// Host bits of the CIDR
        host_bits: u8,
    },

    /// DNS service IP does not parse
    #[error("invalid DNS service IP: {0}")]
    InvalidDnsServiceIp(String),

    /// DNS service IP lies outside the service CIDR
    #[error("DNS service IP {ip} is not within service CIDR {cidr}")]
    DnsServiceIpOutsideServiceCidr {
        /// DNS service IP
        ip: String,
        /// Service CIDR
        cidr: String,
    },

    /// DNS service IP is the API server's in-cluster address
    #[error("DNS service IP {0} cannot be the first address of the service CIDR")]
    DnsServiceIpIsFirstAddress(String),

    /// Docker bridge CIDR does not parse
    #[error("invalid docker bridge CIDR: {0}")]
    InvalidDockerBridgeCidr(String),

    /// Pod CIDR set together with the cloud CNI plugin
    #[error("pod CIDR cannot be set when the network plugin is azure")]
    PodCidrWithAzureCni,

    /// Network plugin is not supported
    #[error("unsupported network plugin: {0}")]
    UnsupportedNetworkPlugin(String),

    /// An agent pool lacks a subnet under a custom master VNET
    #[error("agent pool {pool} must set a VNET subnet when the master uses a custom VNET")]
    MissingSubnet {
        /// Pool name
        pool: String,
    },

    /// Subnet resource ID does not match the expected path
    #[error("invalid VNET subnet ID: {0}")]
    InvalidSubnetId(String),

    /// Master and agent pool subnets span subscriptions
    #[error("cluster subnets must share a subscription: expected {expected}, found {found}")]
    SubscriptionMismatch {
        /// Subscription of the master, or of the first pool
        expected: String,
        /// Conflicting subscription
        found: String,
    },

    /// Master and agent pool subnets span resource groups
    #[error("cluster subnets must share a resource group: expected {expected}, found {found}")]
    ResourceGroupMismatch {
        /// Resource group of the master, or of the first pool
        expected: String,
        /// Conflicting resource group
        found: String,
    },

    /// Master and agent pool subnets span VNETs
    #[error("cluster subnets must share a VNET: expected {expected}, found {found}")]
    VnetMismatch {
        /// VNET of the master, or of the first pool
        expected: String,
        /// Conflicting VNET
        found: String,
    },

    /// Pods-per-node below the minimum
    #[error("agent pool {pool} maxPods {max_pods} is below the minimum of 5")]
    MaxPodsTooLow {
        /// Pool name
        pool: String,
        /// Requested pods per node
        max_pods: u32,
    },
}

/// Agent pool and add-on declaration failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// Two agent pools share a name
    #[error("duplicate agent pool name: {0}")]
    DuplicateAgentPoolName(String),

    /// Pool name is not 1 to 12 lowercase alphanumerics
    #[error("invalid agent pool name {0:?}: must be 1-12 lowercase letters or digits")]
    InvalidAgentPoolName(String),

    /// Two add-ons share a name
    #[error("duplicate add-on name: {0}")]
    DuplicateAddonName(String),
}

/// Decomposed subnet resource ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetId {
    /// Subscription ID
    pub subscription: String,
    /// Resource group name
    pub resource_group: String,
    /// VNET name
    pub vnet: String,
    /// Subnet name
    pub subnet: String,
}

impl std::str::FromStr for SubnetId {
    type Err = NetworkError;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let captures = SUBNET_ID
            .captures(id)
            .ok_or_else(|| NetworkError::InvalidSubnetId(id.to_string()))?;
        let part = |i: usize| {
            captures
                .get(i)
                .map_or_else(String::new, |m| m.as_str().to_string())
        };
        Ok(Self {
            subscription: part(1),
            resource_group: part(2),
            vnet: part(3),
            subnet: part(4),
        })
    }
}

/// Validate every network topology rule
pub fn validate_network(spec: &ClusterSpecification) -> Result<(), NetworkError> {
    validate_plugins(spec)?;
    if let Some(profile) = spec.network_profile.as_ref() {
        validate_network_profile(profile)?;
    }
    validate_custom_vnet(spec)?;
    validate_max_pods(&spec.agent_pool_profiles)
}

fn validate_plugins(spec: &ClusterSpecification) -> Result<(), NetworkError> {
    let declared = spec
        .network_profile
        .as_ref()
        .map(|p| p.network_plugin.as_str());
    let configured = spec.orchestrator_profile.kubernetes_config.network_plugin.as_str();
    for plugin in declared.into_iter().chain([configured]) {
        if !plugin.is_empty() && plugin.parse::<NetworkPlugin>().is_err() {
            return Err(NetworkError::UnsupportedNetworkPlugin(plugin.to_string()));
        }
    }
    Ok(())
}

/// Validate a declared network profile
pub fn validate_network_profile(profile: &NetworkProfile) -> Result<(), NetworkError> {
    if profile.network_plugin == NetworkPlugin::Azure.as_str() && !profile.pod_cidr.is_empty() {
        return Err(NetworkError::PodCidrWithAzureCni);
    }

    let set = [
        &profile.service_cidr,
        &profile.dns_service_ip,
        &profile.docker_bridge_cidr,
    ]
    .iter()
    .filter(|v| !v.is_empty())
    .count();
    match set {
        0 => return Ok(()),
        3 => {}
        _ => return Err(NetworkError::PartialNetworkProfile),
    }

    let service: Ipv4Net = profile
        .service_cidr
        .parse()
        .map_err(|_| NetworkError::InvalidServiceCidr(profile.service_cidr.clone()))?;
    let host_bits = 32 - service.prefix_len();
    if host_bits > MAX_SERVICE_CIDR_HOST_BITS {
        return Err(NetworkError::ServiceCidrTooLarge {
            cidr: profile.service_cidr.clone(),
            host_bits,
        });
    }

    let dns: Ipv4Addr = profile
        .dns_service_ip
        .parse()
        .map_err(|_| NetworkError::InvalidDnsServiceIp(profile.dns_service_ip.clone()))?;
    if !service.contains(&dns) {
        return Err(NetworkError::DnsServiceIpOutsideServiceCidr {
            ip: profile.dns_service_ip.clone(),
            cidr: profile.service_cidr.clone(),
        });
    }
    if service.hosts().next() == Some(dns) {
        return Err(NetworkError::DnsServiceIpIsFirstAddress(
            profile.dns_service_ip.clone(),
        ));
    }

    profile
        .docker_bridge_cidr
        .parse::<Ipv4Net>()
        .map_err(|_| NetworkError::InvalidDockerBridgeCidr(profile.docker_bridge_cidr.clone()))?;
    Ok(())
}

fn validate_custom_vnet(spec: &ClusterSpecification) -> Result<(), NetworkError> {
    let pools = &spec.agent_pool_profiles;
    let master_custom = spec.master_profile.as_ref().map(|m| m.is_custom_vnet());

    match master_custom {
        Some(true) => {
            if let Some(pool) = pools.iter().find(|p| !p.is_custom_vnet()) {
                return Err(NetworkError::MissingSubnet {
                    pool: pool.name.clone(),
                });
            }
        }
        Some(false) => {
            if pools.iter().any(AgentPoolProfile::is_custom_vnet) {
                return Err(NetworkError::CustomSubnetMixed);
            }
        }
        None => {
            let custom = pools.iter().filter(|p| p.is_custom_vnet()).count();
            if custom > 0 && custom < pools.len() {
                return Err(NetworkError::CustomSubnetMixed);
            }
        }
    }

    // The master's subnet, when custom, is the reference for every pool.
    let ids = spec
        .master_profile
        .iter()
        .filter(|m| m.is_custom_vnet())
        .map(|m| m.vnet_subnet_id.as_str())
        .chain(
            pools
                .iter()
                .filter(|p| p.is_custom_vnet())
                .map(|p| p.vnet_subnet_id.as_str()),
        )
        .map(str::parse::<SubnetId>)
        .collect::<Result<Vec<_>, _>>()?;

    let Some((first, rest)) = ids.split_first() else {
        return Ok(());
    };
    for id in rest {
        if id.subscription != first.subscription {
            return Err(NetworkError::SubscriptionMismatch {
                expected: first.subscription.clone(),
                found: id.subscription.clone(),
            });
        }
        if id.resource_group != first.resource_group {
            return Err(NetworkError::ResourceGroupMismatch {
                expected: first.resource_group.clone(),
                found: id.resource_group.clone(),
            });
        }
        if id.vnet != first.vnet {
            return Err(NetworkError::VnetMismatch {
                expected: first.vnet.clone(),
                found: id.vnet.clone(),
            });
        }
    }
    Ok(())
}

fn validate_max_pods(pools: &[AgentPoolProfile]) -> Result<(), NetworkError> {
    for pool in pools {
        if let Some(max_pods) = pool.max_pods.filter(|&m| m < MIN_MAX_PODS) {
            return Err(NetworkError::MaxPodsTooLow {
                pool: pool.name.clone(),
                max_pods,
            });
        }
    }
    Ok(())
}

/// Agent pool names are unique lowercase alphanumerics of at most 12 characters
pub fn validate_agent_pool_names(pools: &[AgentPoolProfile]) -> Result<(), ProfileError> {
    let mut seen = HashSet::new();
    for pool in pools {
        let name = pool.name.as_str();
        let valid = !name.is_empty()
            && name.len() <= MAX_AGENT_POOL_NAME_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid {
            return Err(ProfileError::InvalidAgentPoolName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(ProfileError::DuplicateAgentPoolName(name.to_string()));
        }
    }
    Ok(())
}

/// Add-on names are unique
pub fn validate_addon_names(spec: &ClusterSpecification) -> Result<(), ProfileError> {
    let mut seen = HashSet::new();
    for addon in &spec.orchestrator_profile.kubernetes_config.addons {
        if !seen.insert(addon.name.as_str()) {
            return Err(ProfileError::DuplicateAddonName(addon.name.clone()));
        }
    }
    Ok(())
}

/// Run network and profile validation, returning the first failure
pub fn validate(spec: &ClusterSpecification) -> crate::Result<()> {
    validate_agent_pool_names(&spec.agent_pool_profiles)?;
    validate_addon_names(spec)?;
    validate_network(spec)?;
    Ok(())
}
