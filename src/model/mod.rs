//! Canonical cluster specification model
//!
//! The host's schema adapter converts versioned input documents into these
//! types; resolvers mutate them in place.

mod addon;
mod cluster;
mod types;

pub use addon::{Addon, AddonContainer};
pub use cluster::{
    is_n_series_sku, AadProfile, AgentPoolProfile, CertificateProfile, ClusterSpecification,
    ComponentConfig, HostedMasterProfile, KubernetesConfig, MasterProfile, NetworkProfile,
    OrchestratorProfile,
};
pub use types::{
    load_balancer_sku, network_policy, AvailabilityProfile, Distro, NetworkPlugin,
    OrchestratorType, OsType, StorageProfile,
};
