//! Cluster Resolver - defaulting, add-on resolution and PKI bootstrap for cluster specifications
//!
//! A user writes a partial cluster specification: master and agent topology,
//! orchestrator version, network mode, add-ons. This crate turns it into a
//! fully populated, internally consistent specification that deployment
//! artifact generation can consume, and issues the certificates the cluster
//! needs to boot.
//!
//! # Pipeline
//!
//! One resolution pass mutates a [`model::ClusterSpecification`] in place:
//! - Orchestrator scalars (version, network plugin, CIDRs, etcd settings)
//! - Master and agent pool profiles (addressing, distro, placement)
//! - Add-ons, merged against the built-in catalog
//! - Per-component flag maps (kubelet, controller managers, API server,
//!   scheduler, pod security policy)
//! - Certificates, generated only for groups the caller did not supply
//!
//! Re-running a pass on an already resolved specification changes nothing.
//! Network validation runs separately, usually before the pass.
//!
//! # Modules
//!
//! - [`model`] - Canonical cluster specification types
//! - [`context`] - Version, image and cloud lookup tables for a pass
//! - [`defaults`] - Orchestrator and profile defaulting entry point
//! - [`addons`] - Built-in add-on catalog and merge
//! - [`components`] - Layered flag maps per managed component
//! - [`validate`] - Network topology and profile validation
//! - [`pki`] - Certificate authority and bootstrap
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod addons;
pub mod components;
pub mod context;
pub mod defaults;
pub mod error;
pub mod model;
pub mod pki;
pub mod validate;

pub use context::ResolutionContext;
pub use defaults::OrchestratorDefaultsResolver;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Values shared by defaulting, component flags and certificate SANs.

/// DNS domain of in-cluster services
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Pods per node under kubenet
pub const DEFAULT_KUBERNETES_MAX_PODS: u32 = 110;

/// Pods per node when every pod gets a VNET address
pub const DEFAULT_AZURE_CNI_MAX_PODS: u32 = 30;

/// Directory holding control plane certificates on masters
pub const CERTS_DIR: &str = "/etc/kubernetes/certs";

/// Cloud provider config file on Linux nodes
pub const CLOUD_CONFIG_PATH: &str = "/etc/kubernetes/azure.json";
