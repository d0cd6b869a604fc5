//! Full resolution pass: defaults, validation and certificate bootstrap
//!
//! These drive the public API the way a request handler does for a create
//! or upgrade request.

use cluster_resolver::addons::names;
use cluster_resolver::model::{
    AgentPoolProfile, ClusterSpecification, MasterProfile, NetworkPlugin,
};
use cluster_resolver::pki::CertificateInfo;
use cluster_resolver::validate::{self, NetworkError};
use cluster_resolver::{Error, OrchestratorDefaultsResolver, ResolutionContext};

fn pool(name: &str, count: u32) -> AgentPoolProfile {
    AgentPoolProfile {
        name: name.to_string(),
        count,
        vm_size: "Standard_D2_v2".to_string(),
        ..Default::default()
    }
}

fn cluster(version: &str, masters: u32, pools: Vec<AgentPoolProfile>) -> ClusterSpecification {
    let mut spec = ClusterSpecification {
        location: "westus2".to_string(),
        master_profile: Some(MasterProfile {
            count: masters,
            dns_prefix: "pipeline".to_string(),
            vm_size: "Standard_D2_v2".to_string(),
            ..Default::default()
        }),
        agent_pool_profiles: pools,
        ..Default::default()
    };
    spec.orchestrator_profile.orchestrator_version = version.to_string();
    spec
}

fn subnet_id(group: &str, subnet: &str) -> String {
    format!(
        "/subscriptions/sub/resourceGroups/{group}/providers/Microsoft.Network/virtualNetworks/vnet/subnets/{subnet}"
    )
}

// ==========================================================================
// Story Tests: Creating a Cluster
// ==========================================================================

/// Story: A 1.9 RBAC cluster gets the metrics server and aggregated APIs
#[test]
fn story_rbac_cluster_gets_aggregation_layer() {
    let ctx = ResolutionContext::default();
    let mut spec = cluster("1.9", 1, vec![pool("agentpool1", 3)]);

    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);

    assert_eq!(spec.orchestrator_profile.orchestrator_version, "1.9.11");
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    assert!(k8s.enable_aggregated_apis);
    assert!(spec.is_addon_enabled(names::METRICS_SERVER));
    assert!(k8s
        .apiserver_config
        .contains_key("--requestheader-client-ca-file"));
    assert_eq!(
        k8s.apiserver_config.get("--authorization-mode").map(String::as_str),
        Some("Node,RBAC")
    );
    assert!(validate::validate(&spec).is_ok());
}

/// Story: A large cluster gets the largest etcd disk
#[test]
fn story_large_cluster_gets_large_etcd_disk() {
    let ctx = ResolutionContext::default();
    let mut spec = cluster("1.10.9", 5, vec![pool("pool1", 10), pool("pool2", 6)]);

    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);

    assert_eq!(
        spec.orchestrator_profile.kubernetes_config.etcd_disk_size_gb,
        "2048"
    );
}

/// Story: The legacy calico setting expands to kubenet with calico policy
#[test]
fn story_legacy_calico_becomes_kubenet() {
    let ctx = ResolutionContext::default();
    let mut spec = cluster("1.10.9", 1, vec![pool("agentpool1", 2)]);
    spec.orchestrator_profile.kubernetes_config.network_policy = "calico".to_string();

    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);

    let k8s = &spec.orchestrator_profile.kubernetes_config;
    assert_eq!(k8s.network_plugin, NetworkPlugin::Kubenet.as_str());
    assert_eq!(k8s.network_policy, "calico");
    assert_eq!(k8s.cluster_subnet, "10.244.0.0/16");
}

/// Story: Pools split across resource groups are rejected by rule
#[test]
fn story_resource_group_mismatch_is_identified() {
    let ctx = ResolutionContext::default();
    let mut first = pool("pool1", 1);
    first.vnet_subnet_id = subnet_id("rg-a", "s1");
    let mut second = pool("pool2", 1);
    second.vnet_subnet_id = subnet_id("rg-b", "s2");

    let mut spec = cluster("1.10.9", 1, vec![first, second]);
    if let Some(master) = spec.master_profile.as_mut() {
        master.vnet_subnet_id = subnet_id("rg-a", "master");
        master.first_consecutive_static_ip = "10.239.255.239".to_string();
    }
    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);

    match validate::validate(&spec) {
        Err(Error::Network {
            source: NetworkError::ResourceGroupMismatch { expected, found },
        }) => {
            assert_eq!(expected, "rg-a");
            assert_eq!(found, "rg-b");
        }
        other => panic!("Expected ResourceGroupMismatch, got {other:?}"),
    }
}

/// Story: Create then upgrade keeps the certificate bundle
#[test]
fn story_create_then_upgrade_keeps_certificates() {
    let ctx = ResolutionContext::default();
    let resolver = OrchestratorDefaultsResolver::new(&ctx);
    let mut spec = cluster("1.10.9", 3, vec![pool("agentpool1", 3)]);

    assert!(resolver.resolve_with_certificates(&mut spec, false).unwrap());

    let certs = spec.certificate_profile.clone();
    assert!(certs.has_etcd(3));
    let apiserver = CertificateInfo::from_pem(&certs.apiserver_certificate).unwrap();
    assert_eq!(apiserver.ip_addresses.len(), 5);
    assert_eq!(
        apiserver.ip_addresses[0].to_string(),
        "10.240.255.5",
        "first master IP comes from the master defaults"
    );
    assert!(apiserver
        .dns_names
        .contains(&"pipeline.westus2.cloudapp.azure.com".to_string()));

    let resolved = spec.clone();
    assert!(!resolver.resolve_with_certificates(&mut spec, true).unwrap());
    assert_eq!(spec.certificate_profile, certs);
    assert_eq!(spec, resolved);
}

/// Story: Upgrading 1.9 to 1.10 hands the API server only the renamed admission flag
#[test]
fn story_upgrade_across_admission_flag_rename() {
    let ctx = ResolutionContext::default();
    let resolver = OrchestratorDefaultsResolver::new(&ctx);
    let mut spec = cluster("1.9.11", 1, vec![pool("agentpool1", 3)]);
    resolver.resolve(&mut spec, false);

    spec.orchestrator_profile.orchestrator_version = "1.10.9".to_string();
    resolver.resolve(&mut spec, true);

    let apiserver = &spec.orchestrator_profile.kubernetes_config.apiserver_config;
    assert!(!apiserver.contains_key("--admission-control"));
    assert!(apiserver.contains_key("--enable-admission-plugins"));

    let upgraded = spec.clone();
    resolver.resolve(&mut spec, true);
    assert_eq!(spec, upgraded);
}

/// Story: A resolved specification survives a JSON round trip
#[test]
fn story_resolved_spec_persists_as_json() {
    let ctx = ResolutionContext::default();
    let mut spec = cluster("1.11", 1, vec![pool("agentpool1", 1)]);
    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);

    let json = spec.to_json().unwrap();
    let restored = ClusterSpecification::from_json(&json).unwrap();
    assert_eq!(restored, spec);
}

#[test]
fn context_loaded_from_file_drives_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    std::fs::write(
        &path,
        r#"{ "versions": {
              "supported": ["1.11.5"],
              "deprecated": [],
              "windowsSupported": ["1.11.5"],
              "defaultVersion": "1.11.5",
              "defaultWindowsVersion": "1.11.5"
        } }"#,
    )
    .unwrap();

    let ctx = ResolutionContext::from_file(&path).unwrap();
    let mut spec = cluster("", 1, vec![pool("agentpool1", 1)]);
    OrchestratorDefaultsResolver::new(&ctx).resolve(&mut spec, false);
    assert_eq!(spec.orchestrator_profile.orchestrator_version, "1.11.5");
}
