//! Default certificate generation for a cluster specification

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use tracing::{debug, info};

use super::{
    CertificateAuthority, CertificatePair, CertificateUsage, LeafRequest, PkiError, Result,
};
use crate::context::ResolutionContext;
use crate::model::{CertificateProfile, ClusterSpecification, MasterProfile};
use crate::DEFAULT_CLUSTER_DOMAIN;

/// Offset of the internal load balancer IP from the first master IP
pub const INTERNAL_LB_STATIC_IP_OFFSET: u32 = 10;

/// Group granted cluster-admin by the default RBAC bindings
const MASTERS_GROUP: &str = "system:masters";

/// Which certificate groups are already complete
#[derive(Debug, Clone, Copy)]
struct Present {
    ca: bool,
    apiserver: bool,
    client: bool,
    kube_config: bool,
    etcd: bool,
}

impl Present {
    fn of(certs: &CertificateProfile, master_count: u32) -> Self {
        Self {
            ca: certs.has_ca(),
            apiserver: certs.has_apiserver(),
            client: certs.has_client(),
            kube_config: certs.has_kube_config(),
            etcd: certs.has_etcd(master_count),
        }
    }

    fn all(&self) -> bool {
        self.ca && self.apiserver && self.client && self.kube_config && self.etcd
    }
}

/// IP SANs for the control plane
///
/// First master, internal load balancer, the remaining masters (one
/// address apart, or one node's IP allocation apart on a scale set) and
/// the first address of the service CIDR.
pub fn master_ip_addresses(master: &MasterProfile, service_cidr: &str) -> Result<Vec<IpAddr>> {
    let first: Ipv4Addr = master
        .first_consecutive_static_ip
        .parse()
        .map_err(|_| PkiError::InvalidMasterIp(master.first_consecutive_static_ip.clone()))?;
    let service: Ipv4Net = service_cidr
        .parse()
        .map_err(|_| PkiError::InvalidServiceCidr(service_cidr.to_string()))?;

    let offset = |n: u32| IpAddr::V4(Ipv4Addr::from(u32::from(first).wrapping_add(n)));
    let stride = if master.is_virtual_machine_scale_sets() {
        master.ip_address_count.max(1)
    } else {
        1
    };

    let mut ips = vec![IpAddr::V4(first), offset(INTERNAL_LB_STATIC_IP_OFFSET)];
    ips.extend((1..master.count).map(|i| offset(i * stride)));
    ips.push(IpAddr::V4(Ipv4Addr::from(
        u32::from(service.network()).wrapping_add(1),
    )));
    Ok(ips)
}

fn apiserver_dns_names(
    master: &MasterProfile,
    ctx: &ResolutionContext,
) -> Vec<String> {
    let mut names: Vec<String> = [
        "kubernetes".to_string(),
        "kubernetes.default".to_string(),
        "kubernetes.default.svc".to_string(),
        format!("kubernetes.default.svc.{DEFAULT_CLUSTER_DOMAIN}"),
    ]
    .into_iter()
    .chain(ctx.master_fqdns(&master.dns_prefix))
    .collect();
    for san in &master.subject_alt_names {
        if !names.contains(san) {
            names.push(san.clone());
        }
    }
    names
}

/// Generate every missing pair in the cluster's certificate profile
///
/// Returns false without touching the profile when the cluster has no
/// master profile, is not Kubernetes, or already carries a complete bundle.
/// A group that was incomplete is replaced; when the CA itself had to be
/// created every group is replaced so that the whole bundle chains to it.
/// The profile is only written once every pair has been issued.
pub fn set_default_certs(spec: &mut ClusterSpecification, ctx: &ResolutionContext) -> Result<bool> {
    if !spec.orchestrator_profile.orchestrator_type.is_kubernetes() {
        return Ok(false);
    }
    let Some(master) = spec.master_profile.as_ref() else {
        return Ok(false);
    };

    let present = Present::of(&spec.certificate_profile, master.count);
    if present.all() {
        debug!(cluster = %master.dns_prefix, "Certificate bundle complete");
        return Ok(false);
    }

    let ips = master_ip_addresses(
        master,
        &spec.orchestrator_profile.kubernetes_config.service_cidr,
    )?;
    let dns_names = apiserver_dns_names(master, ctx);
    let master_count = master.count;
    let cluster = master.dns_prefix.clone();

    let mut certs = spec.certificate_profile.clone();
    let ca = if present.ca {
        CertificateAuthority::from_pem(&certs.ca_certificate, &certs.ca_private_key)?
    } else {
        let ca = CertificateAuthority::new("ca")?;
        certs.ca_certificate = ca.ca_cert_pem().to_string();
        certs.ca_private_key = ca.ca_key_pem().to_string();
        ca
    };
    let fresh_ca = !present.ca;

    let mut regenerated = Vec::new();
    if fresh_ca {
        regenerated.push("ca");
    }

    if fresh_ca || !present.apiserver {
        let pair = ca.issue(
            &LeafRequest::new("apiserver", CertificateUsage::Server).sans(&dns_names, &ips),
        )?;
        store(&mut certs.apiserver_certificate, &mut certs.apiserver_private_key, pair);
        regenerated.push("apiserver");
    }

    if fresh_ca || !present.client {
        let pair = ca.issue(
            &LeafRequest::new("client", CertificateUsage::Client).organization(MASTERS_GROUP),
        )?;
        store(&mut certs.client_certificate, &mut certs.client_private_key, pair);
        regenerated.push("client");
    }

    if fresh_ca || !present.kube_config {
        let pair = ca.issue(
            &LeafRequest::new("kubeconfig", CertificateUsage::Client).organization(MASTERS_GROUP),
        )?;
        store(
            &mut certs.kube_config_certificate,
            &mut certs.kube_config_private_key,
            pair,
        );
        regenerated.push("kubeconfig");
    }

    if fresh_ca || !present.etcd {
        let server = ca.issue(
            &LeafRequest::new("etcdserver", CertificateUsage::Peer).sans(&[], &ips),
        )?;
        let client = ca.issue(
            &LeafRequest::new("etcdclient", CertificateUsage::Client).sans(&[], &ips),
        )?;
        let mut peer_certificates = Vec::with_capacity(master_count as usize);
        let mut peer_private_keys = Vec::with_capacity(master_count as usize);
        for i in 0..master_count {
            let name = format!("etcdpeer{i}");
            let peer = ca.issue(&LeafRequest::new(&name, CertificateUsage::Peer).sans(&[], &ips))?;
            peer_certificates.push(peer.certificate);
            peer_private_keys.push(peer.private_key);
        }

        store(
            &mut certs.etcd_server_certificate,
            &mut certs.etcd_server_private_key,
            server,
        );
        store(
            &mut certs.etcd_client_certificate,
            &mut certs.etcd_client_private_key,
            client,
        );
        certs.etcd_peer_certificates = peer_certificates;
        certs.etcd_peer_private_keys = peer_private_keys;
        regenerated.push("etcd");
    }
    spec.certificate_profile = certs;

    info!(
        cluster = %cluster,
        groups = ?regenerated,
        ip_sans = ips.len(),
        "Generated cluster certificates"
    );
    Ok(true)
}

fn store(certificate: &mut String, private_key: &mut String, pair: CertificatePair) {
    *certificate = pair.certificate;
    *private_key = pair.private_key;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AvailabilityProfile;
    use crate::pki::CertificateInfo;

    fn master(count: u32) -> MasterProfile {
        MasterProfile {
            count,
            dns_prefix: "mycluster".to_string(),
            first_consecutive_static_ip: "10.240.255.5".to_string(),
            ..Default::default()
        }
    }

    fn spec(count: u32) -> ClusterSpecification {
        let mut spec = ClusterSpecification {
            location: "westus2".to_string(),
            master_profile: Some(master(count)),
            ..Default::default()
        };
        spec.orchestrator_profile.kubernetes_config.service_cidr = "10.0.0.0/16".to_string();
        spec
    }

    fn ips(addresses: &[&str]) -> Vec<IpAddr> {
        addresses.iter().map(|a| a.parse().unwrap()).collect()
    }

    mod addressing {
        use super::*;

        #[test]
        fn availability_set_masters_are_consecutive() {
            let result = master_ip_addresses(&master(3), "10.0.0.0/16").unwrap();
            assert_eq!(
                result,
                ips(&[
                    "10.240.255.5",
                    "10.240.255.15",
                    "10.240.255.6",
                    "10.240.255.7",
                    "10.0.0.1"
                ])
            );
        }

        #[test]
        fn scale_set_masters_step_by_node_allocation() {
            let mut master = master(3);
            master.availability_profile = Some(AvailabilityProfile::VirtualMachineScaleSets);
            master.first_consecutive_static_ip = "10.240.0.4".to_string();
            master.ip_address_count = 31;

            let result = master_ip_addresses(&master, "10.0.0.0/16").unwrap();
            assert_eq!(
                result,
                ips(&["10.240.0.4", "10.240.0.14", "10.240.0.35", "10.240.0.66", "10.0.0.1"])
            );
        }

        #[test]
        fn offsets_carry_into_next_octet() {
            let mut master = master(1);
            master.first_consecutive_static_ip = "10.240.255.250".to_string();
            let result = master_ip_addresses(&master, "10.0.0.0/16").unwrap();
            assert_eq!(result[1], "10.241.0.4".parse::<IpAddr>().unwrap());
        }

        #[test]
        fn malformed_inputs_rejected() {
            let mut bad_ip = master(1);
            bad_ip.first_consecutive_static_ip = "10.240.255".to_string();
            assert!(matches!(
                master_ip_addresses(&bad_ip, "10.0.0.0/16"),
                Err(PkiError::InvalidMasterIp(_))
            ));
            assert!(matches!(
                master_ip_addresses(&master(1), "10.0.0.0"),
                Err(PkiError::InvalidServiceCidr(_))
            ));
        }
    }

    // ==========================================================================
    // Story Tests: Certificate Bootstrap
    // ==========================================================================
    //
    // A new cluster gets a CA and every control-plane pair. A cluster that
    // already has its bundle is never touched, so certificates survive
    // upgrade and scale.

    /// Story: A three-master cluster gets a full bundle chained to one CA
    #[test]
    fn story_new_cluster_gets_complete_bundle() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(3);

        assert!(set_default_certs(&mut spec, &ctx).unwrap());

        let certs = &spec.certificate_profile;
        assert!(certs.has_ca());
        assert!(certs.has_apiserver());
        assert!(certs.has_client());
        assert!(certs.has_kube_config());
        assert!(certs.has_etcd(3));

        let apiserver = CertificateInfo::from_pem(&certs.apiserver_certificate).unwrap();
        assert_eq!(apiserver.issuer_common_name, "ca");
        assert_eq!(apiserver.ip_addresses.len(), 5);
        assert!(apiserver
            .dns_names
            .contains(&"mycluster.westus2.cloudapp.azure.com".to_string()));
        assert!(apiserver
            .dns_names
            .contains(&"kubernetes.default.svc.cluster.local".to_string()));

        let client = CertificateInfo::from_pem(&certs.client_certificate).unwrap();
        assert_eq!(client.organizations, vec![MASTERS_GROUP.to_string()]);

        for (i, peer) in certs.etcd_peer_certificates.iter().enumerate() {
            let info = CertificateInfo::from_pem(peer).unwrap();
            assert_eq!(info.common_name, format!("etcdpeer{i}"));
            assert_eq!(info.issuer_common_name, "ca");
        }
    }

    /// Story: A complete bundle is left byte-identical
    #[test]
    fn story_complete_bundle_is_untouched() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(3);
        set_default_certs(&mut spec, &ctx).unwrap();
        let before = spec.certificate_profile.clone();

        assert!(!set_default_certs(&mut spec, &ctx).unwrap());
        assert_eq!(spec.certificate_profile, before);
    }

    /// Story: Scaling masters regenerates only the etcd group
    #[test]
    fn story_master_scale_regenerates_etcd_only() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(1);
        set_default_certs(&mut spec, &ctx).unwrap();
        let before = spec.certificate_profile.clone();

        if let Some(master) = spec.master_profile.as_mut() {
            master.count = 3;
        }
        assert!(set_default_certs(&mut spec, &ctx).unwrap());

        let after = &spec.certificate_profile;
        assert_eq!(after.ca_certificate, before.ca_certificate);
        assert_eq!(after.apiserver_certificate, before.apiserver_certificate);
        assert_eq!(after.client_certificate, before.client_certificate);
        assert_ne!(after.etcd_server_certificate, before.etcd_server_certificate);
        assert_eq!(after.etcd_peer_certificates.len(), 3);
    }

    /// Story: A supplied CA is reused and signs the missing pairs
    #[test]
    fn story_supplied_ca_is_reused() {
        let ctx = ResolutionContext::default();
        let ca = CertificateAuthority::new("customer-root").unwrap();
        let mut spec = spec(1);
        spec.certificate_profile.ca_certificate = ca.ca_cert_pem().to_string();
        spec.certificate_profile.ca_private_key = ca.ca_key_pem().to_string();

        assert!(set_default_certs(&mut spec, &ctx).unwrap());
        assert_eq!(spec.certificate_profile.ca_certificate, ca.ca_cert_pem());

        let apiserver =
            CertificateInfo::from_pem(&spec.certificate_profile.apiserver_certificate).unwrap();
        assert_eq!(apiserver.issuer_common_name, "customer-root");
    }

    /// Story: Losing the CA replaces pairs signed by the old one
    #[test]
    fn story_missing_ca_replaces_everything() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(1);
        set_default_certs(&mut spec, &ctx).unwrap();
        let before = spec.certificate_profile.clone();

        spec.certificate_profile.ca_private_key.clear();
        assert!(set_default_certs(&mut spec, &ctx).unwrap());

        let after = &spec.certificate_profile;
        assert_ne!(after.ca_certificate, before.ca_certificate);
        assert_ne!(after.apiserver_certificate, before.apiserver_certificate);
        assert_ne!(after.kube_config_certificate, before.kube_config_certificate);
        assert_ne!(after.etcd_peer_certificates, before.etcd_peer_certificates);
    }

    /// Story: A failed pass leaves the old bundle for the next pass to repair
    #[test]
    fn story_failed_issue_leaves_profile_untouched() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(1);
        set_default_certs(&mut spec, &ctx).unwrap();
        spec.certificate_profile.ca_private_key.clear();
        let before = spec.certificate_profile.clone();

        if let Some(master) = spec.master_profile.as_mut() {
            master.subject_alt_names = vec!["badé".to_string()];
        }
        assert!(matches!(
            set_default_certs(&mut spec, &ctx),
            Err(PkiError::CertificateGenerationFailed(_))
        ));
        assert_eq!(spec.certificate_profile, before);

        if let Some(master) = spec.master_profile.as_mut() {
            master.subject_alt_names.clear();
        }
        assert!(set_default_certs(&mut spec, &ctx).unwrap());

        let after = &spec.certificate_profile;
        assert_ne!(after.ca_certificate, before.ca_certificate);
        assert_ne!(after.apiserver_certificate, before.apiserver_certificate);
        assert_ne!(after.client_certificate, before.client_certificate);
        assert_ne!(after.etcd_server_certificate, before.etcd_server_certificate);
    }

    #[test]
    fn hosted_and_non_kubernetes_clusters_are_skipped() {
        let ctx = ResolutionContext::default();

        let mut hosted = spec(1);
        hosted.master_profile = None;
        assert!(!set_default_certs(&mut hosted, &ctx).unwrap());
        assert!(!hosted.certificate_profile.has_ca());

        let mut swarm = spec(1);
        swarm.orchestrator_profile.orchestrator_type = crate::model::OrchestratorType::Swarm;
        assert!(!set_default_certs(&mut swarm, &ctx).unwrap());
    }

    #[test]
    fn user_sans_are_added_once() {
        let ctx = ResolutionContext::default();
        let mut spec = spec(1);
        if let Some(master) = spec.master_profile.as_mut() {
            master.subject_alt_names = vec!["api.example.com".to_string(), "kubernetes".to_string()];
        }
        set_default_certs(&mut spec, &ctx).unwrap();

        let info =
            CertificateInfo::from_pem(&spec.certificate_profile.apiserver_certificate).unwrap();
        assert!(info.dns_names.contains(&"api.example.com".to_string()));
        assert_eq!(info.dns_names.iter().filter(|n| *n == "kubernetes").count(), 1);
    }
}
