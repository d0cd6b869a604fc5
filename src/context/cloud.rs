//! Per-cloud endpoint data and per-release component images

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Image registries and endpoint suffixes for one cloud
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudEnvironment {
    /// Cloud name (e.g. "AzurePublicCloud")
    pub name: String,
    /// Regions served by this cloud
    pub locations: Vec<String>,
    /// Suffix of public master FQDNs (`<prefix>.<region>.<suffix>`)
    pub fqdn_suffix: String,
    /// Registry prefix for upstream control plane images
    pub kubernetes_image_base: String,
    /// Registry prefix for the package manager server
    pub tiller_image_base: String,
    /// Registry prefix for the serverless connector
    pub aci_connector_image_base: String,
    /// Registry prefix for GPU images
    pub nvidia_image_base: String,
    /// Registry prefix for cloud CNI images
    pub azure_cni_image_base: String,
    /// Registry prefix for first-party images
    pub mcr_image_base: String,
}

impl CloudEnvironment {
    /// Returns true if the region belongs to this cloud
    pub fn serves(&self, location: &str) -> bool {
        let location = normalize_location(location);
        self.locations.iter().any(|l| normalize_location(l) == location)
    }

    /// Public master FQDN in the given region
    pub fn master_fqdn(&self, dns_prefix: &str, location: &str) -> String {
        format!(
            "{}.{}.{}",
            dns_prefix,
            normalize_location(location),
            self.fqdn_suffix
        )
    }
}

fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn locations(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Public cloud, used for regions no other environment serves
pub fn azure_public_cloud() -> CloudEnvironment {
    CloudEnvironment {
        name: "AzurePublicCloud".to_string(),
        locations: locations(&[
            "australiacentral",
            "australiaeast",
            "australiasoutheast",
            "brazilsouth",
            "canadacentral",
            "canadaeast",
            "centralindia",
            "centralus",
            "eastasia",
            "eastus",
            "eastus2",
            "francecentral",
            "japaneast",
            "japanwest",
            "koreacentral",
            "koreasouth",
            "northcentralus",
            "northeurope",
            "southcentralus",
            "southeastasia",
            "southindia",
            "uksouth",
            "ukwest",
            "westcentralus",
            "westeurope",
            "westindia",
            "westus",
            "westus2",
        ]),
        fqdn_suffix: "cloudapp.azure.com".to_string(),
        kubernetes_image_base: "k8s.gcr.io/".to_string(),
        tiller_image_base: "gcr.io/kubernetes-helm/".to_string(),
        aci_connector_image_base: "microsoft/".to_string(),
        nvidia_image_base: "nvidia/".to_string(),
        azure_cni_image_base: "containernetworking/".to_string(),
        mcr_image_base: "mcr.microsoft.com/".to_string(),
    }
}

/// Built-in cloud environments; the first entry is the fallback
pub fn default_cloud_environments() -> Vec<CloudEnvironment> {
    vec![
        azure_public_cloud(),
        CloudEnvironment {
            name: "AzureChinaCloud".to_string(),
            locations: locations(&["chinaeast", "chinanorth", "chinaeast2", "chinanorth2"]),
            fqdn_suffix: "cloudapp.chinacloudapi.cn".to_string(),
            kubernetes_image_base: "crproxy.trafficmanager.net:6000/google_containers/"
                .to_string(),
            tiller_image_base: "crproxy.trafficmanager.net:6000/kubernetes-helm/".to_string(),
            aci_connector_image_base: "dockerhub.azk8s.cn/microsoft/".to_string(),
            nvidia_image_base: "dockerhub.azk8s.cn/nvidia/".to_string(),
            azure_cni_image_base: "dockerhub.azk8s.cn/containernetworking/".to_string(),
            mcr_image_base: "mcr.azk8s.cn/".to_string(),
        },
        CloudEnvironment {
            name: "AzureGermanCloud".to_string(),
            locations: locations(&["germanycentral", "germanynortheast"]),
            fqdn_suffix: "cloudapp.microsoftazure.de".to_string(),
            kubernetes_image_base: "k8s.gcr.io/".to_string(),
            tiller_image_base: "gcr.io/kubernetes-helm/".to_string(),
            aci_connector_image_base: "microsoft/".to_string(),
            nvidia_image_base: "nvidia/".to_string(),
            azure_cni_image_base: "containernetworking/".to_string(),
            mcr_image_base: "mcr.microsoft.com/".to_string(),
        },
        CloudEnvironment {
            name: "AzureUSGovernmentCloud".to_string(),
            locations: locations(&[
                "usgovvirginia",
                "usgoviowa",
                "usgovarizona",
                "usgovtexas",
                "usdodcentral",
                "usdodeast",
            ]),
            fqdn_suffix: "cloudapp.usgovcloudapi.net".to_string(),
            kubernetes_image_base: "k8s.gcr.io/".to_string(),
            tiller_image_base: "gcr.io/kubernetes-helm/".to_string(),
            aci_connector_image_base: "microsoft/".to_string(),
            nvidia_image_base: "nvidia/".to_string(),
            azure_cni_image_base: "containernetworking/".to_string(),
            mcr_image_base: "mcr.microsoft.com/".to_string(),
        },
    ]
}

/// Image tags (and a few per-release settings) for one minor release
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentImages {
    /// Pod sandbox image
    pub pause: String,
    /// Package manager server
    pub tiller: String,
    /// Web dashboard
    pub dashboard: String,
    /// Critical pod rescheduler
    pub rescheduler: String,
    /// Resource metrics API server
    pub metrics_server: String,
    /// Node-count autoscaler
    pub cluster_autoscaler: String,
    /// IP masquerade agent
    pub ip_masq_agent: String,
    /// Proportional DNS autoscaler
    pub dns_autoscaler: String,
    /// Serverless connector
    pub aci_connector: String,
    /// GPU device plugin
    pub nvidia_device_plugin: String,
    /// CNI network monitor
    pub azure_cni_networkmonitor: String,
    /// kubelet `--node-status-update-frequency`
    pub node_status_update_frequency: String,
}

/// Component images keyed by `major.minor` release
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ComponentImageTable(pub BTreeMap<String, ComponentImages>);

impl ComponentImageTable {
    /// Images for the release of `version`
    ///
    /// Versions without an entry use the newest release in the table.
    pub fn images_for(&self, version: &str) -> ComponentImages {
        let release = super::versions::parse_version(version)
            .map(|v| format!("{}.{}", v.major, v.minor))
            .unwrap_or_default();
        self.0
            .get(&release)
            .or_else(|| {
                self.0
                    .iter()
                    .filter_map(|(k, v)| {
                        super::versions::parse_version(&format!("{k}.0")).map(|parsed| (parsed, v))
                    })
                    .max_by(|a, b| a.0.cmp(&b.0))
                    .map(|(_, v)| v)
            })
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if the table has no releases
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn release_images(
    tiller: &str,
    dashboard: &str,
    metrics_server: &str,
    cluster_autoscaler: &str,
    nvidia_device_plugin: &str,
) -> ComponentImages {
    ComponentImages {
        pause: "pause-amd64:3.1".to_string(),
        tiller: tiller.to_string(),
        dashboard: dashboard.to_string(),
        rescheduler: "rescheduler:v0.3.1".to_string(),
        metrics_server: metrics_server.to_string(),
        cluster_autoscaler: cluster_autoscaler.to_string(),
        ip_masq_agent: "ip-masq-agent-amd64:v2.0.0".to_string(),
        dns_autoscaler: "cluster-proportional-autoscaler-amd64:1.1.1".to_string(),
        aci_connector: "virtual-kubelet:latest".to_string(),
        nvidia_device_plugin: nvidia_device_plugin.to_string(),
        azure_cni_networkmonitor: "networkmonitor:v0.0.4".to_string(),
        node_status_update_frequency: "10s".to_string(),
    }
}

impl Default for ComponentImageTable {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            "1.7".to_string(),
            release_images(
                "tiller:v2.8.1",
                "kubernetes-dashboard-amd64:v1.6.3",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v0.6.0",
                "",
            ),
        );
        table.insert(
            "1.8".to_string(),
            release_images(
                "tiller:v2.8.1",
                "kubernetes-dashboard-amd64:v1.8.3",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v1.0.5",
                "",
            ),
        );
        table.insert(
            "1.9".to_string(),
            release_images(
                "tiller:v2.8.1",
                "kubernetes-dashboard-amd64:v1.8.3",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v1.1.2",
                "",
            ),
        );
        table.insert(
            "1.10".to_string(),
            release_images(
                "tiller:v2.8.1",
                "kubernetes-dashboard-amd64:v1.8.3",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v1.2.2",
                "k8s-device-plugin:1.10",
            ),
        );
        table.insert(
            "1.11".to_string(),
            release_images(
                "tiller:v2.8.1",
                "kubernetes-dashboard-amd64:v1.8.3",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v1.3.3",
                "k8s-device-plugin:1.11",
            ),
        );
        table.insert(
            "1.12".to_string(),
            release_images(
                "tiller:v2.11.0",
                "kubernetes-dashboard-amd64:v1.10.0",
                "metrics-server-amd64:v0.2.1",
                "cluster-autoscaler:v1.12.0",
                "k8s-device-plugin:1.11",
            ),
        );
        Self(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_matching_ignores_case_and_spaces() {
        let clouds = default_cloud_environments();
        assert!(clouds[0].serves("West US 2"));
        assert!(clouds[1].serves("chinaeast2"));
        assert!(!clouds[1].serves("westus2"));
    }

    #[test]
    fn master_fqdn_uses_cloud_suffix() {
        let clouds = default_cloud_environments();
        assert_eq!(
            clouds[0].master_fqdn("demo", "westus2"),
            "demo.westus2.cloudapp.azure.com"
        );
        assert_eq!(
            clouds[1].master_fqdn("demo", "chinaeast"),
            "demo.chinaeast.cloudapp.chinacloudapi.cn"
        );
    }

    #[test]
    fn images_follow_release() {
        let table = ComponentImageTable::default();
        assert_eq!(
            table.images_for("1.12.2").dashboard,
            "kubernetes-dashboard-amd64:v1.10.0"
        );
        assert_eq!(
            table.images_for("1.10.9").cluster_autoscaler,
            "cluster-autoscaler:v1.2.2"
        );
    }

    #[test]
    fn unknown_release_uses_newest_entry() {
        let table = ComponentImageTable::default();
        assert_eq!(table.images_for("1.99.0"), table.images_for("1.12.0"));
        assert_eq!(table.images_for("garbage"), table.images_for("1.12.0"));
    }

    #[test]
    fn empty_table_yields_blank_images() {
        let table = ComponentImageTable(BTreeMap::new());
        assert!(table.is_empty());
        assert_eq!(table.images_for("1.10.0"), ComponentImages::default());
    }
}
