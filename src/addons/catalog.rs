//! Built-in add-on catalog

use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{network_policy, Addon, AddonContainer, ClusterSpecification, NetworkPlugin};

use super::names;

/// Catalog entries for the cluster's version, cloud and topology
///
/// Every entry carries an explicit enablement computed from the cluster.
pub fn builtin_catalog(spec: &ClusterSpecification, ctx: &ResolutionContext) -> Vec<Addon> {
    let version = spec.orchestrator_profile.orchestrator_version.as_str();
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    let cloud = ctx.cloud_for_location(&spec.location);
    let images = ctx.images.images_for(version);
    let k8s_base = if k8s.kubernetes_image_base.is_empty() {
        cloud.kubernetes_image_base.as_str()
    } else {
        k8s.kubernetes_image_base.as_str()
    };
    let flex_volumes = is_version_gte(version, &ctx.gates.flex_volume_drivers);

    vec![
        Addon::new(names::TILLER, Some(true))
            .with_container(
                AddonContainer::new("tiller", format!("{}{}", cloud.tiller_image_base, images.tiller))
                    .with_resources("50m", "150Mi", "50m", "150Mi"),
            )
            .with_config("max-history", "0"),
        Addon::new(names::ACI_CONNECTOR, Some(false))
            .with_container(
                AddonContainer::new(
                    "aci-connector",
                    format!("{}{}", cloud.aci_connector_image_base, images.aci_connector),
                )
                .with_resources("50m", "150Mi", "50m", "150Mi"),
            )
            .with_config("region", "westus")
            .with_config("nodeName", "aci-connector")
            .with_config("os", "Linux")
            .with_config("taint", "azure.com/aci"),
        Addon::new(names::CLUSTER_AUTOSCALER, Some(false))
            .with_container(
                AddonContainer::new(
                    "cluster-autoscaler",
                    format!("{k8s_base}{}", images.cluster_autoscaler),
                )
                .with_resources("100m", "300Mi", "100m", "300Mi"),
            )
            .with_config("minNodes", "1")
            .with_config("maxNodes", "5"),
        Addon::new(names::BLOBFUSE_FLEXVOLUME, Some(flex_volumes)).with_container(
            AddonContainer::new(
                "blobfuse-flexvolume",
                format!("{}k8s/flexvolume/blobfuse-flexvolume", cloud.mcr_image_base),
            )
            .with_resources("50m", "10Mi", "50m", "10Mi"),
        ),
        Addon::new(names::SMB_FLEXVOLUME, Some(flex_volumes)).with_container(
            AddonContainer::new(
                "smb-flexvolume",
                format!("{}k8s/flexvolume/smb-flexvolume", cloud.mcr_image_base),
            )
            .with_resources("50m", "10Mi", "50m", "10Mi"),
        ),
        Addon::new(names::KEYVAULT_FLEXVOLUME, Some(true)).with_container(
            AddonContainer::new(
                "keyvault-flexvolume",
                format!("{}k8s/flexvolume/keyvault-flexvolume:v0.0.5", cloud.mcr_image_base),
            )
            .with_resources("50m", "10Mi", "50m", "10Mi"),
        ),
        Addon::new(names::DASHBOARD, Some(true)).with_container(
            AddonContainer::new(
                "kubernetes-dashboard",
                format!("{k8s_base}{}", images.dashboard),
            )
            .with_resources("300m", "150Mi", "300m", "150Mi"),
        ),
        Addon::new(names::RESCHEDULER, Some(false)).with_container(
            AddonContainer::new("rescheduler", format!("{k8s_base}{}", images.rescheduler))
                .with_resources("10m", "100Mi", "10m", "100Mi"),
        ),
        Addon::new(
            names::METRICS_SERVER,
            Some(is_version_gte(version, &ctx.gates.metrics_server)),
        )
        .with_container(AddonContainer::new(
            "metrics-server",
            format!("{k8s_base}{}", images.metrics_server),
        )),
        Addon::new(
            names::NVIDIA_DEVICE_PLUGIN,
            Some(is_version_gte(version, &ctx.gates.nvidia_device_plugin) && spec.has_n_series_sku()),
        )
        .with_container(
            AddonContainer::new(
                "nvidia-device-plugin",
                format!("{}{}", cloud.nvidia_image_base, images.nvidia_device_plugin),
            )
            .with_resources("50m", "10Mi", "50m", "10Mi"),
        ),
        Addon::new(names::CONTAINER_MONITORING, Some(false))
            .with_container(
                AddonContainer::new(
                    "omsagent",
                    format!("{}oms:ciprod10162018-2", cloud.aci_connector_image_base),
                )
                .with_resources("50m", "200Mi", "150m", "750Mi"),
            )
            .with_config("omsAgentVersion", "1.6.0-42")
            .with_config("dockerProviderVersion", "2.0.0-3"),
        Addon::new(names::IP_MASQ_AGENT, Some(true)).with_container(
            AddonContainer::new("ip-masq-agent", format!("{k8s_base}{}", images.ip_masq_agent))
                .with_resources("50m", "50Mi", "50m", "250Mi"),
        ),
        Addon::new(names::AZURE_CNI_NETWORK_MONITOR, Some(k8s.is_azure_cni())).with_container(
            AddonContainer::new(
                "azure-cni-networkmonitor",
                format!("{}{}", cloud.azure_cni_image_base, images.azure_cni_networkmonitor),
            ),
        ),
        Addon::new(
            names::AZURE_NETWORK_POLICY,
            Some(
                k8s.plugin() == Some(NetworkPlugin::Azure)
                    && k8s.network_policy == network_policy::AZURE,
            ),
        )
        .with_container(AddonContainer::new(
            "azure-npm-daemonset",
            format!("{}azure-npm:v0.0.4", cloud.azure_cni_image_base),
        )),
        Addon::new(names::DNS_AUTOSCALER, Some(false)).with_container(AddonContainer::new(
            "cluster-proportional-autoscaler",
            format!("{k8s_base}{}", images.dns_autoscaler),
        )),
    ]
}
