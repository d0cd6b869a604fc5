//! Add-on resolution against the built-in catalog
//!
//! The catalog names every add-on the system knows how to deploy, with an
//! enablement rule, default containers and default config. Resolution makes
//! sure each catalog add-on appears exactly once, then fills the blanks of
//! enabled add-ons from their catalog entry. User add-ons unknown to the
//! catalog pass through untouched.

mod catalog;

pub use catalog::builtin_catalog;

use tracing::debug;

use crate::model::{Addon, AddonContainer};

/// Catalog add-on names
pub mod names {
    /// Package manager server
    pub const TILLER: &str = "tiller";
    /// Serverless container connector
    pub const ACI_CONNECTOR: &str = "aci-connector";
    /// Node-count autoscaler
    pub const CLUSTER_AUTOSCALER: &str = "cluster-autoscaler";
    /// Blob storage flex-volume driver
    pub const BLOBFUSE_FLEXVOLUME: &str = "blobfuse-flexvolume";
    /// SMB flex-volume driver
    pub const SMB_FLEXVOLUME: &str = "smb-flexvolume";
    /// Key vault flex-volume driver
    pub const KEYVAULT_FLEXVOLUME: &str = "keyvault-flexvolume";
    /// Web dashboard
    pub const DASHBOARD: &str = "kubernetes-dashboard";
    /// Critical pod rescheduler
    pub const RESCHEDULER: &str = "rescheduler";
    /// Resource metrics API
    pub const METRICS_SERVER: &str = "metrics-server";
    /// GPU device plugin
    pub const NVIDIA_DEVICE_PLUGIN: &str = "nvidia-device-plugin";
    /// Monitoring agent
    pub const CONTAINER_MONITORING: &str = "container-monitoring";
    /// IP masquerade agent
    pub const IP_MASQ_AGENT: &str = "ip-masq-agent";
    /// CNI network monitor
    pub const AZURE_CNI_NETWORK_MONITOR: &str = "azure-cni-networkmonitor";
    /// Network policy enforcer
    pub const AZURE_NETWORK_POLICY: &str = "azure-npm-daemonset";
    /// Proportional DNS autoscaler
    pub const DNS_AUTOSCALER: &str = "dns-autoscaler";
}

/// Merge the user's add-ons with the catalog
///
/// With `is_update` set, enabled add-ons take the catalog image even over a
/// custom one so that images move forward on upgrade and scale.
pub fn resolve(mut addons: Vec<Addon>, catalog: &[Addon], is_update: bool) -> Vec<Addon> {
    for default in catalog {
        let default_enabled = default.is_enabled(false);
        match addons.iter().position(|a| a.name == default.name) {
            None => {
                debug!(addon = %default.name, enabled = default_enabled, "Adding catalog add-on");
                addons.push(default.clone());
            }
            Some(index) => {
                let addon = &mut addons[index];
                if addon.is_enabled(default_enabled) {
                    assign_defaults(addon, default, is_update);
                }
            }
        }
    }
    addons
}

fn assign_defaults(addon: &mut Addon, default: &Addon, is_update: bool) {
    if addon.enabled.is_none() {
        addon.enabled = default.enabled;
    }

    for container in &default.containers {
        match addon.container_index(&container.name) {
            None => addon.containers.push(container.clone()),
            Some(index) => merge_container(&mut addon.containers[index], container, is_update),
        }
    }

    for (key, value) in &default.config {
        let entry = addon.config.entry(key.clone()).or_default();
        if entry.is_empty() {
            entry.clone_from(value);
        }
    }
}

fn fill(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

fn merge_container(container: &mut AddonContainer, default: &AddonContainer, is_update: bool) {
    if is_update {
        container.image.clone_from(&default.image);
    } else {
        fill(&mut container.image, &default.image);
    }
    fill(&mut container.cpu_requests, &default.cpu_requests);
    fill(&mut container.memory_requests, &default.memory_requests);
    fill(&mut container.cpu_limits, &default.cpu_limits);
    fill(&mut container.memory_limits, &default.memory_limits);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Addon> {
        vec![
            Addon::new(names::TILLER, Some(true))
                .with_container(
                    AddonContainer::new("tiller", "gcr.io/kubernetes-helm/tiller:v2.8.1")
                        .with_resources("50m", "150Mi", "50m", "150Mi"),
                )
                .with_config("max-history", "0"),
            Addon::new(names::RESCHEDULER, Some(false)).with_container(
                AddonContainer::new("rescheduler", "k8s.gcr.io/rescheduler:v0.3.1")
                    .with_resources("10m", "100Mi", "10m", "100Mi"),
            ),
        ]
    }

    fn find<'a>(addons: &'a [Addon], name: &str) -> &'a Addon {
        addons
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("missing add-on {name}"))
    }

    // ==========================================================================
    // Story Tests: Catalog Resolution
    // ==========================================================================

    /// Story: A cluster with no add-ons gets the whole catalog
    #[test]
    fn story_empty_list_adopts_catalog() {
        let resolved = resolve(Vec::new(), &catalog(), false);
        assert_eq!(resolved, catalog());
    }

    /// Story: Every catalog add-on appears exactly once
    #[test]
    fn story_each_catalog_name_once() {
        let user = vec![Addon::new(names::TILLER, None), Addon::new("custom", Some(true))];
        let resolved = resolve(user, &catalog(), false);
        for default in catalog() {
            assert_eq!(resolved.iter().filter(|a| a.name == default.name).count(), 1);
        }
        assert_eq!(find(&resolved, "custom"), &Addon::new("custom", Some(true)));
    }

    /// Story: An operator tunes one resource and keeps the rest default
    #[test]
    fn story_partial_container_is_filled() {
        let user = vec![Addon::new(names::TILLER, Some(true)).with_container(AddonContainer {
            name: "tiller".to_string(),
            cpu_limits: "200m".to_string(),
            ..Default::default()
        })];
        let resolved = resolve(user, &catalog(), false);
        let tiller = &find(&resolved, names::TILLER).containers[0];
        assert_eq!(tiller.cpu_limits, "200m");
        assert_eq!(tiller.cpu_requests, "50m");
        assert_eq!(tiller.image, "gcr.io/kubernetes-helm/tiller:v2.8.1");
    }

    /// Story: Disabling an add-on leaves it alone
    #[test]
    fn story_disabled_addon_untouched() {
        let user = vec![Addon::new(names::TILLER, Some(false))];
        let resolved = resolve(user, &catalog(), true);
        assert_eq!(find(&resolved, names::TILLER), &Addon::new(names::TILLER, Some(false)));
    }

    /// Story: Unset enablement defers to the catalog
    #[test]
    fn story_unset_enablement_uses_catalog_default() {
        let user = vec![
            Addon::new(names::TILLER, None),
            Addon::new(names::RESCHEDULER, None),
        ];
        let resolved = resolve(user, &catalog(), false);

        let tiller = find(&resolved, names::TILLER);
        assert_eq!(tiller.enabled, Some(true));
        assert_eq!(tiller.containers.len(), 1);
        assert_eq!(tiller.config["max-history"], "0");

        let rescheduler = find(&resolved, names::RESCHEDULER);
        assert_eq!(rescheduler, &Addon::new(names::RESCHEDULER, None));
    }

    /// Story: Upgrades move a pinned image forward
    #[test]
    fn story_update_forces_catalog_image() {
        let pinned = || {
            vec![Addon::new(names::TILLER, Some(true)).with_container(AddonContainer::new(
                "tiller",
                "myregistry/tiller:custom",
            ))]
        };

        let created = resolve(pinned(), &catalog(), false);
        assert_eq!(
            find(&created, names::TILLER).containers[0].image,
            "myregistry/tiller:custom"
        );

        let updated = resolve(pinned(), &catalog(), true);
        assert_eq!(
            find(&updated, names::TILLER).containers[0].image,
            "gcr.io/kubernetes-helm/tiller:v2.8.1"
        );
    }

    #[test]
    fn empty_config_values_are_filled() {
        let user = vec![Addon::new(names::TILLER, Some(true))
            .with_config("max-history", "")
            .with_config("extra", "kept")];
        let resolved = resolve(user, &catalog(), false);
        let tiller = find(&resolved, names::TILLER);
        assert_eq!(tiller.config["max-history"], "0");
        assert_eq!(tiller.config["extra"], "kept");
    }

    #[test]
    fn resolution_is_idempotent() {
        let user = vec![Addon::new(names::TILLER, None)];
        let once = resolve(user, &catalog(), false);
        let twice = resolve(once.clone(), &catalog(), true);
        assert_eq!(once, twice);
    }
}
