//! Resolution context: the lookup tables every resolver reads
//!
//! Version tables, version gates, per-flag support ranges, per-cloud
//! endpoints and per-release component images are plain data. The host
//! builds one [`ResolutionContext`] (usually [`ResolutionContext::default`],
//! or loaded from JSON) and passes it by reference through a resolution
//! pass. Tests substitute their own tables the same way.

mod cloud;
mod versions;

pub use cloud::{
    azure_public_cloud, default_cloud_environments, CloudEnvironment, ComponentImageTable,
    ComponentImages,
};
pub use versions::{
    default_flag_support, is_version_gte, parse_version, FlagSupport, VersionGates, VersionTable,
};

use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::components::Component;
use crate::{Error, Result};

static FALLBACK_CLOUD: LazyLock<CloudEnvironment> = LazyLock::new(azure_public_cloud);

/// Lookup tables for one resolution pass
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionContext {
    /// Supported and default orchestrator versions
    #[serde(default)]
    pub versions: VersionTable,
    /// Version boundaries for defaulting behavior
    #[serde(default)]
    pub gates: VersionGates,
    /// Version ranges of component flags
    #[serde(default = "default_flag_support")]
    pub flag_support: Vec<FlagSupport>,
    /// Cloud environments; the first is used for unknown regions
    #[serde(default = "default_cloud_environments")]
    pub clouds: Vec<CloudEnvironment>,
    /// Component images per release
    #[serde(default)]
    pub images: ComponentImageTable,
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self {
            versions: VersionTable::default(),
            gates: VersionGates::default(),
            flag_support: default_flag_support(),
            clouds: default_cloud_environments(),
            images: ComponentImageTable::default(),
        }
    }
}

impl ResolutionContext {
    /// Parse a context from JSON; omitted sections take built-in values
    pub fn from_json_str(json: &str) -> Result<Self> {
        let context: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid resolution context: {e}")))?;
        context.check()?;
        Ok(context)
    }

    /// Load a context from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::config_at(path.display().to_string(), e.to_string()))?;
        Self::from_json_str(&json).map_err(|e| match e {
            Error::Config { message, .. } => Error::config_at(path.display().to_string(), message),
            other => other,
        })
    }

    fn check(&self) -> Result<()> {
        if self.clouds.is_empty() {
            return Err(Error::config("at least one cloud environment is required"));
        }
        if self.images.is_empty() {
            return Err(Error::config("component image table is empty"));
        }
        if self.versions.default_version.is_empty() {
            return Err(Error::config("default orchestrator version is empty"));
        }
        Ok(())
    }

    /// Cloud environment serving the region, or the first one
    ///
    /// Falls back to the built-in public cloud when `clouds` is empty.
    pub fn cloud_for_location(&self, location: &str) -> &CloudEnvironment {
        self.clouds
            .iter()
            .find(|c| c.serves(location))
            .or_else(|| self.clouds.first())
            .unwrap_or_else(|| &*FALLBACK_CLOUD)
    }

    /// Public master FQDNs for every known region
    pub fn master_fqdns(&self, dns_prefix: &str) -> Vec<String> {
        self.clouds
            .iter()
            .flat_map(|cloud| {
                cloud
                    .locations
                    .iter()
                    .map(move |location| cloud.master_fqdn(dns_prefix, location))
            })
            .collect()
    }

    /// Remove flags the component does not accept at `version`
    pub fn remove_unsupported_flags(
        &self,
        component: Component,
        config: &mut crate::model::ComponentConfig,
        version: &str,
    ) {
        for rule in self.flag_support.iter().filter(|r| r.component == component) {
            if !rule.supports(version) {
                config.remove(&rule.flag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn unknown_location_uses_first_cloud() {
        let ctx = ResolutionContext::default();
        assert_eq!(ctx.cloud_for_location("mars").name, "AzurePublicCloud");
        assert_eq!(ctx.cloud_for_location("chinanorth").name, "AzureChinaCloud");
        assert_eq!(
            ctx.cloud_for_location("usgovvirginia").name,
            "AzureUSGovernmentCloud"
        );
    }

    #[test]
    fn empty_cloud_list_falls_back_to_public_cloud() {
        let ctx = ResolutionContext {
            clouds: Vec::new(),
            ..Default::default()
        };
        let cloud = ctx.cloud_for_location("westus2");
        assert_eq!(cloud.name, "AzurePublicCloud");
        assert_eq!(cloud.fqdn_suffix, "cloudapp.azure.com");
    }

    #[test]
    fn master_fqdns_cover_every_region() {
        let ctx = ResolutionContext::default();
        let fqdns = ctx.master_fqdns("demo");
        let regions: usize = ctx.clouds.iter().map(|c| c.locations.len()).sum();
        assert_eq!(fqdns.len(), regions);
        assert!(fqdns.contains(&"demo.westeurope.cloudapp.azure.com".to_string()));
        assert!(fqdns.contains(&"demo.germanycentral.cloudapp.microsoftazure.de".to_string()));
    }

    #[test]
    fn flag_removal_uses_table() {
        let ctx = ResolutionContext::default();
        let mut config = crate::model::ComponentConfig::new();
        config.insert("--pod-max-pids".into(), "100".into());
        config.insert("--cadvisor-port".into(), "0".into());
        config.insert("--max-pods".into(), "30".into());

        let mut old = config.clone();
        ctx.remove_unsupported_flags(Component::Kubelet, &mut old, "1.9.11");
        assert!(!old.contains_key("--pod-max-pids"));
        assert!(old.contains_key("--cadvisor-port"));

        let mut new = config.clone();
        ctx.remove_unsupported_flags(Component::Kubelet, &mut new, "1.12.2");
        assert!(new.contains_key("--pod-max-pids"));
        assert!(!new.contains_key("--cadvisor-port"));
        assert!(new.contains_key("--max-pods"));
    }

    #[test]
    fn flag_removal_ignores_other_components() {
        let ctx = ResolutionContext::default();
        let mut config = crate::model::ComponentConfig::new();
        config.insert("--pod-max-pids".into(), "100".into());
        ctx.remove_unsupported_flags(Component::ApiServer, &mut config, "1.8.0");
        assert!(config.contains_key("--pod-max-pids"));
    }

    mod loading {
        use super::*;

        #[test]
        fn partial_json_keeps_builtin_sections() {
            let ctx = ResolutionContext::from_json_str(
                r#"{"gates": {"metricsServer": "1.11.0"}}"#,
            )
            .unwrap();
            assert_eq!(ctx.gates.metrics_server, "1.11.0");
            assert_eq!(ctx.gates.aggregated_apis, "1.9.0");
            assert_eq!(ctx.versions, VersionTable::default());
            assert_eq!(ctx.flag_support, default_flag_support());
        }

        #[test]
        fn custom_flag_table_round_trips() {
            let json = r#"{"flagSupport": [
                {"component": "kubelet", "flag": "--foo", "minVersion": "1.10.0", "maxVersion": "1.12.0"}
            ]}"#;
            let ctx = ResolutionContext::from_json_str(json).unwrap();
            assert_eq!(ctx.flag_support.len(), 1);
            assert!(ctx.flag_support[0].supports("1.11.0"));
            assert!(!ctx.flag_support[0].supports("1.12.0"));
        }

        #[test]
        fn empty_clouds_rejected() {
            let err = ResolutionContext::from_json_str(r#"{"clouds": []}"#).unwrap_err();
            assert!(err.to_string().contains("cloud environment"));
        }

        #[test]
        fn malformed_json_is_config_error() {
            let err = ResolutionContext::from_json_str("{").unwrap_err();
            assert!(matches!(err, Error::Config { .. }));
        }

        #[test]
        fn from_file_reads_json() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, r#"{{"gates": {{"scaleSetFloor": "1.12.0"}}}}"#).unwrap();
            let ctx = ResolutionContext::from_file(file.path()).unwrap();
            assert_eq!(ctx.gates.scale_set_floor, "1.12.0");
        }

        #[test]
        fn from_file_reports_path() {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, "not json").unwrap();
            let err = ResolutionContext::from_file(file.path()).unwrap_err();
            match err {
                Error::Config { source_path, .. } => assert!(source_path.is_some()),
                other => panic!("Expected Config error, got {other:?}"),
            }
        }

        #[test]
        fn missing_file_is_config_error() {
            let err = ResolutionContext::from_file("/nonexistent/context.json").unwrap_err();
            assert!(matches!(err, Error::Config { .. }));
        }
    }
}
