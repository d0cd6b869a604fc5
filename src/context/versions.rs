//! Orchestrator version tables and version-gated behavior

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::components::Component;

/// Parse a version string, ignoring surrounding whitespace and a leading `v`
pub fn parse_version(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches('v')).ok()
}

/// Returns true if `version` is at least `min`
///
/// Unparsable input on either side compares as false so that gated
/// behavior stays off for malformed versions.
pub fn is_version_gte(version: &str, min: &str) -> bool {
    match (parse_version(version), parse_version(min)) {
        (Some(v), Some(m)) => v >= m,
        _ => false,
    }
}

/// Parse a bare `major.minor` release string
fn parse_release(release: &str) -> Option<(u64, u64)> {
    let (major, minor) = release.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Supported orchestrator versions
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionTable {
    /// Versions accepted for new clusters
    pub supported: Vec<String>,
    /// Versions still accepted when updating or scaling an existing cluster
    #[serde(default)]
    pub deprecated: Vec<String>,
    /// Versions that support Windows agent pools
    #[serde(default)]
    pub windows_supported: Vec<String>,
    /// Default version for Linux-only clusters
    pub default_version: String,
    /// Default version for clusters with Windows pools
    pub default_windows_version: String,
}

impl Default for VersionTable {
    fn default() -> Self {
        let to_vec = |versions: &[&str]| versions.iter().map(|v| v.to_string()).collect();
        Self {
            supported: to_vec(&[
                "1.8.14", "1.8.15", "1.9.10", "1.9.11", "1.10.8", "1.10.9", "1.11.4", "1.11.5",
                "1.12.1", "1.12.2",
            ]),
            deprecated: to_vec(&["1.6.9", "1.7.15", "1.7.16", "1.8.13", "1.9.9", "1.10.7"]),
            windows_supported: to_vec(&["1.9.10", "1.9.11", "1.10.8", "1.10.9", "1.11.4", "1.11.5"]),
            default_version: "1.10.9".to_string(),
            default_windows_version: "1.10.9".to_string(),
        }
    }
}

impl VersionTable {
    fn allowed(&self, is_update_or_scale: bool, has_windows: bool) -> Vec<&str> {
        let mut allowed: Vec<&str> = self.supported.iter().map(String::as_str).collect();
        if is_update_or_scale {
            allowed.extend(self.deprecated.iter().map(String::as_str));
        }
        if has_windows {
            allowed.retain(|v| self.windows_supported.iter().any(|w| w == v));
        }
        allowed
    }

    /// Normalize a requested version to a valid patch version
    ///
    /// An exact allowed version is kept, a bare `major.minor` release maps to
    /// its newest allowed patch, and anything else falls back to the default.
    pub fn valid_patch_version(
        &self,
        requested: &str,
        is_update_or_scale: bool,
        has_windows: bool,
    ) -> String {
        let default = if has_windows {
            &self.default_windows_version
        } else {
            &self.default_version
        };
        let requested = requested.trim().trim_start_matches('v');
        if requested.is_empty() {
            return default.clone();
        }

        let allowed = self.allowed(is_update_or_scale, has_windows);
        if allowed.contains(&requested) {
            return requested.to_string();
        }

        if let Some((major, minor)) = parse_release(requested) {
            let newest = allowed
                .iter()
                .filter_map(|v| parse_version(v))
                .filter(|v| v.major == major && v.minor == minor && v.pre.is_empty())
                .max();
            if let Some(newest) = newest {
                return newest.to_string();
            }
        }

        info!(
            requested = %requested,
            default = %default,
            "Requested orchestrator version is not supported, using default"
        );
        default.clone()
    }
}

/// Version boundaries that switch defaulting behavior on
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionGates {
    /// RBAC clusters enable aggregated APIs from this version
    pub aggregated_apis: String,
    /// The metrics server add-on is on by default from this version
    pub metrics_server: String,
    /// The GPU device plugin add-on may be enabled from this version
    pub nvidia_device_plugin: String,
    /// Device plugins are native from this version; no Accelerators gate
    pub native_device_plugins: String,
    /// Lower bound for the Accelerators kubelet gate
    pub accelerators_gate: String,
    /// Flex-volume driver add-ons are on by default from this version
    pub flex_volume_drivers: String,
    /// Scale sets are downgraded to availability sets below this version
    pub scale_set_floor: String,
    /// `--enable-admission-plugins` replaces `--admission-control` here
    pub admission_plugins_flag: String,
    /// Admission webhooks join the default plugin list here
    pub admission_webhooks: String,
    /// The API server audit policy file is wired from this version
    pub audit_policy: String,
    /// Controller-manager ServiceNodeExclusion gate floor
    pub service_node_exclusion: String,
    /// Pod security policy config is managed from this version
    pub pod_security_policy: String,
}

impl Default for VersionGates {
    fn default() -> Self {
        Self {
            aggregated_apis: "1.9.0".to_string(),
            metrics_server: "1.9.0".to_string(),
            nvidia_device_plugin: "1.10.0".to_string(),
            native_device_plugins: "1.11.0".to_string(),
            accelerators_gate: "1.6.0".to_string(),
            flex_volume_drivers: "1.8.0".to_string(),
            scale_set_floor: "1.10.0".to_string(),
            admission_plugins_flag: "1.10.0".to_string(),
            admission_webhooks: "1.9.0".to_string(),
            audit_policy: "1.8.0".to_string(),
            service_node_exclusion: "1.9.0".to_string(),
            pod_security_policy: "1.8.0".to_string(),
        }
    }
}

/// Version range in which a component flag is accepted
///
/// `min_version` is inclusive and `max_version` exclusive; a missing bound
/// is open.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlagSupport {
    /// Component that owns the flag
    pub component: Component,
    /// Flag name including leading dashes
    pub flag: String,
    /// First version accepting the flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    /// First version rejecting the flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<String>,
}

impl FlagSupport {
    /// Flag accepted from `min` onwards
    pub fn since(component: Component, flag: &str, min: &str) -> Self {
        Self {
            component,
            flag: flag.to_string(),
            min_version: Some(min.to_string()),
            max_version: None,
        }
    }

    /// Flag accepted only before `max`
    pub fn until(component: Component, flag: &str, max: &str) -> Self {
        Self {
            component,
            flag: flag.to_string(),
            min_version: None,
            max_version: Some(max.to_string()),
        }
    }

    /// Returns true if `version` accepts the flag
    pub fn supports(&self, version: &str) -> bool {
        let above_min = self
            .min_version
            .as_deref()
            .is_none_or(|min| is_version_gte(version, min));
        let below_max = self
            .max_version
            .as_deref()
            .is_none_or(|max| !is_version_gte(version, max));
        above_min && below_max
    }
}

/// Built-in flag support table
pub fn default_flag_support() -> Vec<FlagSupport> {
    vec![
        FlagSupport::since(Component::Kubelet, "--pod-max-pids", "1.10.0"),
        FlagSupport::until(Component::Kubelet, "--cadvisor-port", "1.12.0"),
        FlagSupport::until(Component::ApiServer, "--repair-malformed-updates", "1.14.0"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.10.0", "1.10.0", true)]
    #[case("1.10.8", "1.9.0", true)]
    #[case("v1.11.0", "1.11.0", true)]
    #[case("1.8.15", "1.9.0", false)]
    #[case("not-a-version", "1.9.0", false)]
    #[case("1.9.0", "", false)]
    fn version_comparison(#[case] version: &str, #[case] min: &str, #[case] expected: bool) {
        assert_eq!(is_version_gte(version, min), expected);
    }

    mod valid_patch_version {
        use super::*;

        #[test]
        fn empty_version_selects_default() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("", false, false), "1.10.9");
        }

        #[test]
        fn exact_supported_version_is_kept() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("1.9.10", false, false), "1.9.10");
            assert_eq!(table.valid_patch_version("v1.12.2", false, false), "1.12.2");
        }

        #[test]
        fn release_resolves_to_newest_patch() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("1.11", false, false), "1.11.5");
        }

        #[test]
        fn deprecated_versions_only_survive_updates() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("1.7.16", false, false), "1.10.9");
            assert_eq!(table.valid_patch_version("1.7.16", true, false), "1.7.16");
            assert_eq!(table.valid_patch_version("1.7", true, false), "1.7.16");
        }

        #[test]
        fn windows_restricts_to_windows_versions() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("1.12.2", false, true), "1.10.9");
            assert_eq!(table.valid_patch_version("1.11", false, true), "1.11.5");
            assert_eq!(table.valid_patch_version("1.8.15", false, true), "1.10.9");
        }

        #[test]
        fn unknown_version_falls_back_to_default() {
            let table = VersionTable::default();
            assert_eq!(table.valid_patch_version("2.0.0", false, false), "1.10.9");
            assert_eq!(table.valid_patch_version("garbage", false, false), "1.10.9");
        }
    }

    mod flag_support {
        use super::*;

        #[test]
        fn closed_range_accepts_only_inside() {
            let flag = FlagSupport {
                component: Component::Kubelet,
                flag: "--pod-max-pids".to_string(),
                min_version: Some("1.10.0".to_string()),
                max_version: Some("1.12.0".to_string()),
            };
            assert!(!flag.supports("1.9.11"));
            assert!(flag.supports("1.10.0"));
            assert!(flag.supports("1.11.5"));
            assert!(!flag.supports("1.12.0"));
        }

        #[test]
        fn open_ranges() {
            let since = FlagSupport::since(Component::Kubelet, "--x", "1.10.0");
            assert!(since.supports("1.20.0"));
            assert!(!since.supports("1.8.0"));

            let until = FlagSupport::until(Component::Kubelet, "--y", "1.12.0");
            assert!(until.supports("1.6.0"));
            assert!(!until.supports("1.13.1"));
        }
    }
}
