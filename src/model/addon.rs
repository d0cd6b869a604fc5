//! Add-on declarations

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An optional in-cluster service deployed alongside the control plane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    /// Unique add-on name
    pub name: String,

    /// Explicit enablement; `None` means "use the catalog default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Container resource specs, matched by container name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<AddonContainer>,

    /// Free-form add-on settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

impl Addon {
    /// Create an add-on with only a name and an explicit enablement
    pub fn new(name: impl Into<String>, enabled: Option<bool>) -> Self {
        Self {
            name: name.into(),
            enabled,
            ..Default::default()
        }
    }

    /// Effective enablement, falling back to `default` when unset
    pub fn is_enabled(&self, default: bool) -> bool {
        self.enabled.unwrap_or(default)
    }

    /// Position of the container with the given name
    pub fn container_index(&self, name: &str) -> Option<usize> {
        self.containers.iter().position(|c| c.name == name)
    }

    /// Add a container and return self for chaining
    pub fn with_container(mut self, container: AddonContainer) -> Self {
        self.containers.push(container);
        self
    }

    /// Add a config entry and return self for chaining
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Image and resource settings for one add-on container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonContainer {
    /// Container name
    pub name: String,
    /// Full image reference
    #[serde(default)]
    pub image: String,
    /// CPU request (e.g. "50m")
    #[serde(default, rename = "cpuRequests")]
    pub cpu_requests: String,
    /// Memory request (e.g. "150Mi")
    #[serde(default)]
    pub memory_requests: String,
    /// CPU limit
    #[serde(default, rename = "cpuLimits")]
    pub cpu_limits: String,
    /// Memory limit
    #[serde(default)]
    pub memory_limits: String,
}

impl AddonContainer {
    /// Container with a name and image and no resource settings
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set requests and limits (cpu request, memory request, cpu limit, memory limit)
    pub fn with_resources(
        mut self,
        cpu_requests: &str,
        memory_requests: &str,
        cpu_limits: &str,
        memory_limits: &str,
    ) -> Self {
        self.cpu_requests = cpu_requests.to_string();
        self.memory_requests = memory_requests.to_string();
        self.cpu_limits = cpu_limits.to_string();
        self.memory_limits = memory_limits.to_string();
        self
    }
}
