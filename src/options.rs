//! Controller manager options.
//!
//! Options are read once at startup from a JSON file (camelCase keys, every
//! field optional) and stay immutable for the lifetime of the bootstrap.
//!
//! Example:
//! ```json
//! {
//!   "serviceMeshEnabled": true,
//!   "authentication": { "loginHistoryRetentionPeriod": "168h" },
//!   "multicluster": { "enable": true, "hostClusterName": "host" },
//!   "network": { "enableNetworkPolicy": true, "ipPoolType": "calico" }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the options file
pub const CONFIG_PATH_ENV: &str = "KS_CONTROLLER_MANAGER_CONFIG";

/// Default image used by the cluster-role-binding controller for kubectl pods
pub const DEFAULT_KUBECTL_IMAGE: &str = "kubesphere/kubectl:v1.22.0";

/// Errors raised while loading options
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The options file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The options file is not valid JSON for [`Options`]
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// The options parsed but violate a constraint
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Every option consumed by the controller bootstrap.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Whether the Istio-backed service mesh controllers run
    pub service_mesh_enabled: bool,
    /// Image for the kubectl pods managed per user
    pub kubectl_image: String,
    pub kubernetes: KubernetesOptions,
    pub authentication: AuthenticationOptions,
    pub multicluster: MultiClusterOptions,
    pub network: NetworkOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            service_mesh_enabled: false,
            kubectl_image: DEFAULT_KUBECTL_IMAGE.to_string(),
            kubernetes: KubernetesOptions::default(),
            authentication: AuthenticationOptions::default(),
            multicluster: MultiClusterOptions::default(),
            network: NetworkOptions::default(),
        }
    }
}

/// Options for the informer layer
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesOptions {
    /// Server-side watch timeout. Must stay below the client read timeout.
    pub watch_timeout_secs: u32,
}

impl Default for KubernetesOptions {
    fn default() -> Self {
        Self {
            watch_timeout_secs: 25,
        }
    }
}

/// Login history settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthenticationOptions {
    /// How long login records are kept, e.g. `"168h"`
    pub login_history_retention_period: SignedDuration,
    /// Maximum number of login records kept per user
    pub login_history_maximum_entries: usize,
}

impl Default for AuthenticationOptions {
    fn default() -> Self {
        Self {
            login_history_retention_period: SignedDuration::from_hours(168),
            login_history_maximum_entries: 100,
        }
    }
}

impl AuthenticationOptions {
    pub fn retention_period(&self) -> Duration {
        self.login_history_retention_period.unsigned_abs()
    }
}

/// Multi-cluster (federation) settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiClusterOptions {
    /// Enables federation caches and the multi-cluster controllers
    pub enable: bool,
    pub cluster_controller_resync_period: SignedDuration,
    /// Name of the cluster this controller manager runs in
    pub host_cluster_name: String,
}

impl Default for MultiClusterOptions {
    fn default() -> Self {
        Self {
            enable: false,
            cluster_controller_resync_period: SignedDuration::from_secs(120),
            host_cluster_name: "host".to_string(),
        }
    }
}

impl MultiClusterOptions {
    pub fn resync_period(&self) -> Duration {
        self.cluster_controller_resync_period.unsigned_abs()
    }
}

/// Network settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkOptions {
    pub enable_network_policy: bool,
    /// IP pool backend kind. Only `calico` is recognized; anything else
    /// leaves the IP pool controller off.
    pub ip_pool_type: String,
    pub nsnp_options: NsnpOptions,
    pub calico: CalicoOptions,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            enable_network_policy: false,
            ip_pool_type: IP_POOL_TYPE_NONE.to_string(),
            nsnp_options: NsnpOptions::default(),
            calico: CalicoOptions::default(),
        }
    }
}

/// Namespaced network policy settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NsnpOptions {
    /// Namespaces always allowed to reach workspace namespaces
    pub allowed_ingress_namespaces: Vec<String>,
}

/// Calico IP pool backend settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CalicoOptions {
    /// `Always`, `CrossSubnet` or `Never`
    pub ipip_mode: String,
    /// `Always`, `CrossSubnet` or `Never`
    pub vxlan_mode: String,
    pub nat_outgoing: bool,
}

impl Default for CalicoOptions {
    fn default() -> Self {
        Self {
            ipip_mode: "Always".to_string(),
            vxlan_mode: "Never".to_string(),
            nat_outgoing: true,
        }
    }
}

pub const IP_POOL_TYPE_NONE: &str = "none";
pub const IP_POOL_TYPE_CALICO: &str = "calico";

/// Recognized IP pool backends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpPoolBackend {
    Calico,
}

impl IpPoolBackend {
    /// Parse a backend kind. Unrecognized kinds yield `None`, which means
    /// "no IP pool backend", not an error.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            IP_POOL_TYPE_CALICO => Some(IpPoolBackend::Calico),
            _ => None,
        }
    }
}

impl std::fmt::Display for IpPoolBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpPoolBackend::Calico => write!(f, "{IP_POOL_TYPE_CALICO}"),
        }
    }
}

impl Options {
    /// Load options from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let options = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_json(&raw)?
            }
            None => Self::default(),
        };
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a JSON document. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authentication.login_history_retention_period <= SignedDuration::ZERO {
            return Err(ConfigError::Invalid(
                "loginHistoryRetentionPeriod must be positive".to_string(),
            ));
        }
        if self.authentication.login_history_maximum_entries == 0 {
            return Err(ConfigError::Invalid(
                "loginHistoryMaximumEntries must be at least 1".to_string(),
            ));
        }
        if self.multicluster.enable {
            if self.multicluster.cluster_controller_resync_period <= SignedDuration::ZERO {
                return Err(ConfigError::Invalid(
                    "clusterControllerResyncPeriod must be positive".to_string(),
                ));
            }
            if self.multicluster.host_cluster_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "hostClusterName is required when multicluster is enabled".to_string(),
                ));
            }
        }
        if self.kubernetes.watch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "watchTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
