use serde::{Deserialize, Serialize};

/// Live usage sample for a running VM, from `GET /metrics`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetrics {
    /// Technical name of the VM.
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, rename = "cpu")]
    pub cpu_percent: f64,
    #[serde(default, rename = "ram")]
    pub ram_percent: f64,
    #[serde(default, rename = "disk_GB")]
    pub disk_gb: f64,
}
