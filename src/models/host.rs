use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub total: u64,
}

impl ResourceUsage {
    pub fn available(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResources {
    #[serde(default)]
    pub vcpu: ResourceUsage,
    #[serde(default, rename = "ram_mb")]
    pub ram_mb: ResourceUsage,
}

/// Physical KVM host as reported by `GET /hosts/status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    pub status: HostStatus,
    /// Absent when the host is offline.
    #[serde(default)]
    pub resources: Option<HostResources>,
    #[serde(default)]
    pub vms_running: u32,
    #[serde(default)]
    pub vms_total: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl Host {
    pub fn is_online(&self) -> bool {
        self.status == HostStatus::Online
    }
}
