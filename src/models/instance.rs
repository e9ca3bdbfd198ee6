use serde::{Deserialize, Serialize};

/// Lifecycle state reported by the API for a VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Creating,
    Running,
    Stopped,
    Error,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(raw: String) -> Self {
        match raw.to_lowercase().as_str() {
            "creating" => Self::Creating,
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            _ => Self::Error,
        }
    }
}

impl From<InstanceStatus> for String {
    fn from(status: InstanceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One VM as listed by `GET /vms`.
///
/// `technical_name` is the only value ever placed in an API path; the display
/// name is for presentation and may be duplicated across rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "name")]
    pub technical_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub flavor: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub host_id: Option<String>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub vcpu: u32,
    #[serde(default)]
    pub ram_mb: u64,
}

impl Instance {
    pub fn label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.technical_name,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    /// Admin deployments with explicit resources carry this pseudo-flavor.
    pub fn is_custom_sized(&self) -> bool {
        self.flavor == "admin-custom"
    }
}
