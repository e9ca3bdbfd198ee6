use serde::{Deserialize, Serialize};

/// Tenant account as listed by `GET /admin/users`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub vm_count: u32,
    #[serde(default)]
    pub total_billing: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Identity returned by `GET /auth/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub id: Option<u64>,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}
