use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::client::FleetClient;
use super::error::{ApiError, ApiResult};
use crate::models::{CurrentUser, NewUserForm, UserAccount};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub username: String,
}

/// Exchanges credentials for a token. The only call sent without one.
pub async fn login(client: &FleetClient, username: &str, password: &str) -> ApiResult<LoginResponse> {
    let body = json!({ "username": username, "password": password });
    client
        .send_json(Method::POST, "/auth/login", None, Some(&body))
        .await
}

pub async fn current_user(client: &FleetClient, token: Option<&str>) -> ApiResult<CurrentUser> {
    client.send_json(Method::GET, "/auth/me", token, None).await
}

pub async fn load_users(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<UserAccount>> {
    client.send_json(Method::GET, "/admin/users", token, None).await
}

pub async fn create_user(client: &FleetClient, token: Option<&str>, form: &NewUserForm) -> ApiResult<()> {
    let body = serde_json::to_value(form).map_err(|e| ApiError::Decode(e.to_string()))?;
    client
        .send_command(Method::POST, "/admin/users", token, Some(&body))
        .await
}

pub async fn delete_user(client: &FleetClient, token: Option<&str>, user_id: u64) -> ApiResult<()> {
    let endpoint = format!("/admin/users/{}", user_id);
    client.send_command(Method::DELETE, &endpoint, token, None).await
}

pub async fn reset_password(
    client: &FleetClient,
    token: Option<&str>,
    user_id: u64,
    password: &str,
) -> ApiResult<()> {
    let endpoint = format!("/admin/users/{}/reset-password", user_id);
    let body = json!({ "password": password });
    client
        .send_command(Method::POST, &endpoint, token, Some(&body))
        .await
}
