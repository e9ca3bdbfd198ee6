use reqwest::Method;
use serde::Deserialize;

use super::client::{path_segment, FleetClient};
use super::error::{ApiError, ApiResult};
use crate::models::{DeployRequest, Instance, InstanceMetrics};

/// Result of `POST /vms/{name}/test-ssh`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SshProbe {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn load_instances(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<Instance>> {
    client.send_json(Method::GET, "/vms", token, None).await
}

pub async fn load_metrics(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<InstanceMetrics>> {
    client.send_json(Method::GET, "/metrics", token, None).await
}

pub async fn deploy_instance(
    client: &FleetClient,
    token: Option<&str>,
    request: &DeployRequest,
) -> ApiResult<()> {
    let body = serde_json::to_value(request).map_err(|e| ApiError::Decode(e.to_string()))?;
    client.send_command(Method::POST, "/vms", token, Some(&body)).await
}

/// Runs a power action (`start` or `stop`) against a VM by technical name.
pub async fn power_action(
    client: &FleetClient,
    token: Option<&str>,
    technical_name: &str,
    action: &str,
) -> ApiResult<()> {
    let endpoint = format!("/vms/{}/{}", path_segment(technical_name), action);
    client.send_command(Method::POST, &endpoint, token, None).await
}

pub async fn delete_instance(
    client: &FleetClient,
    token: Option<&str>,
    technical_name: &str,
) -> ApiResult<()> {
    let endpoint = format!("/vms/{}", path_segment(technical_name));
    client.send_command(Method::DELETE, &endpoint, token, None).await
}

pub async fn test_ssh(
    client: &FleetClient,
    token: Option<&str>,
    technical_name: &str,
) -> ApiResult<SshProbe> {
    let endpoint = format!("/vms/{}/test-ssh", path_segment(technical_name));
    client.send_json(Method::POST, &endpoint, token, None).await
}
