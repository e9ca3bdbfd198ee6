use reqwest::Method;

use super::client::FleetClient;
use super::error::ApiResult;
use crate::models::{BillingStatement, Flavor, Host, Image};

pub async fn load_flavors(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<Flavor>> {
    client.send_json(Method::GET, "/flavors", token, None).await
}

/// Every configured image, downloaded or not.
pub async fn load_images(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<Image>> {
    client.send_json(Method::GET, "/images", token, None).await
}

/// Images already present on disk and deployable right away.
pub async fn load_available_images(
    client: &FleetClient,
    token: Option<&str>,
) -> ApiResult<Vec<Image>> {
    client.send_json(Method::GET, "/images/available", token, None).await
}

pub async fn load_hosts(client: &FleetClient, token: Option<&str>) -> ApiResult<Vec<Host>> {
    client.send_json(Method::GET, "/hosts/status", token, None).await
}

pub async fn load_billing(client: &FleetClient, token: Option<&str>) -> ApiResult<BillingStatement> {
    client.send_json(Method::GET, "/billing", token, None).await
}
