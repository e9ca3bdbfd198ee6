// Atomic API modules
pub mod catalog;
pub mod client;
pub mod error;
pub mod instances;
pub mod users;

use async_trait::async_trait;

pub use client::{set_silent, FleetClient};
pub use error::{ApiError, ApiResult};
pub use instances::SshProbe;
pub use users::LoginResponse;

use crate::models::{
    BillingStatement, CurrentUser, DeployRequest, Flavor, Host, Image, Instance, InstanceMetrics,
    NewUserForm, UserAccount,
};

/// One accessor per remote collection and per command.
///
/// Implementations perform exactly one request/response exchange and never
/// touch local state. `token` is attached as a bearer credential when present.
#[async_trait]
pub trait FleetApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse>;
    async fn current_user(&self, token: Option<&str>) -> ApiResult<CurrentUser>;

    async fn list_instances(&self, token: Option<&str>) -> ApiResult<Vec<Instance>>;
    async fn list_metrics(&self, token: Option<&str>) -> ApiResult<Vec<InstanceMetrics>>;
    async fn list_hosts(&self, token: Option<&str>) -> ApiResult<Vec<Host>>;
    async fn list_flavors(&self, token: Option<&str>) -> ApiResult<Vec<Flavor>>;
    async fn list_images(&self, token: Option<&str>) -> ApiResult<Vec<Image>>;
    async fn list_available_images(&self, token: Option<&str>) -> ApiResult<Vec<Image>>;
    async fn list_users(&self, token: Option<&str>) -> ApiResult<Vec<UserAccount>>;
    async fn list_billing(&self, token: Option<&str>) -> ApiResult<BillingStatement>;

    async fn deploy(&self, token: Option<&str>, request: &DeployRequest) -> ApiResult<()>;
    async fn start(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()>;
    async fn stop(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()>;
    async fn delete(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()>;
    async fn test_ssh(&self, token: Option<&str>, technical_name: &str) -> ApiResult<SshProbe>;

    async fn create_user(&self, token: Option<&str>, form: &NewUserForm) -> ApiResult<()>;
    async fn delete_user(&self, token: Option<&str>, user_id: u64) -> ApiResult<()>;
    async fn reset_password(&self, token: Option<&str>, user_id: u64, password: &str) -> ApiResult<()>;
}

#[async_trait]
impl FleetApi for FleetClient {
    async fn login(&self, username: &str, password: &str) -> ApiResult<LoginResponse> {
        users::login(self, username, password).await
    }

    async fn current_user(&self, token: Option<&str>) -> ApiResult<CurrentUser> {
        users::current_user(self, token).await
    }

    async fn list_instances(&self, token: Option<&str>) -> ApiResult<Vec<Instance>> {
        instances::load_instances(self, token).await
    }

    async fn list_metrics(&self, token: Option<&str>) -> ApiResult<Vec<InstanceMetrics>> {
        instances::load_metrics(self, token).await
    }

    async fn list_hosts(&self, token: Option<&str>) -> ApiResult<Vec<Host>> {
        catalog::load_hosts(self, token).await
    }

    async fn list_flavors(&self, token: Option<&str>) -> ApiResult<Vec<Flavor>> {
        catalog::load_flavors(self, token).await
    }

    async fn list_images(&self, token: Option<&str>) -> ApiResult<Vec<Image>> {
        catalog::load_images(self, token).await
    }

    async fn list_available_images(&self, token: Option<&str>) -> ApiResult<Vec<Image>> {
        catalog::load_available_images(self, token).await
    }

    async fn list_users(&self, token: Option<&str>) -> ApiResult<Vec<UserAccount>> {
        users::load_users(self, token).await
    }

    async fn list_billing(&self, token: Option<&str>) -> ApiResult<BillingStatement> {
        catalog::load_billing(self, token).await
    }

    async fn deploy(&self, token: Option<&str>, request: &DeployRequest) -> ApiResult<()> {
        instances::deploy_instance(self, token, request).await
    }

    async fn start(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        instances::power_action(self, token, technical_name, "start").await
    }

    async fn stop(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        instances::power_action(self, token, technical_name, "stop").await
    }

    async fn delete(&self, token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        instances::delete_instance(self, token, technical_name).await
    }

    async fn test_ssh(&self, token: Option<&str>, technical_name: &str) -> ApiResult<SshProbe> {
        instances::test_ssh(self, token, technical_name).await
    }

    async fn create_user(&self, token: Option<&str>, form: &NewUserForm) -> ApiResult<()> {
        users::create_user(self, token, form).await
    }

    async fn delete_user(&self, token: Option<&str>, user_id: u64) -> ApiResult<()> {
        users::delete_user(self, token, user_id).await
    }

    async fn reset_password(&self, token: Option<&str>, user_id: u64, password: &str) -> ApiResult<()> {
        users::reset_password(self, token, user_id, password).await
    }
}
