//! In-memory fleet API shared by the engine tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fleetdeck::api::{ApiError, ApiResult, FleetApi, LoginResponse, SshProbe};
use fleetdeck::engine::{ChangeSignal, Dashboard, EngineConfig, SessionGuard};
use fleetdeck::models::{
    BillingStatement, CurrentUser, DeployRequest, Flavor, Host, Image, Instance, InstanceMetrics,
    InstanceStatus, NewUserForm, Role, Session, UserAccount,
};

#[derive(Default)]
pub struct FakeState {
    pub me: Option<CurrentUser>,
    pub instances: Vec<Instance>,
    pub metrics: Vec<InstanceMetrics>,
    pub hosts: Vec<Host>,
    pub flavors: Vec<Flavor>,
    pub images: Vec<Image>,
    pub available_images: Vec<Image>,
    pub users: Vec<UserAccount>,
    pub billing: BillingStatement,
    /// Answers for `list_instances` consumed before falling back to `instances`.
    pub scripted_instances: VecDeque<(Duration, Vec<Instance>)>,
    /// Failures keyed by call name, e.g. `stop:web1`.
    pub failures: HashMap<String, ApiError>,
    pub delays: HashMap<String, Duration>,
    /// Every call answers 401 while set.
    pub unauthorized: bool,
    pub calls: Vec<String>,
}

pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    async fn enter(&self, call: String) -> ApiResult<()> {
        let (delay, failure) = {
            let mut s = self.state();
            s.calls.push(call.clone());
            let failure = if s.unauthorized {
                Some(ApiError::Unauthorized)
            } else {
                s.failures.get(&call).cloned()
            };
            (s.delays.get(&call).copied().unwrap_or_default(), failure)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_status(&self, name: &str, status: InstanceStatus) {
        if let Some(vm) = self
            .state()
            .instances
            .iter_mut()
            .find(|vm| vm.technical_name == name)
        {
            vm.status = status;
        }
    }
}

#[async_trait]
impl FleetApi for FakeApi {
    async fn login(&self, username: &str, _password: &str) -> ApiResult<LoginResponse> {
        self.enter("login".into()).await?;
        Ok(LoginResponse {
            token: "tok".into(),
            username: username.into(),
        })
    }

    async fn current_user(&self, _token: Option<&str>) -> ApiResult<CurrentUser> {
        self.enter("current_user".into()).await?;
        self.state().me.clone().ok_or(ApiError::Unauthorized)
    }

    async fn list_instances(&self, _token: Option<&str>) -> ApiResult<Vec<Instance>> {
        let scripted = self.state().scripted_instances.pop_front();
        if let Some((delay, list)) = scripted {
            self.state().calls.push("list_instances".into());
            tokio::time::sleep(delay).await;
            return Ok(list);
        }
        self.enter("list_instances".into()).await?;
        Ok(self.state().instances.clone())
    }

    async fn list_metrics(&self, _token: Option<&str>) -> ApiResult<Vec<InstanceMetrics>> {
        self.enter("list_metrics".into()).await?;
        Ok(self.state().metrics.clone())
    }

    async fn list_hosts(&self, _token: Option<&str>) -> ApiResult<Vec<Host>> {
        self.enter("list_hosts".into()).await?;
        Ok(self.state().hosts.clone())
    }

    async fn list_flavors(&self, _token: Option<&str>) -> ApiResult<Vec<Flavor>> {
        self.enter("list_flavors".into()).await?;
        Ok(self.state().flavors.clone())
    }

    async fn list_images(&self, _token: Option<&str>) -> ApiResult<Vec<Image>> {
        self.enter("list_images".into()).await?;
        Ok(self.state().images.clone())
    }

    async fn list_available_images(&self, _token: Option<&str>) -> ApiResult<Vec<Image>> {
        self.enter("list_available_images".into()).await?;
        Ok(self.state().available_images.clone())
    }

    async fn list_users(&self, _token: Option<&str>) -> ApiResult<Vec<UserAccount>> {
        self.enter("list_users".into()).await?;
        Ok(self.state().users.clone())
    }

    async fn list_billing(&self, _token: Option<&str>) -> ApiResult<BillingStatement> {
        self.enter("list_billing".into()).await?;
        Ok(self.state().billing.clone())
    }

    async fn deploy(&self, _token: Option<&str>, request: &DeployRequest) -> ApiResult<()> {
        self.enter(format!("deploy:{}", request.name)).await?;
        self.state().instances.push(vm(&request.name, None, InstanceStatus::Creating));
        Ok(())
    }

    async fn start(&self, _token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        self.enter(format!("start:{}", technical_name)).await?;
        self.set_status(technical_name, InstanceStatus::Running);
        Ok(())
    }

    async fn stop(&self, _token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        self.enter(format!("stop:{}", technical_name)).await?;
        self.set_status(technical_name, InstanceStatus::Stopped);
        Ok(())
    }

    async fn delete(&self, _token: Option<&str>, technical_name: &str) -> ApiResult<()> {
        self.enter(format!("delete:{}", technical_name)).await?;
        self.state()
            .instances
            .retain(|vm| vm.technical_name != technical_name);
        Ok(())
    }

    async fn test_ssh(&self, _token: Option<&str>, technical_name: &str) -> ApiResult<SshProbe> {
        self.enter(format!("test_ssh:{}", technical_name)).await?;
        Ok(SshProbe {
            success: true,
            error: None,
        })
    }

    async fn create_user(&self, _token: Option<&str>, form: &NewUserForm) -> ApiResult<()> {
        self.enter(format!("create_user:{}", form.username)).await
    }

    async fn delete_user(&self, _token: Option<&str>, user_id: u64) -> ApiResult<()> {
        self.enter(format!("delete_user:{}", user_id)).await
    }

    async fn reset_password(&self, _token: Option<&str>, user_id: u64, _password: &str) -> ApiResult<()> {
        self.enter(format!("reset_password:{}", user_id)).await
    }
}

pub fn vm(name: &str, display_name: Option<&str>, status: InstanceStatus) -> Instance {
    Instance {
        technical_name: name.into(),
        display_name: display_name.map(Into::into),
        flavor: "M".into(),
        image: "debian-12".into(),
        host_id: None,
        status,
        ip_address: Some("10.0.0.5".into()),
        vcpu: 2,
        ram_mb: 2048,
    }
}

pub fn flavor_m() -> Flavor {
    Flavor {
        id: "M".into(),
        name: "Medium".into(),
        vcpu: 2,
        ram_mb: 2048,
        disk_gb: 20,
        price_month: 4.86,
    }
}

pub fn image(name: &str, downloaded: bool) -> Image {
    Image {
        name: name.into(),
        size_mb: 512.0,
        downloaded,
    }
}

/// A fake fleet for `role` with one stopped VM and a small catalog.
pub fn fleet(role: Role) -> FakeState {
    FakeState {
        me: Some(CurrentUser {
            id: Some(7),
            username: "alice".into(),
            is_admin: role.is_admin(),
        }),
        instances: vec![vm("user-7-web1", Some("web1"), InstanceStatus::Stopped)],
        flavors: vec![flavor_m()],
        images: vec![image("debian-12", true), image("ubuntu-24.04", false)],
        available_images: vec![image("debian-12", true)],
        ..FakeState::default()
    }
}

pub fn guard_for(role: Role) -> SessionGuard {
    SessionGuard::new(
        Some(Session {
            token: "tok".into(),
            username: "alice".into(),
            role,
        }),
        None,
        ChangeSignal::new(),
    )
}

pub async fn open_dashboard(api: &Arc<FakeApi>, role: Role) -> Dashboard {
    let changes = ChangeSignal::new();
    let guard = SessionGuard::new(
        Some(Session {
            token: "tok".into(),
            username: "alice".into(),
            role,
        }),
        None,
        changes.clone(),
    );
    let api: Arc<dyn FleetApi> = api.clone();
    Dashboard::open(api, guard, changes, EngineConfig::default())
        .await
        .unwrap()
}
