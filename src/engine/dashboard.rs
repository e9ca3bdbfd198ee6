use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::watch;

use super::confirmation::{ConfirmationGate, PendingConfirmation};
use super::dispatcher::{CommandDispatcher, CommandOutcome, PowerCommand};
use super::events::{DeployDialog, Tab, UiEvent};
use super::notifications::NotificationQueue;
use super::scheduler::{Feed, PollScheduler};
use super::session::SessionGuard;
use super::{ChangeSignal, EngineConfig, EngineError};
use crate::api::{ApiError, FleetApi};
use crate::models::{
    BillingEntry, DeployContext, DeployForm, DeploySizing, Flavor, Host, Image, Instance,
    InstanceMetrics, Role, ToastMessage, UserAccount, ValidationError,
};

/// Read-only view handed to the projector.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardSnapshot {
    pub username: String,
    pub role: Option<Role>,
    pub logged_out: bool,
    pub tab: Tab,
    pub deploy_dialog: DeployDialog,
    pub instances: Vec<Instance>,
    pub instance_count: usize,
    pub running_count: usize,
    pub metrics: Vec<InstanceMetrics>,
    pub hosts: Vec<Host>,
    pub images: Vec<Image>,
    pub available_images: Vec<Image>,
    pub flavors: Vec<Flavor>,
    pub billing: Vec<BillingEntry>,
    pub billing_total: f64,
    pub users: Vec<UserAccount>,
    pub pending_confirmation: Option<PendingConfirmation>,
    pub toast: Option<ToastMessage>,
    pub revision: u64,
}

#[derive(Default)]
struct UiState {
    tab: Tab,
    deploy_dialog: DeployDialog,
}

/// Owned application state of one dashboard session: wires the engine
/// components together and routes user intents to them.
pub struct Dashboard {
    guard: SessionGuard,
    scheduler: PollScheduler,
    dispatcher: CommandDispatcher,
    gate: ConfirmationGate,
    notifications: NotificationQueue,
    config: EngineConfig,
    ui: Mutex<UiState>,
    changes: ChangeSignal,
}

impl Dashboard {
    /// Confirms the stored session with the API and builds the engine.
    /// No poll starts before the identity is known.
    pub async fn open(
        api: Arc<dyn FleetApi>,
        guard: SessionGuard,
        changes: ChangeSignal,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if !guard.is_active() {
            return Err(EngineError::LoginRequired);
        }
        let me = {
            let api = Arc::clone(&api);
            guard
                .run(move |token| async move { api.current_user(token.as_deref()).await })
                .await
        };
        let me = match me {
            Ok(me) => me,
            Err(e) if e.ends_session() => return Err(EngineError::LoginRequired),
            Err(e) => return Err(e.into()),
        };
        guard.confirm_identity(&me.username, Role::from_admin_flag(me.is_admin));
        tracing::info!(username = %me.username, admin = me.is_admin, "Dashboard opened");

        let notifications = NotificationQueue::new(config.toast_duration, changes.clone());
        let gate = ConfirmationGate::new(changes.clone());
        let scheduler = PollScheduler::new(Arc::clone(&api), guard.clone(), changes.clone());
        let dispatcher = CommandDispatcher::new(
            api,
            guard.clone(),
            scheduler.clone(),
            notifications.clone(),
            gate.clone(),
            config.clone(),
        );
        Ok(Self {
            guard,
            scheduler,
            dispatcher,
            gate,
            notifications,
            config,
            ui: Mutex::new(UiState::default()),
            changes,
        })
    }

    fn lock_ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn role(&self) -> Option<Role> {
        self.guard.role()
    }

    fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    /// Loads the initial feeds, then starts the cadence timers for the
    /// dashboard variant matching the session's role.
    pub async fn start(&self) {
        let mut initial = vec![Feed::Instances, Feed::Metrics, Feed::Flavors];
        if self.is_admin() {
            initial.extend([Feed::Users, Feed::Hosts]);
        } else {
            initial.push(Feed::Billing);
        }
        join_all(initial.into_iter().map(|feed| self.scheduler.refresh(feed))).await;

        self.scheduler.every(Feed::Instances, self.config.instances_every);
        self.scheduler.every(Feed::Metrics, self.config.metrics_every);
        if self.is_admin() {
            self.scheduler.every(Feed::Hosts, self.config.hosts_every);
        } else {
            self.scheduler.every(Feed::Billing, self.config.billing_every);
        }
    }

    /// Routes one user intent. Pure UI transitions report `Completed`.
    pub async fn handle(&self, event: UiEvent) -> CommandOutcome {
        if !self.guard.is_active() {
            return CommandOutcome::SessionEnded;
        }
        match event {
            UiEvent::SelectTab(tab) => self.select_tab(tab).await,
            UiEvent::Refresh => {
                let tab = self.lock_ui().tab;
                let mut feeds = vec![Feed::Instances];
                feeds.extend(Self::feeds_for_tab(tab));
                join_all(feeds.into_iter().map(|f| self.scheduler.refresh(f))).await;
                CommandOutcome::Completed
            }
            UiEvent::OpenDeployDialog => self.open_deploy_dialog().await,
            UiEvent::CloseDeployDialog => {
                self.set_dialog(DeployDialog::Closed);
                CommandOutcome::Completed
            }
            UiEvent::SelectFlavor(id) => {
                let mut ui = self.lock_ui();
                if let DeployDialog::Open { selected_flavor } = &mut ui.deploy_dialog {
                    *selected_flavor = Some(id);
                }
                drop(ui);
                self.changes.bump();
                CommandOutcome::Completed
            }
            UiEvent::SubmitDeploy(form) => self.submit_deploy(form).await,
            UiEvent::Start(name) => self.dispatcher.issue(PowerCommand::Start, &name).await,
            UiEvent::Stop(name) => self.dispatcher.issue(PowerCommand::Stop, &name).await,
            UiEvent::TestSsh(name) => {
                let ip = self
                    .scheduler
                    .with_view(|v| v.instance(&name).and_then(|vm| vm.ip_address.clone()));
                self.dispatcher.test_ssh(&name, ip.as_deref()).await
            }
            UiEvent::RequestDelete {
                target_key,
                display_label,
            } => {
                self.gate.open(target_key, display_label);
                CommandOutcome::Completed
            }
            UiEvent::ConfirmDelete => match self.gate.confirm() {
                Some(confirmed) => self.dispatcher.delete(confirmed).await,
                None => CommandOutcome::Ignored,
            },
            UiEvent::CancelDelete => {
                self.gate.cancel();
                CommandOutcome::Completed
            }
            UiEvent::CreateUser(form) => self.dispatcher.create_user(&form).await,
            UiEvent::DeleteUser { user_id, username } => {
                self.dispatcher.delete_user(user_id, &username).await
            }
            UiEvent::ResetPassword {
                user_id,
                username,
                password,
            } => {
                self.dispatcher
                    .reset_password(user_id, &username, &password)
                    .await
            }
            UiEvent::Logout => {
                self.guard.logout();
                self.scheduler.shutdown();
                CommandOutcome::SessionEnded
            }
        }
    }

    fn feeds_for_tab(tab: Tab) -> Vec<Feed> {
        match tab {
            Tab::Instances => vec![Feed::Metrics],
            Tab::Images => vec![Feed::Images],
            Tab::Billing => vec![Feed::Billing],
            Tab::Hosts => vec![Feed::Hosts],
            Tab::Users => vec![Feed::Users],
        }
    }

    async fn select_tab(&self, tab: Tab) -> CommandOutcome {
        if tab.admin_only() && !self.is_admin() {
            let err = ValidationError::AdminOnly;
            self.notifications.push(err.to_string(), err.severity());
            return CommandOutcome::Invalid(err);
        }
        self.lock_ui().tab = tab;
        self.changes.bump();
        join_all(Self::feeds_for_tab(tab).into_iter().map(|f| self.scheduler.refresh(f))).await;
        CommandOutcome::Completed
    }

    fn set_dialog(&self, dialog: DeployDialog) {
        self.lock_ui().deploy_dialog = dialog;
        self.changes.bump();
    }

    async fn open_deploy_dialog(&self) -> CommandOutcome {
        let default_flavor = if self.is_admin() { None } else { Some("M".to_string()) };
        self.set_dialog(DeployDialog::Open {
            selected_flavor: default_flavor,
        });

        let mut feeds = vec![Feed::Flavors, Feed::AvailableImages, Feed::Images];
        if self.is_admin() {
            feeds.push(Feed::Hosts);
        }
        join_all(feeds.into_iter().map(|f| self.scheduler.refresh(f))).await;

        let (no_images, no_hosts) = self.scheduler.with_view(|v| {
            (
                v.available_images.is_empty(),
                v.online_hosts().next().is_none(),
            )
        });
        if no_images {
            self.notifications.warning("Aucune image disponible");
        }
        if self.is_admin() && no_hosts {
            self.notifications.error("Aucun hôte KVM disponible");
        }
        CommandOutcome::Completed
    }

    async fn submit_deploy(&self, mut form: DeployForm) -> CommandOutcome {
        if form.sizing.is_none() {
            if let DeployDialog::Open {
                selected_flavor: Some(id),
            } = &self.lock_ui().deploy_dialog
            {
                form.sizing = Some(DeploySizing::Flavor(id.clone()));
            }
        }
        let role = self.role().unwrap_or(Role::User);
        let (flavors, images) = self
            .scheduler
            .with_view(|v| (v.flavors.clone(), v.images.clone()));
        let ctx = DeployContext {
            role,
            flavors: &flavors,
            images: &images,
        };
        let outcome = self.dispatcher.deploy(&form, &ctx).await;
        if outcome.is_completed() {
            self.set_dialog(DeployDialog::Closed);
        }
        outcome
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let view = self.scheduler.view();
        let session = self.guard.session();
        let (tab, deploy_dialog) = {
            let ui = self.lock_ui();
            (ui.tab, ui.deploy_dialog.clone())
        };
        let toast = self.notifications.current();
        DashboardSnapshot {
            username: session.as_ref().map(|s| s.username.clone()).unwrap_or_default(),
            role: session.as_ref().map(|s| s.role),
            logged_out: !self.guard.is_active(),
            tab,
            deploy_dialog,
            instance_count: view.instances.len(),
            running_count: view.running_count(),
            billing_total: view.billing.total(),
            instances: view.instances,
            metrics: view.metrics,
            hosts: view.hosts,
            images: view.images,
            available_images: view.available_images,
            flavors: view.flavors,
            billing: view.billing.entries,
            users: view.users,
            pending_confirmation: self.gate.pending(),
            toast,
            revision: self.changes.revision(),
        }
    }

    /// Revision stream for redraws. It also fires when a toast's display
    /// window ends, so waiting on it alone keeps the toast line current.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn is_logged_out(&self) -> bool {
        !self.guard.is_active()
    }

    /// Resolves when the session is torn down, whatever the cause.
    pub fn logged_out(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.guard.cancelled()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    /// Stops every timer; leaves the session itself alone.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

/// Errors worth showing to the person who ran a one-shot command.
pub fn describe_api_error(err: &ApiError) -> String {
    match err {
        ApiError::Unauthorized | ApiError::SessionClosed => {
            "Session expirée, reconnectez-vous avec `fleetdeck login`".to_string()
        }
        other => other.to_string(),
    }
}
