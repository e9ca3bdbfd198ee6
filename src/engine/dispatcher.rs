use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::confirmation::{ConfirmationGate, ConfirmedDelete};
use super::notifications::NotificationQueue;
use super::scheduler::{Feed, PollScheduler};
use super::session::SessionGuard;
use super::EngineConfig;
use crate::api::{ApiError, FleetApi};
use crate::models::{
    forms::validate_password, DeployContext, DeployForm, NewUserForm, Role, ValidationError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerCommand {
    Start,
    Stop,
}

impl PowerCommand {
    fn verb(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Completed,
    /// Server refused; carries its message.
    Rejected(String),
    /// Network or decode failure.
    Failed(String),
    Invalid(ValidationError),
    /// A command for the same target is still pending.
    Ignored,
    /// Authorization failure or no session; handled by the session guard.
    SessionEnded,
}

impl CommandOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Issues lifecycle and admin commands.
///
/// Writes only toasts and confirmation state. Instance status is never
/// assumed: a re-poll is scheduled and whatever it reports wins.
#[derive(Clone)]
pub struct CommandDispatcher {
    api: Arc<dyn FleetApi>,
    guard: SessionGuard,
    scheduler: PollScheduler,
    notifications: NotificationQueue,
    gate: ConfirmationGate,
    pending: Arc<Mutex<HashSet<String>>>,
    config: EngineConfig,
}

/// Holds a target key in the pending set until dropped.
struct PendingTarget {
    pending: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for PendingTarget {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn FleetApi>,
        guard: SessionGuard,
        scheduler: PollScheduler,
        notifications: NotificationQueue,
        gate: ConfirmationGate,
        config: EngineConfig,
    ) -> Self {
        Self {
            api,
            guard,
            scheduler,
            notifications,
            gate,
            pending: Arc::new(Mutex::new(HashSet::new())),
            config,
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn claim(&self, key: &str) -> Option<PendingTarget> {
        if !self.lock_pending().insert(key.to_string()) {
            return None;
        }
        Some(PendingTarget {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
        })
    }

    pub fn is_pending(&self, technical_name: &str) -> bool {
        self.lock_pending().contains(technical_name)
    }

    /// Turns a failed request into exactly one toast, or none when the
    /// session guard already took over.
    fn report_failure(&self, err: ApiError, fallback: &str) -> CommandOutcome {
        match err {
            e if e.ends_session() => CommandOutcome::SessionEnded,
            ApiError::Rejected { message, .. } => {
                self.notifications.error(message.clone());
                CommandOutcome::Rejected(message)
            }
            e => {
                tracing::error!(error = %e, "{}", fallback);
                self.notifications.error(fallback);
                CommandOutcome::Failed(e.to_string())
            }
        }
    }

    fn report_invalid(&self, err: ValidationError) -> CommandOutcome {
        self.notifications.push(err.to_string(), err.severity());
        CommandOutcome::Invalid(err)
    }

    fn settle_refresh(&self, with_billing: bool) {
        self.scheduler
            .schedule_refresh("settle:instances", Feed::Instances, self.config.settle_delay);
        if with_billing {
            self.scheduler
                .schedule_refresh("settle:billing", Feed::Billing, self.config.settle_delay);
        }
    }

    fn is_tenant(&self) -> bool {
        self.guard.role() == Some(Role::User)
    }

    /// Start or stop a VM by technical name.
    pub async fn issue(&self, command: PowerCommand, technical_name: &str) -> CommandOutcome {
        let Some(_claim) = self.claim(technical_name) else {
            tracing::debug!(target = %technical_name, "Command already pending, ignoring");
            return CommandOutcome::Ignored;
        };
        let label = self.scheduler.label_for(technical_name);
        tracing::info!(command = command.verb(), target = %technical_name, "Issuing command");

        let api = Arc::clone(&self.api);
        let name = technical_name.to_string();
        let result = self
            .guard
            .run(move |token| async move {
                match command {
                    PowerCommand::Start => api.start(token.as_deref(), &name).await,
                    PowerCommand::Stop => api.stop(token.as_deref(), &name).await,
                }
            })
            .await;

        match (command, result) {
            (PowerCommand::Start, Ok(())) => {
                self.notifications.success(format!("Instance {} démarrée", label));
            }
            (PowerCommand::Stop, Ok(())) => {
                self.notifications.success(format!("Instance {} arrêtée", label));
            }
            (PowerCommand::Start, Err(e)) => return self.report_failure(e, "Erreur lors du démarrage"),
            (PowerCommand::Stop, Err(e)) => return self.report_failure(e, "Erreur lors de l'arrêt"),
        }
        self.settle_refresh(false);
        CommandOutcome::Completed
    }

    /// Deletes the VM named by a confirmation token.
    pub async fn delete(&self, confirmed: ConfirmedDelete) -> CommandOutcome {
        let Some(_claim) = self.claim(confirmed.target_key()) else {
            tracing::debug!(target = %confirmed.target_key(), "Delete already pending, ignoring");
            self.gate.resolve(&confirmed, false);
            return CommandOutcome::Ignored;
        };
        tracing::info!(target = %confirmed.target_key(), "Deleting instance");

        let api = Arc::clone(&self.api);
        let name = confirmed.target_key().to_string();
        let result = self
            .guard
            .run(move |token| async move { api.delete(token.as_deref(), &name).await })
            .await;

        match result {
            Ok(()) => {
                self.notifications.success(format!(
                    "Instance {} supprimée avec succès",
                    confirmed.display_label()
                ));
                self.gate.resolve(&confirmed, true);
                self.settle_refresh(self.is_tenant());
                CommandOutcome::Completed
            }
            Err(e) => {
                self.gate.resolve(&confirmed, false);
                self.report_failure(e, "Erreur lors de la suppression")
            }
        }
    }

    /// Validates and submits a deployment, then follows it with a bounded
    /// burst of instance refreshes.
    pub async fn deploy(&self, form: &DeployForm, ctx: &DeployContext<'_>) -> CommandOutcome {
        let request = match form.validate(ctx) {
            Ok(r) => r,
            Err(e) => return self.report_invalid(e),
        };
        let Some(_claim) = self.claim(&request.name) else {
            return CommandOutcome::Ignored;
        };
        let name = request.name.clone();
        self.notifications
            .warning(format!("Création de {} en cours...", name));
        tracing::info!(name = %name, "Deploying instance");

        let api = Arc::clone(&self.api);
        let result = self
            .guard
            .run(move |token| async move { api.deploy(token.as_deref(), &request).await })
            .await;

        if let Err(e) = result {
            return self.report_failure(e, "Erreur lors de la création");
        }
        self.notifications
            .success(format!("Instance {} créée avec succès !", name));
        self.scheduler
            .schedule_refresh(&format!("deploy:{}", name), Feed::Instances, std::time::Duration::ZERO);
        if self.is_tenant() {
            self.scheduler
                .schedule_refresh("deploy:billing", Feed::Billing, std::time::Duration::ZERO);
        }
        self.scheduler.schedule_burst(
            &format!("burst:{}", name),
            Feed::Instances,
            self.config.deploy_burst_count,
            self.config.deploy_burst_spacing,
        );
        CommandOutcome::Completed
    }

    /// Checks that port 22 answers on a VM.
    pub async fn test_ssh(&self, technical_name: &str, ip: Option<&str>) -> CommandOutcome {
        let Some(_claim) = self.claim(&format!("ssh:{}", technical_name)) else {
            return CommandOutcome::Ignored;
        };
        let address = ip.unwrap_or(technical_name).to_string();
        self.notifications
            .warning(format!("Test de connexion SSH vers {}...", address));

        let api = Arc::clone(&self.api);
        let name = technical_name.to_string();
        let result = self
            .guard
            .run(move |token| async move { api.test_ssh(token.as_deref(), &name).await })
            .await;

        match result {
            Ok(probe) if probe.success => {
                self.notifications
                    .success(format!("SSH accessible sur {}:22", address));
                CommandOutcome::Completed
            }
            Ok(probe) => {
                let reason = probe.error.unwrap_or_else(|| "Port 22 fermé".to_string());
                self.notifications
                    .error(format!("SSH non accessible: {}", reason));
                CommandOutcome::Rejected(reason)
            }
            Err(ApiError::Rejected { message, .. }) => {
                self.notifications
                    .error(format!("SSH non accessible: {}", message));
                CommandOutcome::Rejected(message)
            }
            Err(e) => self.report_failure(e, "Erreur test SSH"),
        }
    }

    fn require_admin(&self) -> Result<(), CommandOutcome> {
        match self.guard.role() {
            Some(Role::Admin) => Ok(()),
            Some(Role::User) => Err(self.report_invalid(ValidationError::AdminOnly)),
            None => Err(CommandOutcome::SessionEnded),
        }
    }

    pub async fn create_user(&self, form: &NewUserForm) -> CommandOutcome {
        if let Err(outcome) = self.require_admin() {
            return outcome;
        }
        let form = match form.validate() {
            Ok(f) => f,
            Err(e) => return self.report_invalid(e),
        };
        let api = Arc::clone(&self.api);
        let body = form.clone();
        let result = self
            .guard
            .run(move |token| async move { api.create_user(token.as_deref(), &body).await })
            .await;
        if let Err(e) = result {
            return self.report_failure(e, "Erreur lors de la création");
        }
        self.notifications.success("Utilisateur créé avec succès");
        self.scheduler
            .schedule_refresh("users", Feed::Users, std::time::Duration::ZERO);
        CommandOutcome::Completed
    }

    pub async fn delete_user(&self, user_id: u64, username: &str) -> CommandOutcome {
        if let Err(outcome) = self.require_admin() {
            return outcome;
        }
        let Some(_claim) = self.claim(&format!("user:{}", user_id)) else {
            return CommandOutcome::Ignored;
        };
        let api = Arc::clone(&self.api);
        let result = self
            .guard
            .run(move |token| async move { api.delete_user(token.as_deref(), user_id).await })
            .await;
        if let Err(e) = result {
            return self.report_failure(e, "Erreur lors de la suppression");
        }
        self.notifications
            .success(format!("Utilisateur {} supprimé", username));
        self.scheduler
            .schedule_refresh("users", Feed::Users, std::time::Duration::ZERO);
        CommandOutcome::Completed
    }

    pub async fn reset_password(&self, user_id: u64, username: &str, password: &str) -> CommandOutcome {
        if let Err(outcome) = self.require_admin() {
            return outcome;
        }
        if let Err(e) = validate_password(password) {
            return self.report_invalid(e);
        }
        let api = Arc::clone(&self.api);
        let password = password.to_string();
        let result = self
            .guard
            .run(move |token| async move {
                api.reset_password(token.as_deref(), user_id, &password).await
            })
            .await;
        if let Err(e) = result {
            return self.report_failure(e, "Erreur lors de la réinitialisation");
        }
        self.notifications
            .success(format!("Mot de passe de {} réinitialisé", username));
        CommandOutcome::Completed
    }
}
