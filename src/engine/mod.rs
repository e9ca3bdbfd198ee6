//! Client-side fleet synchronization and command dispatch.
//!
//! The [`Dashboard`] owns one of each component:
//!
//! - [`SessionGuard`]: credential owner, tears everything down on a 401
//! - [`PollScheduler`]: per-feed refresh loops with stale-response rejection
//! - [`CommandDispatcher`]: lifecycle and admin commands, toasts, re-polls
//! - [`ConfirmationGate`]: the only way to obtain a delete
//! - [`NotificationQueue`]: ordered transient toasts
//!
//! Each piece of state has a single writer. The scheduler writes the polled
//! collections; the dispatcher writes toasts and confirmation state; the
//! dashboard writes dialog and tab state.

pub mod confirmation;
pub mod dashboard;
pub mod dispatcher;
pub mod events;
pub mod notifications;
pub mod scheduler;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

pub use confirmation::{ConfirmationGate, ConfirmedDelete, PendingConfirmation};
pub use dashboard::{Dashboard, DashboardSnapshot};
pub use dispatcher::{CommandDispatcher, CommandOutcome, PowerCommand};
pub use events::{DeployDialog, Tab, UiEvent};
pub use notifications::NotificationQueue;
pub use scheduler::{Feed, PollScheduler, RefreshOutcome};
pub use session::{SessionGuard, TeardownReason};

use crate::api::ApiError;
use crate::credentials::CredentialError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not logged in. Run `fleetdeck login` first")]
    LoginRequired,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

/// Timing knobs of the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub instances_every: Duration,
    pub metrics_every: Duration,
    pub billing_every: Duration,
    pub hosts_every: Duration,
    pub toast_duration: Duration,
    /// Wait before re-polling after a start/stop/delete, so the backend
    /// transition has time to land.
    pub settle_delay: Duration,
    pub deploy_burst_count: u32,
    pub deploy_burst_spacing: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instances_every: Duration::from_secs(10),
            metrics_every: Duration::from_secs(3),
            billing_every: Duration::from_secs(60),
            hosts_every: Duration::from_secs(30),
            toast_duration: Duration::from_secs(4),
            settle_delay: Duration::from_secs(1),
            deploy_burst_count: 15,
            deploy_burst_spacing: Duration::from_secs(2),
        }
    }
}

/// Revision counter bumped on every observable state change, so a projector
/// knows when to redraw.
#[derive(Clone, Debug)]
pub struct ChangeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn bump(&self) {
        self.tx.send_modify(|rev| *rev = rev.wrapping_add(1));
    }

    pub fn revision(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}
