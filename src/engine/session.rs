use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::ChangeSignal;
use crate::api::{ApiError, ApiResult};
use crate::credentials::{CredentialError, CredentialStore};
use crate::models::{Role, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownReason {
    Unauthorized,
    Logout,
}

/// Owns the credential and tears the session down on the first
/// authorization failure.
///
/// Every outbound request goes through [`SessionGuard::run`]. Teardown happens
/// at most once no matter how many requests fail together; afterwards `run`
/// refuses to send anything.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    session: Mutex<Option<Session>>,
    store: Option<CredentialStore>,
    torn_down: AtomicBool,
    cancel: watch::Sender<bool>,
    changes: ChangeSignal,
}

impl SessionGuard {
    pub fn new(session: Option<Session>, store: Option<CredentialStore>, changes: ChangeSignal) -> Self {
        let logged_out = session.is_none();
        let (cancel, _) = watch::channel(logged_out);
        Self {
            inner: Arc::new(GuardInner {
                session: Mutex::new(session),
                store,
                torn_down: AtomicBool::new(logged_out),
                cancel,
                changes,
            }),
        }
    }

    /// Restores the session persisted by a previous `login`, if any.
    pub fn from_store(store: CredentialStore, changes: ChangeSignal) -> Result<Self, CredentialError> {
        let session = store.load()?;
        Ok(Self::new(session, Some(store), changes))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.inner.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        !self.inner.torn_down.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> Option<Session> {
        self.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.token.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.lock().as_ref().map(|s| s.role)
    }

    /// Records the identity confirmed by the API.
    pub fn confirm_identity(&self, username: &str, role: Role) {
        let updated = {
            let mut guard = self.lock();
            match guard.as_mut() {
                Some(session) if session.role != role || session.username != username => {
                    session.role = role;
                    session.username = username.to_string();
                    Some(session.clone())
                }
                _ => None,
            }
        };
        if let (Some(session), Some(store)) = (updated, &self.inner.store) {
            if let Err(e) = store.save(&session) {
                tracing::warn!(%e, "Failed to persist confirmed identity");
            }
        }
    }

    /// Sends one request with the current credential attached and screens the
    /// response for authorization failure.
    pub async fn run<T, F, Fut>(&self, request: F) -> ApiResult<T>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        if !self.is_active() {
            return Err(ApiError::SessionClosed);
        }
        let result = request(self.token()).await;
        self.screen(result)
    }

    /// Applies the authorization check to a response, regardless of whether
    /// the caller will still use it.
    pub fn screen<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        match result {
            Err(ApiError::Unauthorized) => {
                self.teardown(TeardownReason::Unauthorized);
                Err(ApiError::Unauthorized)
            }
            Ok(_) if !self.is_active() => Err(ApiError::SessionClosed),
            other => other,
        }
    }

    pub fn logout(&self) -> bool {
        self.teardown(TeardownReason::Logout)
    }

    /// Clears local session state and cancels every scheduled poll.
    /// Returns `false` when the session was already torn down.
    pub fn teardown(&self, reason: TeardownReason) -> bool {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.lock().take();
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.clear() {
                tracing::error!(%e, "Failed to clear stored credentials");
            }
        }
        self.inner.cancel.send_replace(true);
        tracing::info!(?reason, "Session closed");
        self.inner.changes.bump();
        true
    }

    /// Resolves once the session has been torn down.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.inner.cancel.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}
