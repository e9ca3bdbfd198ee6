use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::ChangeSignal;
use crate::models::{Severity, ToastMessage};

/// Serializes transient toasts: one is displayed at a time for a fixed
/// window, the rest wait in push order. Nothing is ever dropped.
///
/// Advancement is lazy: the queue moves on when it is read after the current
/// toast's window has elapsed, so every toast is seen by a reader. When a
/// window ends the change signal is bumped, so a projector that only waits on
/// it still redraws and reads the queue forward.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Mutex<QueueInner>>,
    display_for: Duration,
    changes: ChangeSignal,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<ToastMessage>,
    current: Option<Shown>,
    /// End of the window an expiry wake-up is already armed for.
    armed_until: Option<Instant>,
}

struct Shown {
    toast: ToastMessage,
    since: Instant,
}

impl QueueInner {
    fn advance(&mut self, now: Instant, display_for: Duration) -> bool {
        let mut changed = false;
        if let Some(shown) = &self.current {
            if now.saturating_duration_since(shown.since) >= display_for {
                self.current = None;
                changed = true;
            }
        }
        if self.current.is_none() {
            if let Some(toast) = self.pending.pop_front() {
                self.current = Some(Shown { toast, since: now });
                changed = true;
            }
        }
        changed
    }

    /// Deadline of the current toast's window if no wake-up covers it yet.
    fn arm(&mut self, display_for: Duration) -> Option<Instant> {
        let deadline = self.current.as_ref()?.since + display_for;
        if self.armed_until == Some(deadline) {
            return None;
        }
        self.armed_until = Some(deadline);
        Some(deadline)
    }
}

impl NotificationQueue {
    pub fn new(display_for: Duration, changes: ChangeSignal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            display_for,
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wake_at(&self, deadline: Option<Instant>) {
        let Some(deadline) = deadline else { return };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let changes = self.changes.clone();
        runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            changes.bump();
        });
    }

    pub fn push(&self, text: impl Into<String>, severity: Severity) {
        let toast = ToastMessage::new(text, severity);
        match severity {
            Severity::Success => tracing::info!(toast = %toast.text, "notification"),
            Severity::Warning => tracing::warn!(toast = %toast.text, "notification"),
            Severity::Error => tracing::error!(toast = %toast.text, "notification"),
        }
        let deadline = {
            let mut inner = self.lock();
            inner.pending.push_back(toast);
            inner.advance(Instant::now(), self.display_for);
            inner.arm(self.display_for)
        };
        self.wake_at(deadline);
        self.changes.bump();
    }

    pub fn success(&self, text: impl Into<String>) {
        self.push(text, Severity::Success);
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.push(text, Severity::Warning);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(text, Severity::Error);
    }

    /// Toast currently on screen, moving the queue along if its window is over.
    pub fn current(&self) -> Option<ToastMessage> {
        let (toast, changed, deadline) = {
            let mut inner = self.lock();
            let changed = inner.advance(Instant::now(), self.display_for);
            let deadline = inner.arm(self.display_for);
            (inner.current.as_ref().map(|s| s.toast.clone()), changed, deadline)
        };
        self.wake_at(deadline);
        if changed {
            self.changes.bump();
        }
        toast
    }

    /// Number of toasts waiting behind the current one.
    pub fn queued(&self) -> usize {
        self.lock().pending.len()
    }

    /// Takes every toast, current first, leaving the queue empty.
    pub fn drain(&self) -> Vec<ToastMessage> {
        let mut inner = self.lock();
        let mut out: Vec<ToastMessage> = inner.current.take().map(|s| s.toast).into_iter().collect();
        out.extend(inner.pending.drain(..));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> NotificationQueue {
        NotificationQueue::new(Duration::from_secs(4), ChangeSignal::new())
    }

    #[tokio::test(start_paused = true)]
    async fn toasts_are_shown_in_push_order() {
        let q = queue();
        q.error("Erreur lors de l'arrêt");
        q.warning("Aucune image disponible");

        assert_eq!(q.current().unwrap().text, "Erreur lors de l'arrêt");
        assert_eq!(q.queued(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(q.current().unwrap().text, "Erreur lors de l'arrêt");

        tokio::time::advance(Duration::from_secs(1)).await;
        let next = q.current().unwrap();
        assert_eq!(next.text, "Aucune image disponible");
        assert_eq!(next.severity, Severity::Warning);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(q.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_toasts_get_a_full_window_each() {
        let q = queue();
        q.success("a");
        q.success("b");
        q.success("c");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(q.current().unwrap().text, "b");
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(q.current().unwrap().text, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn window_end_signals_a_redraw_without_a_read() {
        let changes = ChangeSignal::new();
        let q = NotificationQueue::new(Duration::from_secs(4), changes.clone());
        q.success("Instance web1 démarrée");
        let mut rx = changes.subscribe();
        rx.borrow_and_update();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.has_changed().unwrap());
        assert!(q.current().is_none());
    }

    #[tokio::test]
    async fn drain_returns_everything_once() {
        let q = queue();
        q.success("one");
        q.error("two");
        let all: Vec<String> = q.drain().into_iter().map(|t| t.text).collect();
        assert_eq!(all, vec!["one", "two"]);
        assert!(q.drain().is_empty());
    }
}
