use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::ChangeSignal;

/// What the confirmation dialog shows. `target_key` is the technical name the
/// delete will be sent to; `display_label` is presentation only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingConfirmation {
    pub target_key: String,
    pub display_label: String,
}

/// Proof that a delete was explicitly confirmed.
///
/// Only [`ConfirmationGate::confirm`] can mint one, so a delete cannot be
/// issued without going through the gate.
#[derive(Debug)]
pub struct ConfirmedDelete {
    target_key: String,
    display_label: String,
    generation: u64,
}

impl ConfirmedDelete {
    pub fn target_key(&self) -> &str {
        &self.target_key
    }

    pub fn display_label(&self) -> &str {
        &self.display_label
    }
}

#[derive(Debug, Default)]
enum GateState {
    #[default]
    Idle,
    Awaiting {
        pending: PendingConfirmation,
        generation: u64,
    },
    /// Confirmed, delete request in flight.
    Submitting {
        pending: PendingConfirmation,
        generation: u64,
    },
}

#[derive(Default)]
struct GateInner {
    state: GateState,
    next_generation: u64,
}

/// Guards destructive commands behind an explicit confirmation.
/// At most one confirmation exists; opening another replaces it.
#[derive(Clone)]
pub struct ConfirmationGate {
    inner: Arc<Mutex<GateInner>>,
    changes: ChangeSignal,
}

impl ConfirmationGate {
    pub fn new(changes: ChangeSignal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateInner::default())),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(&self, target_key: impl Into<String>, display_label: impl Into<String>) {
        let target_key = target_key.into();
        let display_label = display_label.into();
        let display_label = if display_label.trim().is_empty() {
            target_key.clone()
        } else {
            display_label
        };
        {
            let mut inner = self.lock();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            inner.state = GateState::Awaiting {
                pending: PendingConfirmation {
                    target_key,
                    display_label,
                },
                generation,
            };
        }
        self.changes.bump();
    }

    /// Discards the pending confirmation without side effects.
    pub fn cancel(&self) -> Option<PendingConfirmation> {
        let previous = std::mem::take(&mut self.lock().state);
        let pending = match previous {
            GateState::Idle => None,
            GateState::Awaiting { pending, .. } | GateState::Submitting { pending, .. } => {
                Some(pending)
            }
        };
        if pending.is_some() {
            self.changes.bump();
        }
        pending
    }

    pub fn pending(&self) -> Option<PendingConfirmation> {
        match &self.lock().state {
            GateState::Idle => None,
            GateState::Awaiting { pending, .. } | GateState::Submitting { pending, .. } => {
                Some(pending.clone())
            }
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.lock().state, GateState::Submitting { .. })
    }

    /// Moves awaiting → submitting and hands out the single delete token.
    /// Returns `None` when idle or when a confirm is already being processed.
    pub fn confirm(&self) -> Option<ConfirmedDelete> {
        let token = {
            let mut inner = self.lock();
            match std::mem::take(&mut inner.state) {
                GateState::Awaiting {
                    pending,
                    generation,
                } => {
                    let token = ConfirmedDelete {
                        target_key: pending.target_key.clone(),
                        display_label: pending.display_label.clone(),
                        generation,
                    };
                    inner.state = GateState::Submitting {
                        pending,
                        generation,
                    };
                    Some(token)
                }
                other => {
                    inner.state = other;
                    None
                }
            }
        };
        if token.is_some() {
            self.changes.bump();
        }
        token
    }

    /// Settles a confirmed delete: success closes the dialog, failure puts it
    /// back to awaiting. Ignored if the confirmation was replaced or cancelled
    /// meanwhile.
    pub(crate) fn resolve(&self, token: &ConfirmedDelete, succeeded: bool) {
        let changed = {
            let mut inner = self.lock();
            match std::mem::take(&mut inner.state) {
                GateState::Submitting {
                    pending,
                    generation,
                } if generation == token.generation => {
                    if !succeeded {
                        inner.state = GateState::Awaiting {
                            pending,
                            generation,
                        };
                    }
                    true
                }
                other => {
                    inner.state = other;
                    false
                }
            }
        };
        if changed {
            self.changes.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ConfirmationGate {
        ConfirmationGate::new(ChangeSignal::new())
    }

    #[test]
    fn stores_technical_key_not_label() {
        let g = gate();
        g.open("u3-web", "web");
        let token = g.confirm().unwrap();
        assert_eq!(token.target_key(), "u3-web");
        assert_eq!(token.display_label(), "web");
    }

    #[test]
    fn second_confirm_is_a_no_op() {
        let g = gate();
        g.open("u3-web", "web");
        assert!(g.confirm().is_some());
        assert!(g.confirm().is_none());
        assert!(g.is_submitting());
    }

    #[test]
    fn success_clears_failure_reopens() {
        let g = gate();
        g.open("u3-web", "web");
        let token = g.confirm().unwrap();
        g.resolve(&token, false);
        assert_eq!(g.pending().unwrap().target_key, "u3-web");
        assert!(!g.is_submitting());

        let token = g.confirm().unwrap();
        g.resolve(&token, true);
        assert!(g.pending().is_none());
    }

    #[test]
    fn opening_replaces_and_stale_resolution_is_ignored() {
        let g = gate();
        g.open("u3-web", "web");
        let token = g.confirm().unwrap();
        g.open("u3-db", "db");
        g.resolve(&token, true);
        assert_eq!(g.pending().unwrap().target_key, "u3-db");
    }

    #[test]
    fn cancel_discards() {
        let g = gate();
        assert!(g.cancel().is_none());
        g.open("u3-web", "");
        assert_eq!(g.pending().unwrap().display_label, "u3-web");
        assert!(g.cancel().is_some());
        assert!(g.confirm().is_none());
    }
}
