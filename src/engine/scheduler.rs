use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::session::SessionGuard;
use super::ChangeSignal;
use crate::api::{ApiError, FleetApi};
use crate::models::{
    BillingStatement, FleetView, Flavor, Host, Image, Instance, InstanceMetrics, UserAccount,
};

/// One polled collection of remote entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feed {
    Instances,
    Metrics,
    Hosts,
    Flavors,
    Images,
    AvailableImages,
    Users,
    Billing,
}

impl Feed {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Instances => "instances",
            Self::Metrics => "metrics",
            Self::Hosts => "hosts",
            Self::Flavors => "flavors",
            Self::Images => "images",
            Self::AvailableImages => "available-images",
            Self::Users => "users",
            Self::Billing => "billing",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

enum FeedData {
    Instances(Vec<Instance>),
    Metrics(Vec<InstanceMetrics>),
    Hosts(Vec<Host>),
    Flavors(Vec<Flavor>),
    Images(Vec<Image>),
    AvailableImages(Vec<Image>),
    Users(Vec<UserAccount>),
    Billing(BillingStatement),
}

impl FeedData {
    /// Replaces the feed's slice of the view wholesale.
    fn apply(self, view: &mut FleetView) {
        match self {
            Self::Instances(v) => view.instances = v,
            Self::Metrics(v) => view.metrics = v,
            Self::Hosts(v) => view.hosts = v,
            Self::Flavors(v) => view.flavors = v,
            Self::Images(v) => view.images = v,
            Self::AvailableImages(v) => view.available_images = v,
            Self::Users(v) => view.users = v,
            Self::Billing(v) => view.billing = v,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    Applied { seq: u64 },
    /// A newer request for the same feed was issued after this one.
    Stale { seq: u64 },
    /// A cadence tick found the feed already in flight.
    Skipped,
    Failed(ApiError),
    /// The session is gone or the scheduler was shut down.
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct FeedState {
    issued: u64,
    applied: u64,
    in_flight: usize,
}

/// Runs the per-feed refresh loops and applies responses in issue order.
///
/// Cheap to clone; all clones drive the same timers and view.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    api: Arc<dyn FleetApi>,
    guard: SessionGuard,
    view: Arc<Mutex<FleetView>>,
    feeds: Mutex<HashMap<Feed, FeedState>>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    stopped: AtomicBool,
    changes: ChangeSignal,
}

/// Marks a feed busy for as long as it lives; released on every exit path.
struct InFlight {
    inner: Arc<SchedulerInner>,
    feed: Feed,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut feeds = self.inner.lock_feeds();
        if let Some(state) = feeds.get_mut(&self.feed) {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

impl SchedulerInner {
    fn lock_feeds(&self) -> MutexGuard<'_, HashMap<Feed, FeedState>> {
        self.feeds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_view(&self) -> MutexGuard<'_, FleetView> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.guard.is_active()
    }
}

impl PollScheduler {
    pub fn new(api: Arc<dyn FleetApi>, guard: SessionGuard, changes: ChangeSignal) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                api,
                guard,
                view: Arc::new(Mutex::new(FleetView::default())),
                feeds: Mutex::new(HashMap::new()),
                tasks: Mutex::new(HashMap::new()),
                stopped: AtomicBool::new(false),
                changes,
            }),
        }
    }

    /// Copy of the current view.
    pub fn view(&self) -> FleetView {
        self.inner.lock_view().clone()
    }

    /// Reads the view without cloning it.
    pub fn with_view<R>(&self, f: impl FnOnce(&FleetView) -> R) -> R {
        f(&self.inner.lock_view())
    }

    /// Display label for a technical name, falling back to the name itself.
    pub fn label_for(&self, technical_name: &str) -> String {
        self.with_view(|view| {
            view.instance(technical_name)
                .map(|vm| vm.label().to_string())
                .unwrap_or_else(|| technical_name.to_string())
        })
    }

    pub fn last_applied(&self, feed: Feed) -> u64 {
        self.inner
            .lock_feeds()
            .get(&feed)
            .map(|s| s.applied)
            .unwrap_or(0)
    }

    pub fn in_flight(&self, feed: Feed) -> bool {
        self.inner
            .lock_feeds()
            .get(&feed)
            .map(|s| s.in_flight > 0)
            .unwrap_or(false)
    }

    /// Cadence-driven refresh: skipped while the feed is already in flight.
    pub async fn tick(&self, feed: Feed) -> RefreshOutcome {
        self.issue(feed, false).await
    }

    /// User-triggered refresh: ignores cadence and in-flight state, but its
    /// response is still dropped if a newer one was issued.
    pub async fn refresh(&self, feed: Feed) -> RefreshOutcome {
        self.issue(feed, true).await
    }

    async fn issue(&self, feed: Feed, manual: bool) -> RefreshOutcome {
        if !self.inner.is_live() {
            return RefreshOutcome::Cancelled;
        }
        let (seq, _in_flight) = {
            let mut feeds = self.inner.lock_feeds();
            let state = feeds.entry(feed).or_default();
            if !manual && state.in_flight > 0 {
                tracing::debug!(%feed, "Refresh still in flight, skipping tick");
                return RefreshOutcome::Skipped;
            }
            state.issued += 1;
            state.in_flight += 1;
            (
                state.issued,
                InFlight {
                    inner: Arc::clone(&self.inner),
                    feed,
                },
            )
        };

        match self.fetch(feed).await {
            Ok(data) => self.apply(feed, seq, data),
            Err(e) if e.ends_session() => RefreshOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(%feed, seq, error = %e, "Poll failed, keeping previous data");
                RefreshOutcome::Failed(e)
            }
        }
    }

    async fn fetch(&self, feed: Feed) -> Result<FeedData, ApiError> {
        let api = Arc::clone(&self.inner.api);
        self.inner
            .guard
            .run(move |token| async move {
                let token = token.as_deref();
                Ok(match feed {
                    Feed::Instances => FeedData::Instances(api.list_instances(token).await?),
                    Feed::Metrics => FeedData::Metrics(api.list_metrics(token).await?),
                    Feed::Hosts => FeedData::Hosts(api.list_hosts(token).await?),
                    Feed::Flavors => FeedData::Flavors(api.list_flavors(token).await?),
                    Feed::Images => FeedData::Images(api.list_images(token).await?),
                    Feed::AvailableImages => {
                        FeedData::AvailableImages(api.list_available_images(token).await?)
                    }
                    Feed::Users => FeedData::Users(api.list_users(token).await?),
                    Feed::Billing => FeedData::Billing(api.list_billing(token).await?),
                })
            })
            .await
    }

    fn apply(&self, feed: Feed, seq: u64, data: FeedData) -> RefreshOutcome {
        {
            let mut feeds = self.inner.lock_feeds();
            let state = feeds.entry(feed).or_default();
            if seq != state.issued {
                tracing::debug!(%feed, seq, latest = state.issued, "Discarding stale response");
                return RefreshOutcome::Stale { seq };
            }
            if !self.inner.is_live() {
                return RefreshOutcome::Cancelled;
            }
            data.apply(&mut self.inner.lock_view());
            state.applied = seq;
        }
        self.inner.changes.bump();
        RefreshOutcome::Applied { seq }
    }

    fn spawn_named<F>(&self, name: String, body: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        if !self.inner.is_live() {
            tracing::debug!(task = %name, "Scheduler stopped, not scheduling");
            return;
        }
        let cancelled = self.inner.guard.cancelled();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled => tracing::debug!(task = %task_name, "Cancelled by session teardown"),
                _ = body => {}
            }
        });
        let mut tasks = self.inner.lock_tasks();
        tasks.retain(|_, h| !h.is_finished());
        if let Some(previous) = tasks.insert(name, handle) {
            previous.abort();
        }
    }

    /// Starts the repeating loop for `feed`. The first refresh happens one
    /// cadence from now; missed ticks are skipped, not bunched.
    pub fn every(&self, feed: Feed, cadence: Duration) {
        let scheduler = self.clone();
        self.spawn_named(format!("poll:{}", feed), async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + cadence, cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Ticks keep firing while a request is out; each one decides for
            // itself whether to send or skip.
            let mut requests = FuturesUnordered::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => requests.push(scheduler.tick(feed)),
                    Some(outcome) = requests.next(), if !requests.is_empty() => {
                        tracing::trace!(%feed, ?outcome, "Poll finished");
                    }
                }
            }
        });
    }

    /// One out-of-cadence refresh after `delay`. Rescheduling the same name
    /// replaces the earlier request.
    pub fn schedule_refresh(&self, name: &str, feed: Feed, delay: Duration) {
        let scheduler = self.clone();
        self.spawn_named(name.to_string(), async move {
            tokio::time::sleep(delay).await;
            scheduler.refresh(feed).await;
        });
    }

    /// A bounded run of `count` ticks spaced by `spacing`, then stops.
    pub fn schedule_burst(&self, name: &str, feed: Feed, count: u32, spacing: Duration) {
        let scheduler = self.clone();
        self.spawn_named(name.to_string(), async move {
            for _ in 0..count {
                tokio::time::sleep(spacing).await;
                scheduler.tick(feed).await;
            }
        });
    }

    /// Names of timers that are still scheduled.
    pub fn active_tasks(&self) -> Vec<String> {
        let mut tasks = self.inner.lock_tasks();
        tasks.retain(|_, h| !h.is_finished());
        let mut names: Vec<String> = tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancels every timer. Further scheduling and refreshes become no-ops.
    pub fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let drained: Vec<(String, JoinHandle<()>)> = self.inner.lock_tasks().drain().collect();
        for (name, handle) in drained {
            tracing::debug!(task = %name, "Stopping timer");
            handle.abort();
        }
    }
}
