//! # Reconciliation loop
//!
//! Pulls the full room from the backend on a fixed interval and swaps it into
//! the store, correcting whatever drift missed or late live events left
//! behind.
//!
//! The loop is also the authoritative detector of room deletion: a pull that
//! comes back "not found" clears the store, tells the UI the host closed the
//! room, fires the room's teardown signal and ends the loop. Any other
//! failure is logged and retried on the next tick.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handle = Reconciler::builder(api, store, "ABCD")
//!     .timeline(timeline)
//!     .notices(tx)
//!     .shutdown(shutdown)
//!     .interval(Duration::from_secs(3))
//!     .build()
//!     .spawn();
//! // later
//! handle.stop();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatch::SharedTimeline;
use crate::lifecycle::{SessionNotice, Shutdown};
use crate::store::{lock_or_recover, SharedStore};
use crate::timeline::TimelineChange;
use crate::transport::RoomApi;

/// Default time between pulls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Consecutive failures after which each further failure is logged at `error`.
const ESCALATE_AFTER: u32 = 5;

/// Outcome of one pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The snapshot was swapped in.
    Refreshed,
    /// The pull succeeded but the store had already moved on (left the room).
    Discarded,
    /// Transient failure; try again next tick.
    Failed,
    /// The room is gone. The loop must stop.
    RoomGone,
    /// The pull no longer lists the current user. The loop must stop.
    Removed,
}

impl Tick {
    /// Whether the room entry is over and the loop must end.
    pub fn is_terminal(self) -> bool {
        matches!(self, Tick::RoomGone | Tick::Removed)
    }
}

pub struct Reconciler<A> {
    api: Arc<A>,
    store: SharedStore,
    timeline: Option<SharedTimeline>,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    shutdown: Shutdown,
    code: String,
    interval: Duration,
    consecutive_failures: u32,
}

impl<A: RoomApi> Reconciler<A> {
    pub fn builder(api: Arc<A>, store: SharedStore, code: impl Into<String>) -> ReconcilerBuilder<A> {
        ReconcilerBuilder {
            api,
            store,
            code: code.into(),
            timeline: None,
            notices: None,
            shutdown: None,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Pull once and merge the result.
    ///
    /// On a terminal tick the store is already cleared and the notice sent;
    /// the caller only has to stop. Nothing is cleared once the store has
    /// moved on to another room.
    pub async fn tick(&mut self) -> Tick {
        match self.api.fetch_room(&self.code).await {
            Ok(room) => {
                self.consecutive_failures = 0;
                let polls = room.polls.clone();
                let (applied, listed) = {
                    let mut store = lock_or_recover(&self.store);
                    let applied = store.replace_room(room);
                    (applied, store.current_user_listed())
                };
                if !applied {
                    debug!(room = %self.code, "discarding pull for inactive room");
                    return Tick::Discarded;
                }
                if !listed {
                    if !self.end_room(SessionNotice::Removed) {
                        return Tick::Discarded;
                    }
                    info!(room = %self.code, "no longer a participant, stopping reconciliation");
                    return Tick::Removed;
                }
                self.sync_poll_cards(polls);
                self.notify(SessionNotice::RoomRefreshed);
                Tick::Refreshed
            }
            Err(e) if e.is_not_found() => {
                if !self.end_room(SessionNotice::RoomClosed) {
                    debug!(room = %self.code, "room gone but store moved on, discarding");
                    return Tick::Discarded;
                }
                info!(room = %self.code, "room no longer exists, stopping reconciliation");
                Tick::RoomGone
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= ESCALATE_AFTER {
                    error!(
                        error = %e,
                        room = %self.code,
                        consecutive_failures = self.consecutive_failures,
                        "room pull failed repeatedly, will retry next tick"
                    );
                } else {
                    warn!(error = %e, room = %self.code, "room pull failed, will retry next tick");
                }
                Tick::Failed
            }
        }
    }

    /// Run until the room is gone or teardown is requested.
    ///
    /// The first pull happens one interval after start.
    pub async fn run(mut self) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stop = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = stop.wait() => {
                    debug!(room = %self.code, "reconciliation stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if self.tick().await.is_terminal() {
                        self.shutdown.trigger();
                        return;
                    }
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self) -> ReconcileHandle {
        ReconcileHandle {
            task: tokio::spawn(self.run()),
        }
    }

    /// Polls that only arrived through the pull still get a card.
    fn sync_poll_cards(&self, polls: Vec<crate::model::Poll>) {
        let Some(timeline) = &self.timeline else {
            return;
        };
        let changes: Vec<TimelineChange> = {
            let mut t = lock_or_recover(timeline);
            polls.into_iter().map(|p| t.upsert_poll(p)).collect()
        };
        for change in changes {
            self.notify(SessionNotice::Timeline(change));
        }
    }

    /// Clear the store and timeline for this room and send `notice`.
    ///
    /// Returns `false`, touching nothing, when the store no longer holds
    /// this room.
    fn end_room(&self, notice: SessionNotice) -> bool {
        {
            let mut store = lock_or_recover(&self.store);
            if store.room_code() != Some(self.code.as_str()) {
                return false;
            }
            store.clear();
        }
        if let Some(timeline) = &self.timeline {
            lock_or_recover(timeline).clear();
        }
        self.notify(notice);
        true
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }
}

/// Builder for [`Reconciler`].
pub struct ReconcilerBuilder<A> {
    api: Arc<A>,
    store: SharedStore,
    code: String,
    timeline: Option<SharedTimeline>,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    shutdown: Option<Shutdown>,
    interval: Duration,
}

impl<A: RoomApi> ReconcilerBuilder<A> {
    /// Keep poll cards in this timeline in step with pulled polls.
    pub fn timeline(mut self, timeline: SharedTimeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn notices(mut self, tx: mpsc::UnboundedSender<SessionNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Teardown signal shared with the live channel. A fresh one is created
    /// when none is given.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Override the pull interval (default 3 s).
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn build(self) -> Reconciler<A> {
        Reconciler {
            api: self.api,
            store: self.store,
            timeline: self.timeline,
            notices: self.notices,
            shutdown: self.shutdown.unwrap_or_default(),
            code: self.code,
            interval: self.interval,
            consecutive_failures: 0,
        }
    }
}

/// Handle to a spawned reconciliation loop.
#[derive(Debug)]
pub struct ReconcileHandle {
    task: JoinHandle<()>,
}

impl ReconcileHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end on its own.
    pub async fn join(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for ReconcileHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
