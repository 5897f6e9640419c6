//! Live event dispatcher.
//!
//! Consumes the live channel's events one at a time and applies each to the
//! store and the chat timeline before looking at the next. Because every poll
//! event goes through `upsert_poll`, created/voted events may arrive in any
//! order and may be replayed.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::LiveEvent;
use crate::lifecycle::{SessionNotice, Shutdown};
use crate::store::{lock_or_recover, SharedStore};
use crate::timeline::{Timeline, TimelineChange};
use crate::transport::ChannelEvent;

pub type SharedTimeline = Arc<Mutex<Timeline>>;

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// The current user was removed; nothing further is processed.
    Removed,
}

pub struct Dispatcher {
    store: SharedStore,
    timeline: SharedTimeline,
    self_id: String,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl Dispatcher {
    pub fn new(
        store: SharedStore,
        timeline: SharedTimeline,
        self_id: impl Into<String>,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            store,
            timeline,
            self_id: self_id.into(),
            notices,
        }
    }

    /// Apply a single live event.
    pub fn apply(&self, event: LiveEvent) -> Dispatch {
        debug!(kind = event.kind(), "dispatching live event");
        let change: TimelineChange = match event {
            LiveEvent::ParticipantRemoved { id, .. } if id == self.self_id => {
                lock_or_recover(&self.store).clear();
                lock_or_recover(&self.timeline).clear();
                let _ = self.notices.send(SessionNotice::Removed);
                return Dispatch::Removed;
            }
            LiveEvent::ParticipantRemoved { id, notice } => {
                lock_or_recover(&self.store).apply_participant_removed(&id);
                self.with_timeline(|t| t.push_system(notice))
            }
            LiveEvent::PollCreated(poll) | LiveEvent::PollVoted(poll) => {
                lock_or_recover(&self.store).upsert_poll(poll.clone());
                self.with_timeline(|t| t.upsert_poll(poll))
            }
            LiveEvent::System { text } => self.with_timeline(|t| t.push_system(text)),
            LiveEvent::Chat { sender, text } => self.with_timeline(|t| t.push_chat(sender, text)),
        };
        let _ = self.notices.send(SessionNotice::Timeline(change));
        Dispatch::Continue
    }

    /// Drain `events` until the channel closes, the current user is removed,
    /// or the receiver ends.
    ///
    /// Self-removal triggers `shutdown`, which also stops the reconciliation
    /// loop and the socket.
    pub async fn run(self, mut events: mpsc::Receiver<ChannelEvent>, shutdown: Shutdown) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Message(ev) => {
                    if self.apply(ev) == Dispatch::Removed {
                        info!("removed from room by host");
                        shutdown.trigger();
                        return;
                    }
                }
                ChannelEvent::Error(e) => {
                    warn!(error = %e, "live channel error");
                    let _ = self.notices.send(SessionNotice::ChannelError(e));
                }
                ChannelEvent::Closed => break,
            }
        }
        let _ = self.notices.send(SessionNotice::ChannelClosed);
    }

    fn with_timeline<T>(&self, f: impl FnOnce(&mut Timeline) -> T) -> T {
        f(&mut lock_or_recover(&self.timeline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Participant, Poll, Room};
    use crate::store::new_shared_store;
    use crate::timeline::TimelineItem;

    fn participant(id: &str, name: &str, is_host: bool) -> Participant {
        Participant {
            id: id.into(),
            name: name.into(),
            preferences: String::new(),
            secret_message: String::new(),
            is_host,
            giftee_id: None,
        }
    }

    fn poll(votes: &[(&str, &str)]) -> Poll {
        Poll {
            id: "p1".into(),
            question: "Gift wrap color?".into(),
            options: vec!["Red".into(), "Green".into()],
            created_by: "A".into(),
            votes: votes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn setup() -> (Dispatcher, SharedStore, SharedTimeline, mpsc::UnboundedReceiver<SessionNotice>) {
        let store = new_shared_store();
        store.lock().unwrap().enter(
            Room {
                code: "ABCD".into(),
                name: String::new(),
                exchange_date: None,
                is_started: false,
                participants: vec![participant("1", "A", true), participant("2", "B", false)],
                polls: Vec::new(),
            },
            participant("2", "B", false),
        );
        let timeline: SharedTimeline = Arc::new(Mutex::new(Timeline::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let d = Dispatcher::new(store.clone(), timeline.clone(), "2", tx);
        (d, store, timeline, rx)
    }

    #[test]
    fn chat_appends_to_timeline() {
        let (d, _store, timeline, mut rx) = setup();
        let out = d.apply(LiveEvent::Chat {
            sender: "A".into(),
            text: "hello".into(),
        });
        assert_eq!(out, Dispatch::Continue);
        assert_eq!(timeline.lock().unwrap().len(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionNotice::Timeline(TimelineChange::Appended(0))
        );
    }

    #[test]
    fn self_removal_is_terminal_and_not_rendered() {
        let (d, store, timeline, mut rx) = setup();
        let out = d.apply(LiveEvent::ParticipantRemoved {
            id: "2".into(),
            notice: "B was removed from the room by the host.".into(),
        });
        assert_eq!(out, Dispatch::Removed);
        assert!(timeline.lock().unwrap().is_empty());
        assert!(!store.lock().unwrap().is_active());
        assert_eq!(rx.try_recv().unwrap(), SessionNotice::Removed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn other_removal_updates_store_and_shows_notice() {
        let (d, store, timeline, _rx) = setup();
        d.apply(LiveEvent::ParticipantRemoved {
            id: "1".into(),
            notice: "A was removed from the room by the host.".into(),
        });
        assert_eq!(store.lock().unwrap().room().unwrap().participants.len(), 1);
        assert!(matches!(
            timeline.lock().unwrap().get(0),
            Some(TimelineItem::System { .. })
        ));
    }

    #[test]
    fn voted_before_created_leaves_one_entry() {
        let (d, store, timeline, _rx) = setup();
        d.apply(LiveEvent::PollVoted(poll(&[("2", "Red")])));
        d.apply(LiveEvent::PollCreated(poll(&[])));
        let store = store.lock().unwrap();
        assert_eq!(store.room().unwrap().polls.len(), 1);
        assert_eq!(timeline.lock().unwrap().len(), 1);
    }

    #[test]
    fn replayed_vote_is_a_no_op() {
        let (d, store, timeline, _rx) = setup();
        d.apply(LiveEvent::PollCreated(poll(&[])));
        d.apply(LiveEvent::PollVoted(poll(&[("2", "Red")])));
        let once = store.lock().unwrap().clone();
        d.apply(LiveEvent::PollVoted(poll(&[("2", "Red")])));
        assert_eq!(*store.lock().unwrap(), once);
        assert_eq!(timeline.lock().unwrap().len(), 1);
    }

    #[test]
    fn self_removal_clears_poisoned_store() {
        let (d, store, timeline, _rx) = setup();
        let s = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = s.lock().unwrap();
            panic!("holder panics");
        })
        .join();
        timeline.lock().unwrap().push_system("x");

        let out = d.apply(LiveEvent::ParticipantRemoved {
            id: "2".into(),
            notice: String::new(),
        });
        assert_eq!(out, Dispatch::Removed);
        assert!(!lock_or_recover(&store).is_active());
        assert!(timeline.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_self_removal_and_triggers_shutdown() {
        let (d, _store, timeline, _rx) = setup();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = Shutdown::new();
        tx.send(ChannelEvent::Message(LiveEvent::ParticipantRemoved {
            id: "2".into(),
            notice: String::new(),
        }))
        .await
        .unwrap();
        tx.send(ChannelEvent::Message(LiveEvent::Chat {
            sender: "A".into(),
            text: "after".into(),
        }))
        .await
        .unwrap();
        d.run(rx, shutdown.clone()).await;
        assert!(shutdown.is_triggered());
        assert!(timeline.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_survives_channel_error() {
        let (d, _store, timeline, mut notices) = setup();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = Shutdown::new();
        tx.send(ChannelEvent::Error("reset".into())).await.unwrap();
        tx.send(ChannelEvent::Message(LiveEvent::System { text: "x".into() }))
            .await
            .unwrap();
        tx.send(ChannelEvent::Closed).await.unwrap();
        d.run(rx, shutdown.clone()).await;
        assert!(!shutdown.is_triggered());
        assert_eq!(timeline.lock().unwrap().len(), 1);
        assert_eq!(
            notices.recv().await.unwrap(),
            SessionNotice::ChannelError("reset".into())
        );
    }
}
