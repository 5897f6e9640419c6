//! Local room state cache.
//!
//! ## Design
//! - `RoomStore` holds the last server-confirmed `Room` and the current user.
//! - `SharedStore`: Arc<Mutex<RoomStore>>, shared by the session, the live
//!   event dispatcher and the reconciliation loop.
//! - Every operation runs under one lock acquisition, so readers never see a
//!   half-applied update.
//!
//! ## Lifecycle
//! 1. `enter` after a successful create / join
//! 2. `replace_room`, `upsert_poll`, `apply_participant_removed` while active
//! 3. `clear` on leave, room deletion, or removal of the current user

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::model::{Participant, Poll, Room};

/// Shared store handle.
pub type SharedStore = Arc<Mutex<RoomStore>>;

/// Create an empty shared store.
pub fn new_shared_store() -> SharedStore {
    Arc::new(Mutex::new(RoomStore::default()))
}

/// Lock `m`, taking the data over if a previous holder panicked.
///
/// Store and timeline mutations never leave their data half-written, so the
/// state behind a poisoned lock is still usable.
pub fn lock_or_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| {
        warn!("lock poisoned by a panicked holder, recovering");
        poisoned.into_inner()
    })
}

/// What an [`RoomStore::upsert_poll`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollUpsert {
    Inserted,
    Replaced,
    /// No room is active.
    Ignored,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoomStore {
    room: Option<Room>,
    current_user: Option<Participant>,
}

impl RoomStore {
    /// Start caching `room` as seen by `user`.
    pub fn enter(&mut self, room: Room, user: Participant) {
        self.room = Some(dedup(room));
        self.current_user = Some(user);
        self.refresh_current_user();
    }

    /// Swap in a freshly pulled snapshot.
    ///
    /// Ignored (returns `false`) when no room is active or the snapshot is for
    /// a different room, so a pull that lands after teardown cannot revive a
    /// room we already left.
    pub fn replace_room(&mut self, room: Room) -> bool {
        match &self.room {
            Some(current) if current.code == room.code => {
                self.room = Some(dedup(room));
                self.refresh_current_user();
                true
            }
            _ => false,
        }
    }

    /// Drop a participant from the cached list. Returns whether one was removed.
    pub fn apply_participant_removed(&mut self, id: &str) -> bool {
        let Some(room) = self.room.as_mut() else {
            return false;
        };
        let before = room.participants.len();
        room.participants.retain(|p| p.id != id);
        room.participants.len() != before
    }

    /// Insert `poll`, or replace the entry with the same id in place.
    pub fn upsert_poll(&mut self, poll: Poll) -> PollUpsert {
        let Some(room) = self.room.as_mut() else {
            return PollUpsert::Ignored;
        };
        match room.polls.iter_mut().find(|p| p.id == poll.id) {
            Some(existing) => {
                *existing = poll;
                PollUpsert::Replaced
            }
            None => {
                room.polls.push(poll);
                PollUpsert::Inserted
            }
        }
    }

    /// Record the server-confirmed draw result.
    pub fn apply_game_started(&mut self, participants: Vec<Participant>) {
        if let Some(room) = self.room.as_mut() {
            room.participants = participants;
            room.is_started = true;
            dedup_participants(&mut room.participants);
        }
        self.refresh_current_user();
    }

    pub fn clear(&mut self) {
        self.room = None;
        self.current_user = None;
    }

    /// Whether the cached participant list still contains the current user.
    ///
    /// `false` while active means the user was removed and teardown is due.
    pub fn current_user_listed(&self) -> bool {
        match (&self.room, &self.current_user) {
            (Some(room), Some(user)) => room.participant(&user.id).is_some(),
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.room.is_some()
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn current_user(&self) -> Option<&Participant> {
        self.current_user.as_ref()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room.as_ref().map(|r| r.code.as_str())
    }

    pub fn is_host(&self) -> bool {
        self.current_user.as_ref().is_some_and(|u| u.is_host)
    }

    pub fn poll(&self, id: &str) -> Option<&Poll> {
        self.room.as_ref()?.polls.iter().find(|p| p.id == id)
    }

    /// The participant the current user gives a gift to, once drawn.
    pub fn my_match(&self) -> Option<&Participant> {
        let room = self.room.as_ref()?;
        if !room.is_started {
            return None;
        }
        let giftee = self.current_user.as_ref()?.giftee_id.as_deref()?;
        room.participant(giftee)
    }

    /// Re-read the current user from the participant list by id.
    ///
    /// Keeps the old snapshot when the user is missing from the list; that only
    /// happens between self-removal and teardown.
    fn refresh_current_user(&mut self) {
        let (Some(room), Some(user)) = (self.room.as_ref(), self.current_user.as_mut()) else {
            return;
        };
        if let Some(fresh) = room.participant(&user.id) {
            *user = fresh.clone();
        }
    }
}

fn dedup(mut room: Room) -> Room {
    dedup_participants(&mut room.participants);
    // Last snapshot of a poll wins, at the position it first appeared.
    let mut polls: Vec<Poll> = Vec::with_capacity(room.polls.len());
    for poll in room.polls {
        match polls.iter_mut().find(|p| p.id == poll.id) {
            Some(existing) => *existing = poll,
            None => polls.push(poll),
        }
    }
    room.polls = polls;
    room
}

fn dedup_participants(participants: &mut Vec<Participant>) {
    let mut seen = HashSet::new();
    participants.retain(|p| seen.insert(p.id.clone()));
}
