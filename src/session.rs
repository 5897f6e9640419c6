//! Client session: one user's view of one room at a time.
//!
//! ## Room lifecycle
//! 1. `create_room` / `join_room` → server-confirmed room and user
//! 2. `enter` seeds the store and timeline, opens the live channel, spawns
//!    the dispatcher and the reconciliation loop, all tied to one
//!    [`Shutdown`] signal
//! 3. user actions (`send_chat`, `create_poll`, `vote`, `start_game`, ...)
//!    go through the API; the store only changes on server confirmation
//! 4. `leave` fires the signal, closes the channel, stops the loop and clears
//!    local state. Self-removal and room deletion fire the same signal from
//!    the dispatcher and the loop respectively.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::dispatch::{Dispatcher, SharedTimeline};
use crate::error::{Result, SantaError};
use crate::lifecycle::{SessionNotice, Shutdown};
use crate::model::{
    self, CreatePollRequest, CreateRoomRequest, JoinRequest, Participant, Poll, Room, VoteRequest,
};
use crate::reconcile::{ReconcileHandle, Reconciler};
use crate::store::{lock_or_recover, new_shared_store, SharedStore};
use crate::timeline::{Timeline, TimelineItem};
use crate::transport::{ApiClient, LiveChannel, RoomApi};

/// Minimum number of non-blank options a poll needs.
pub const MIN_POLL_OPTIONS: usize = 2;

/// Everything that lives exactly as long as one room entry.
struct ActiveRoom {
    shutdown: Shutdown,
    channel: Option<LiveChannel>,
    dispatcher: Option<JoinHandle<()>>,
    reconciler: ReconcileHandle,
}

impl ActiveRoom {
    /// Stop everything together.
    async fn teardown(self) {
        self.shutdown.trigger();
        self.reconciler.stop();
        if let Some(channel) = self.channel {
            channel.close().await;
        }
        if let Some(dispatcher) = self.dispatcher {
            dispatcher.abort();
        }
    }
}

pub struct Session<A: RoomApi = ApiClient> {
    api: Arc<A>,
    config: ClientConfig,
    store: SharedStore,
    timeline: SharedTimeline,
    notices: mpsc::UnboundedSender<SessionNotice>,
    active: Option<ActiveRoom>,
}

impl Session<ApiClient> {
    /// Session talking HTTP to `config.api_base`.
    pub fn connect(config: ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<SessionNotice>)> {
        let api = ApiClient::new(&config)?;
        Ok(Self::new(api, config))
    }
}

impl<A: RoomApi> Session<A> {
    pub fn new(api: A, config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<SessionNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            api: Arc::new(api),
            config,
            store: new_shared_store(),
            timeline: Arc::new(Mutex::new(Timeline::new())),
            notices: tx,
            active: None,
        };
        (session, rx)
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    // -----------------------------------------------------------------------
    // Entering and leaving
    // -----------------------------------------------------------------------

    /// Create a room as its host and enter it.
    pub async fn create_room(&mut self, req: CreateRoomRequest) -> Result<Room> {
        if req.host_name.trim().is_empty() {
            return Err(SantaError::Validation("Please enter your name".into()));
        }
        let req = CreateRoomRequest {
            room_name: req.room_name.trim().to_string(),
            exchange_date: req.exchange_date.filter(|d| !d.trim().is_empty()),
            host_name: req.host_name.trim().to_string(),
            host_preferences: req.host_preferences.trim().to_string(),
            host_secret_message: req.host_secret_message.trim().to_string(),
        };
        let room = self.api.create_room(&req).await?;
        let host = room
            .host()
            .or_else(|| room.participants.first())
            .cloned()
            .ok_or_else(|| SantaError::Validation("server returned a room without a host".into()))?;
        info!(room = %room.code, "room created");
        self.enter(room.clone(), host).await;
        Ok(room)
    }

    /// Join an existing room by code (or share link) and enter it.
    pub async fn join_room(&mut self, req: JoinRequest) -> Result<Room> {
        let code = model::code_from_link(&req.room_code).unwrap_or_default();
        if code.is_empty() || req.name.trim().is_empty() {
            return Err(SantaError::Validation("Please fill in all fields".into()));
        }
        let req = JoinRequest {
            room_code: code.clone(),
            name: req.name.trim().to_string(),
            preferences: req.preferences.trim().to_string(),
            secret_message: req.secret_message.trim().to_string(),
        };
        let me = self.api.join_room(&req).await?;
        let room = self.api.fetch_room(&code).await?;
        info!(room = %room.code, "joined room");
        self.enter(room.clone(), me).await;
        Ok(room)
    }

    /// Start syncing `room` as `user`.
    ///
    /// Any previous room entry is torn down first, so at most one channel and
    /// one reconciliation loop exist per session.
    pub async fn enter(&mut self, room: Room, user: Participant) {
        self.leave().await;

        let code = room.code.clone();
        let user_id = user.id.clone();
        let user_name = user.name.clone();
        let polls = room.polls.clone();

        lock_or_recover(&self.store).enter(room, user);
        {
            let mut timeline = lock_or_recover(&self.timeline);
            timeline.clear();
            for poll in polls {
                timeline.upsert_poll(poll);
            }
        }

        let shutdown = Shutdown::new();
        let (channel, dispatcher) =
            match LiveChannel::open(&self.config.ws_base(), &code, &user_name, shutdown.subscribe()).await {
                Ok((channel, events)) => {
                    let dispatcher = Dispatcher::new(
                        Arc::clone(&self.store),
                        Arc::clone(&self.timeline),
                        user_id,
                        self.notices.clone(),
                    );
                    let task = tokio::spawn(dispatcher.run(events, shutdown.clone()));
                    (Some(channel), Some(task))
                }
                Err(e) => {
                    // The lobby still works off reconciliation; chat is unavailable.
                    warn!(error = %e, room = %code, "could not open live channel");
                    let _ = self.notices.send(SessionNotice::ChannelError(e.to_string()));
                    (None, None)
                }
            };

        let reconciler = Reconciler::builder(Arc::clone(&self.api), Arc::clone(&self.store), code)
            .timeline(Arc::clone(&self.timeline))
            .notices(self.notices.clone())
            .shutdown(shutdown.clone())
            .interval(self.config.poll_interval)
            .build()
            .spawn();

        self.active = Some(ActiveRoom {
            shutdown,
            channel,
            dispatcher,
            reconciler,
        });
    }

    /// Leave the room view: stop the loop, close the channel, drop local state.
    pub async fn leave(&mut self) {
        if let Some(active) = self.active.take() {
            active.teardown().await;
            info!("left room");
        }
        lock_or_recover(&self.store).clear();
        lock_or_recover(&self.timeline).clear();
    }

    /// Whether a room entry is live: entered, and neither deleted nor removed.
    pub fn is_in_room(&self) -> bool {
        let live = self
            .active
            .as_ref()
            .is_some_and(|a| !a.shutdown.is_triggered());
        live && lock_or_recover(&self.store).is_active()
    }

    pub fn is_channel_open(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|a| a.channel.as_ref())
            .is_some_and(|c| c.is_open())
    }

    pub fn is_reconciling(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.reconciler.is_finished())
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn room(&self) -> Option<Room> {
        lock_or_recover(&self.store).room().cloned()
    }

    pub fn current_user(&self) -> Option<Participant> {
        lock_or_recover(&self.store).current_user().cloned()
    }

    /// The giftee of the current user, once the draw has happened.
    pub fn my_match(&self) -> Option<Participant> {
        lock_or_recover(&self.store).my_match().cloned()
    }

    pub fn timeline(&self) -> Vec<TimelineItem> {
        lock_or_recover(&self.timeline).items().to_vec()
    }

    pub fn share_link(&self) -> Option<String> {
        let code = lock_or_recover(&self.store).room_code()?.to_string();
        Some(model::share_link(&self.config.web_base(), &code))
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Pull the room now instead of waiting for the next tick.
    ///
    /// A pull that no longer lists the current user ends the entry the same
    /// way a removal push does, and returns [`SantaError::NotInRoom`].
    pub async fn refresh(&self) -> Result<Room> {
        let (code, _) = self.require_room()?;
        let room = self.api.fetch_room(&code).await?;
        let removed = {
            let mut store = lock_or_recover(&self.store);
            let removed = store.replace_room(room.clone()) && !store.current_user_listed();
            if removed {
                store.clear();
            }
            removed
        };
        if removed {
            info!(room = %code, "no longer a participant");
            lock_or_recover(&self.timeline).clear();
            if let Some(active) = &self.active {
                active.shutdown.trigger();
            }
            let _ = self.notices.send(SessionNotice::Removed);
            return Err(SantaError::NotInRoom);
        }
        Ok(room)
    }

    pub fn send_chat(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SantaError::Validation("message is empty".into()));
        }
        self.require_room()?;
        let channel = self
            .active
            .as_ref()
            .and_then(|a| a.channel.as_ref())
            .ok_or_else(|| SantaError::Channel("live channel is not connected".into()))?;
        channel.send(text)
    }

    /// Ask the server to create a poll. Blank options are dropped.
    pub async fn create_poll(&self, question: &str, options: &[String]) -> Result<Poll> {
        let question = question.trim();
        let options: Vec<String> = options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if question.is_empty() || options.len() < MIN_POLL_OPTIONS {
            return Err(SantaError::Validation(
                "Please enter a question and at least 2 options".into(),
            ));
        }
        let (code, me) = self.require_room()?;
        let req = CreatePollRequest {
            question: question.to_string(),
            options,
            creator_name: me.name,
        };
        let poll = self.api.create_poll(&code, &req).await?;
        self.show_poll(poll.clone());
        Ok(poll)
    }

    /// Vote for `option`; a second vote by the same user replaces the first.
    pub async fn vote(&self, poll_id: &str, option: &str) -> Result<()> {
        let (code, me) = self.require_room()?;
        let known = lock_or_recover(&self.store)
            .poll(poll_id)
            .map(|p| p.options.clone());
        if let Some(options) = known {
            if !options.iter().any(|o| o == option) {
                return Err(SantaError::Validation(format!("'{option}' is not an option")));
            }
        }
        let req = VoteRequest {
            option: option.to_string(),
            voter_id: me.id,
        };
        self.api.vote_poll(&code, poll_id, &req).await
    }

    /// Run the draw. Host only, once.
    pub async fn start_game(&self) -> Result<Option<Participant>> {
        let code = self.require_host()?;
        if self.room().is_some_and(|r| r.is_started) {
            return Err(SantaError::AlreadyStarted);
        }
        let resp = self.api.start_game(&code).await?;
        lock_or_recover(&self.store).apply_game_started(resp.participants);
        info!(room = %code, "draw complete");
        Ok(self.my_match())
    }

    /// Remove another participant before the draw. Host only.
    pub async fn remove_participant(&self, participant_id: &str) -> Result<()> {
        let code = self.require_host()?;
        if self.room().is_some_and(|r| r.is_started) {
            return Err(SantaError::AlreadyStarted);
        }
        if self.current_user().is_some_and(|u| u.id == participant_id) {
            return Err(SantaError::Validation("the host cannot remove themselves".into()));
        }
        self.api.remove_participant(&code, participant_id).await?;
        lock_or_recover(&self.store).apply_participant_removed(participant_id);
        if let Err(e) = self.refresh().await {
            warn!(error = %e, room = %code, "refresh after removal failed");
        }
        Ok(())
    }

    /// Delete the room on the server and leave it. Host only.
    pub async fn close_room(&mut self) -> Result<()> {
        let code = self.require_host()?;
        self.api.delete_room(&code).await?;
        info!(room = %code, "room closed");
        self.leave().await;
        Ok(())
    }

    fn show_poll(&self, poll: Poll) {
        lock_or_recover(&self.store).upsert_poll(poll.clone());
        let change = lock_or_recover(&self.timeline).upsert_poll(poll);
        let _ = self.notices.send(SessionNotice::Timeline(change));
    }

    fn require_room(&self) -> Result<(String, Participant)> {
        let store = lock_or_recover(&self.store);
        match (store.room_code(), store.current_user()) {
            (Some(code), Some(me)) => Ok((code.to_string(), me.clone())),
            _ => Err(SantaError::NotInRoom),
        }
    }

    fn require_host(&self) -> Result<String> {
        let (code, me) = self.require_room()?;
        if !me.is_host {
            return Err(SantaError::NotHost);
        }
        Ok(code)
    }
}

impl<A: RoomApi> Drop for Session<A> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.shutdown.trigger();
            active.reconciler.stop();
            if let Some(dispatcher) = active.dispatcher {
                dispatcher.abort();
            }
            // LiveChannel's own Drop aborts the socket task.
        }
    }
}
