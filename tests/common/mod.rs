//! Shared harness: an in-memory room backend plus a local WebSocket server
//! that broadcasts the same frames the real backend sends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use santa_sync::model::*;
use santa_sync::transport::RoomApi;
use santa_sync::{ClientConfig, Result, SantaError};

// ---------------------------------------------------------------------------
// WebSocket server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WsServer {
    pub addr: std::net::SocketAddr,
    bcast: broadcast::Sender<String>,
    open: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl WsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (bcast, _) = broadcast::channel(256);
        let server = Self {
            addr,
            bcast,
            open: Arc::new(AtomicUsize::new(0)),
            paths: Arc::new(Mutex::new(Vec::new())),
        };
        let s = server.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(s.clone().serve(stream));
            }
        });
        server
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Broadcast a raw frame to every connected client.
    pub fn push(&self, frame: serde_json::Value) {
        let _ = self.bcast.send(frame.to_string());
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    async fn serve(self, stream: tokio::net::TcpStream) {
        let (path_tx, mut path_rx) = mpsc::unbounded_channel();
        let callback = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
            let _ = path_tx.send(req.uri().path().to_string());
            Ok(resp)
        };
        let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            return;
        };
        let path = path_rx.recv().await.unwrap_or_default();
        let user = path.rsplit('/').next().unwrap_or_default().replace("%20", " ");
        self.paths.lock().unwrap().push(path);

        let (mut sink, mut stream) = ws.split();
        let mut rx = self.bcast.subscribe();
        self.open.fetch_add(1, Ordering::SeqCst);
        self.push(serde_json::json!({
            "sender": "System",
            "message": format!("{user} joined the chat."),
            "type": "system",
        }));

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let body: serde_json::Value =
                            serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
                        let message = body["message"].as_str().unwrap_or(&text).to_string();
                        self.push(serde_json::json!({
                            "sender": user,
                            "message": message,
                            "type": "chat",
                        }));
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
                out = rx.recv() => match out {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Room backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BackendState {
    rooms: HashMap<String, Room>,
    next_id: usize,
}

/// In-memory backend mirroring the HTTP API's rules.
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
    fetches: Arc<AtomicUsize>,
    fail_fetches: Arc<AtomicUsize>,
    ws: Option<WsServer>,
}

impl FakeBackend {
    pub fn new(ws: Option<WsServer>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState::default())),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_fetches: Arc::new(AtomicUsize::new(0)),
            ws,
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make the next `n` fetches fail with a 500.
    pub fn fail_next_fetches(&self, n: usize) {
        self.fail_fetches.store(n, Ordering::SeqCst);
    }

    pub fn room(&self, code: &str) -> Option<Room> {
        self.state.lock().unwrap().rooms.get(code).cloned()
    }

    /// Delete a room behind the client's back.
    pub fn drop_room(&self, code: &str) {
        self.state.lock().unwrap().rooms.remove(code);
    }

    /// Add a participant directly, as another client joining would.
    pub fn add_participant(&self, code: &str, name: &str) -> Participant {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let p = participant(&st.next_id.to_string(), name, false);
        st.rooms.get_mut(code).unwrap().participants.push(p.clone());
        p
    }

    /// Remove a participant without any live notice, as if the push was lost.
    pub fn drop_participant(&self, code: &str, id: &str) {
        let mut st = self.state.lock().unwrap();
        if let Some(room) = st.rooms.get_mut(code) {
            room.participants.retain(|p| p.id != id);
        }
    }

    fn broadcast(&self, frame: serde_json::Value) {
        if let Some(ws) = &self.ws {
            ws.push(frame);
        }
    }
}

pub fn participant(id: &str, name: &str, is_host: bool) -> Participant {
    Participant {
        id: id.into(),
        name: name.into(),
        preferences: String::new(),
        secret_message: String::new(),
        is_host,
        giftee_id: None,
    }
}

fn room_not_found() -> SantaError {
    SantaError::not_found("Room not found")
}

fn bad_request(message: &str) -> SantaError {
    SantaError::Api {
        status: 400,
        message: message.into(),
    }
}

impl RoomApi for FakeBackend {
    async fn create_room(&self, req: &CreateRoomRequest) -> Result<Room> {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let code = format!("R{:05}", st.next_id);
        let mut host = participant(&st.next_id.to_string(), &req.host_name, true);
        host.preferences = req.host_preferences.clone();
        host.secret_message = req.host_secret_message.clone();
        let room = Room {
            code: code.clone(),
            name: req.room_name.clone(),
            exchange_date: req.exchange_date.clone(),
            is_started: false,
            participants: vec![host],
            polls: Vec::new(),
        };
        st.rooms.insert(code, room.clone());
        Ok(room)
    }

    async fn join_room(&self, req: &JoinRequest) -> Result<Participant> {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let id = st.next_id.to_string();
        let room = st
            .rooms
            .get_mut(&req.room_code)
            .ok_or_else(room_not_found)?;
        if room.is_started {
            return Err(bad_request("Game already started"));
        }
        let mut p = participant(&id, &req.name, false);
        p.preferences = req.preferences.clone();
        p.secret_message = req.secret_message.clone();
        room.participants.push(p.clone());
        Ok(p)
    }

    async fn fetch_room(&self, code: &str) -> Result<Room> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let failing = self.fail_fetches.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_fetches.store(failing - 1, Ordering::SeqCst);
            return Err(SantaError::Api {
                status: 500,
                message: "Internal Server Error".into(),
            });
        }
        self.room(code).ok_or_else(room_not_found)
    }

    async fn delete_room(&self, code: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .rooms
            .remove(code)
            .map(|_| ())
            .ok_or_else(room_not_found)
    }

    async fn start_game(&self, code: &str) -> Result<StartGameResponse> {
        let mut st = self.state.lock().unwrap();
        let room = st.rooms.get_mut(code).ok_or_else(room_not_found)?;
        let n = room.participants.len();
        if n < 2 {
            return Err(bad_request("Need at least 2 participants"));
        }
        let ids: Vec<String> = room.participants.iter().map(|p| p.id.clone()).collect();
        for (i, p) in room.participants.iter_mut().enumerate() {
            p.giftee_id = Some(ids[(i + 1) % n].clone());
        }
        room.is_started = true;
        Ok(StartGameResponse {
            message: "Game started".into(),
            participants: room.participants.clone(),
        })
    }

    async fn remove_participant(&self, code: &str, participant_id: &str) -> Result<()> {
        let name = {
            let mut st = self.state.lock().unwrap();
            let room = st.rooms.get_mut(code).ok_or_else(room_not_found)?;
            if room.is_started {
                return Err(bad_request(
                    "Cannot remove participants after game has started",
                ));
            }
            let idx = room
                .participants
                .iter()
                .position(|p| p.id == participant_id)
                .ok_or_else(|| SantaError::not_found("Participant not found"))?;
            room.participants.remove(idx).name
        };
        self.broadcast(serde_json::json!({
            "sender": "System",
            "message": format!("{name} was removed from the room by the host."),
            "type": "participant_removed",
            "removed_id": participant_id,
        }));
        Ok(())
    }

    async fn create_poll(&self, code: &str, req: &CreatePollRequest) -> Result<Poll> {
        let poll = {
            let mut st = self.state.lock().unwrap();
            st.next_id += 1;
            let poll = Poll {
                id: format!("poll-{}", st.next_id),
                question: req.question.clone(),
                options: req.options.clone(),
                created_by: req.creator_name.clone(),
                votes: Default::default(),
            };
            let room = st.rooms.get_mut(code).ok_or_else(room_not_found)?;
            room.polls.push(poll.clone());
            poll
        };
        self.broadcast(serde_json::json!({ "type": "poll_created", "poll": poll }));
        Ok(poll)
    }

    async fn vote_poll(&self, code: &str, poll_id: &str, req: &VoteRequest) -> Result<()> {
        let poll = {
            let mut st = self.state.lock().unwrap();
            let room = st.rooms.get_mut(code).ok_or_else(room_not_found)?;
            let poll = room
                .polls
                .iter_mut()
                .find(|p| p.id == poll_id)
                .ok_or_else(|| SantaError::not_found("Poll not found"))?;
            poll.votes.insert(req.voter_id.clone(), req.option.clone());
            poll.clone()
        };
        self.broadcast(serde_json::json!({
            "type": "poll_voted",
            "poll_id": poll_id,
            "poll": poll,
        }));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn test_config(ws: &WsServer) -> ClientConfig {
    ClientConfig::new("http://127.0.0.1:9/api")
        .with_ws_base(ws.ws_base())
        .with_web_base("https://santa.example")
        .with_poll_interval(Duration::from_millis(40))
}

/// Poll `cond` every 10 ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
