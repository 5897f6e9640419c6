//! # Transport
//!
//! Two channels to the backend:
//!
//! 1. **Request/response**: [`ApiClient`] speaks JSON over HTTP. The
//!    [`RoomApi`] trait is the seam the session and the reconciliation loop
//!    depend on, so both can run against an in-memory backend.
//! 2. **Live channel**: [`LiveChannel`] owns one WebSocket per room entry and
//!    yields decoded [`ChannelEvent`]s on an mpsc receiver.

pub mod channel;
pub mod http;

use std::future::Future;

pub use channel::{ChannelEvent, LiveChannel};
pub use http::ApiClient;

use crate::error::Result;
use crate::model::{
    CreatePollRequest, CreateRoomRequest, JoinRequest, Participant, Poll, Room,
    StartGameResponse, VoteRequest,
};

/// Room operations offered by the backend.
///
/// Every call is one request/response round trip; none of them touch local
/// state.
pub trait RoomApi: Send + Sync + 'static {
    fn create_room(&self, req: &CreateRoomRequest) -> impl Future<Output = Result<Room>> + Send;

    fn join_room(&self, req: &JoinRequest) -> impl Future<Output = Result<Participant>> + Send;

    fn fetch_room(&self, code: &str) -> impl Future<Output = Result<Room>> + Send;

    fn delete_room(&self, code: &str) -> impl Future<Output = Result<()>> + Send;

    fn start_game(&self, code: &str) -> impl Future<Output = Result<StartGameResponse>> + Send;

    fn remove_participant(
        &self,
        code: &str,
        participant_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn create_poll(
        &self,
        code: &str,
        req: &CreatePollRequest,
    ) -> impl Future<Output = Result<Poll>> + Send;

    fn vote_poll(
        &self,
        code: &str,
        poll_id: &str,
        req: &VoteRequest,
    ) -> impl Future<Output = Result<()>> + Send;
}
