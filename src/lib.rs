//! # santa-sync
//!
//! Client core for a Secret Santa gift-exchange service: keeps a local view
//! of a room consistent with the server, which is the sole source of truth.
//!
//! Two channels feed the local [`store::RoomStore`]:
//!
//! - a **live channel** (WebSocket) whose events the [`dispatch::Dispatcher`]
//!   applies one at a time, and
//! - a **reconciliation loop** ([`reconcile::Reconciler`]) that pulls the whole
//!   room every few seconds and swaps it in, and is the one place that decides
//!   the room is gone.
//!
//! [`session::Session`] ties both to user actions and tears them down
//! together.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod timeline;
pub mod transport;

pub use config::ClientConfig;
pub use error::{Result, SantaError};
pub use event::LiveEvent;
pub use lifecycle::SessionNotice;
pub use model::{Participant, Poll, Room};
pub use session::Session;
pub use store::{RoomStore, SharedStore};
pub use timeline::{Timeline, TimelineItem};
