//! Session notices and the shared teardown signal.

use tokio::sync::watch;

use crate::timeline::TimelineChange;

/// Something the UI layer should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    /// The chat timeline changed.
    Timeline(TimelineChange),
    /// A reconciliation pull replaced the room snapshot.
    RoomRefreshed,
    /// The room no longer exists on the server. The store has been cleared.
    RoomClosed,
    /// The current user was removed by the host. The store has been cleared.
    Removed,
    /// The live channel ended.
    ChannelClosed,
    /// The live channel reported an error. The room stays up.
    ChannelError(String),
}

/// One-shot teardown signal shared by the live channel, the dispatcher and the
/// reconciliation loop of a single room entry.
///
/// Whichever side triggers it, all three stop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once teardown has been requested, or the signal was dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
