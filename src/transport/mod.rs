//! Transport seam
//!
//! The processor never touches sockets. The transport layer decodes inbound
//! packets, calls the matching handler, and drains each channel's outbound
//! queue back onto the wire. [`Channel`] is the capability the processor
//! holds per connection: write one packet, close, plus the per-channel
//! attributes the handlers read and write (client id, username,
//! clean-session flag, keep-alive, session-stolen tag, idle timeout).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::Packet;

/// Attributes attached to a channel by CONNECT handling.
#[derive(Debug, Clone, Default)]
pub struct ChannelAttrs {
    pub client_id: Option<Arc<str>>,
    pub username: Option<String>,
    pub clean_session: bool,
    pub keep_alive: u16,
}

/// Handle to one client connection.
///
/// Writes are non-blocking enqueues; the transport drains the receiving
/// half returned by [`Channel::open`]. Closing is a flag the transport
/// observes (and the receiver is released by dropping it there).
pub struct Channel {
    outbound: mpsc::UnboundedSender<Packet>,
    closed: AtomicBool,
    session_stolen: AtomicBool,
    idle_timeout: Mutex<Option<Duration>>,
    attrs: RwLock<ChannelAttrs>,
}

impl Channel {
    /// Create a channel and the outbound queue the transport drains.
    pub fn open() -> (Arc<Channel>, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Channel {
            outbound: tx,
            closed: AtomicBool::new(false),
            session_stolen: AtomicBool::new(false),
            idle_timeout: Mutex::new(None),
            attrs: RwLock::new(ChannelAttrs::default()),
        });
        (channel, rx)
    }

    /// Enqueue one packet for the transport to write.
    ///
    /// Returns false when the channel is closed or the transport side is
    /// gone; the caller decides whether that is worth logging.
    pub fn write(&self, packet: Packet) -> bool {
        if self.closed.load(Ordering::Acquire) {
            trace!("write on closed channel dropped");
            return false;
        }
        self.outbound.send(packet).is_ok()
    }

    /// Mark the channel closed. The transport tears down the socket when it
    /// observes the flag (or the queue endpoint dropping).
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tag the channel as replaced by a newer CONNECT for the same client
    /// id. Connection-lost handling for a tagged channel suppresses the
    /// will.
    pub fn mark_session_stolen(&self) {
        self.session_stolen.store(true, Ordering::Release);
    }

    pub fn is_session_stolen(&self) -> bool {
        self.session_stolen.load(Ordering::Acquire)
    }

    /// Install the idle timeout the transport enforces. `None` disables it.
    /// Replaces any prior value.
    pub fn set_idle_timeout(&self, timeout: Option<Duration>) {
        *self.idle_timeout.lock() = timeout;
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        *self.idle_timeout.lock()
    }

    pub fn client_id(&self) -> Option<Arc<str>> {
        self.attrs.read().client_id.clone()
    }

    pub fn set_client_id(&self, client_id: Arc<str>) {
        self.attrs.write().client_id = Some(client_id);
    }

    pub fn username(&self) -> Option<String> {
        self.attrs.read().username.clone()
    }

    pub fn set_username(&self, username: String) {
        self.attrs.write().username = Some(username);
    }

    pub fn clean_session(&self) -> bool {
        self.attrs.read().clean_session
    }

    pub fn set_clean_session(&self, clean_session: bool) {
        self.attrs.write().clean_session = clean_session;
    }

    pub fn keep_alive(&self) -> u16 {
        self.attrs.read().keep_alive
    }

    pub fn set_keep_alive(&self, keep_alive: u16) {
        self.attrs.write().keep_alive = keep_alive;
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .field("session_stolen", &self.is_session_stolen())
            .field("attrs", &*self.attrs.read())
            .finish()
    }
}
