use std::fmt;

use serde::{Deserialize, Serialize};

use crate::simulation::World;
use crate::time::Timestamped;

/// Transport-assigned identifier of a connection.
pub type ConnectionHandle = usize;

/// Identity of the participant that controls an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageKind {
    ClockSync = 0,
    Command = 1,
    Snapshot = 2,
}

impl MessageKind {
    /// First id free for host applications to register their own messages.
    pub const FIRST_APPLICATION_ID: u16 = 3;

    pub const ALL: [MessageKind; 3] = [
        MessageKind::ClockSync,
        MessageKind::Command,
        MessageKind::Snapshot,
    ];

    pub const fn id(self) -> u16 {
        self as u16
    }

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0 => Some(MessageKind::ClockSync),
            1 => Some(MessageKind::Command),
            2 => Some(MessageKind::Snapshot),
            _ => None,
        }
    }
}

/// Clock synchronisation request (client to server) and reply (server to
/// client). The server fills in its own time and the connection's handle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockSyncMessage {
    pub client_send_seconds_since_startup: f64,
    pub server_seconds_since_startup: f64,
    pub client_id: ConnectionHandle,
    /// Smoothed one-way latency the client measured, in milliseconds.
    pub client_ping_ms: f64,
}

#[derive(Debug, Clone)]
pub enum Message<W: World> {
    ClockSync(ClockSyncMessage),
    Command(Timestamped<W::Command>),
    Snapshot(Timestamped<W::Snapshot>),
}

impl<W: World> Message<W> {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClockSync(_) => MessageKind::ClockSync,
            Message::Command(_) => MessageKind::Command,
            Message::Snapshot(_) => MessageKind::Snapshot,
        }
    }
}
