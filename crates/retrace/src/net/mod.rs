mod clock_sync;
pub mod memory;
mod ping;
mod protocol;
mod resource;

pub use clock_sync::ClockSyncer;
pub use memory::{LinkConditions, MemoryNetwork};
pub use ping::{PING_SAMPLE_WINDOW, PingTracker};
pub use protocol::{ClockSyncMessage, ConnectionHandle, Message, MessageKind, OwnerId};
pub use resource::{Connection, NetworkResource};
