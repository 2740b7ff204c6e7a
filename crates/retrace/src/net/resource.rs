use crate::net::{ClockSyncMessage, ConnectionHandle, Message, MessageKind, OwnerId};
use crate::simulation::World;
use crate::time::Timestamped;

/// One peer as seen by the transport. All receives are non-blocking and take
/// a single message off the queue.
pub trait Connection<W: World> {
    fn recv_command(&mut self) -> Option<Timestamped<W::Command>>;

    fn recv_snapshot(&mut self) -> Option<Timestamped<W::Snapshot>>;

    fn recv_clock_sync(&mut self) -> Option<ClockSyncMessage>;

    /// Queues a message; it leaves on the next [`Connection::flush`] of its kind.
    fn send(&mut self, message: Message<W>);

    fn flush(&mut self, kind: MessageKind);

    /// Smoothed one-way latency in milliseconds.
    fn ping_ms(&self) -> f64;

    fn set_ping_ms(&mut self, ping_ms: f64);
}

pub trait NetworkResource<W: World> {
    type Conn: Connection<W>;

    fn connections(&mut self) -> impl Iterator<Item = (ConnectionHandle, &mut Self::Conn)>;

    /// Sends and flushes `message` on every connection.
    fn broadcast_message(&mut self, message: Message<W>) {
        let kind = message.kind();
        for (_, connection) in self.connections() {
            connection.send(message.clone());
            connection.flush(kind);
        }
    }

    /// Sends and flushes `message` on a single connection.
    fn send_message(&mut self, handle: ConnectionHandle, message: Message<W>) {
        let kind = message.kind();
        match self.connections().find(|(h, _)| *h == handle) {
            Some((_, connection)) => {
                connection.send(message);
                connection.flush(kind);
            }
            None => log::warn!("Cannot send {kind:?} to unknown connection {handle}"),
        }
    }

    fn owner_id_from_handle(&self, handle: ConnectionHandle) -> Option<OwnerId>;
}
