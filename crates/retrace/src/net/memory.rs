//! In-process transport connecting one server to any number of clients, with
//! simulated latency, jitter and loss. Messages travel as values; nothing is
//! encoded.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::net::{
    ClockSyncMessage, Connection, ConnectionHandle, Message, MessageKind, NetworkResource, OwnerId,
};
use crate::simulation::World;
use crate::time::Timestamped;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkConditions {
    /// One-way delay applied to every message.
    pub latency_seconds: f64,
    /// Maximum extra delay, drawn uniformly per message.
    pub jitter_seconds: f64,
    pub loss_percent: f64,
}

impl LinkConditions {
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn good() -> Self {
        Self {
            latency_seconds: 0.04,
            jitter_seconds: 0.006,
            loss_percent: 0.2,
        }
    }

    pub fn average() -> Self {
        Self {
            latency_seconds: 0.1,
            jitter_seconds: 0.015,
            loss_percent: 2.0,
        }
    }

    pub fn poor() -> Self {
        Self {
            latency_seconds: 0.2,
            jitter_seconds: 0.03,
            loss_percent: 5.0,
        }
    }
}

#[derive(Debug)]
struct InFlight<W: World> {
    at_seconds: f64,
    message: Message<W>,
}

/// One side of a link. Sent messages wait in the outbox until flushed, then
/// until [`MemoryNetwork::advance`] carries them across.
#[derive(Debug)]
pub struct MemoryConnection<W: World> {
    outbox: Vec<Message<W>>,
    flushed: Vec<InFlight<W>>,
    inbox: Vec<InFlight<W>>,
    now_seconds: f64,
    ping_ms: f64,
}

impl<W: World> Default for MemoryConnection<W> {
    fn default() -> Self {
        Self {
            outbox: Vec::new(),
            flushed: Vec::new(),
            inbox: Vec::new(),
            now_seconds: 0.0,
            ping_ms: 0.0,
        }
    }
}

impl<W: World> MemoryConnection<W> {
    fn deliver(&mut self, in_flight: InFlight<W>) {
        let index = self
            .inbox
            .partition_point(|queued| queued.at_seconds <= in_flight.at_seconds);
        self.inbox.insert(index, in_flight);
    }

    fn take_arrived(&mut self, kind: MessageKind) -> Option<Message<W>> {
        let now = self.now_seconds;
        let index = self
            .inbox
            .iter()
            .take_while(|queued| queued.at_seconds <= now)
            .position(|queued| queued.message.kind() == kind)?;
        Some(self.inbox.remove(index).message)
    }

    /// Messages that have arrived but not been received yet.
    pub fn pending(&self) -> usize {
        self.inbox
            .iter()
            .filter(|queued| queued.at_seconds <= self.now_seconds)
            .count()
    }
}

impl<W: World> Connection<W> for MemoryConnection<W> {
    fn recv_command(&mut self) -> Option<Timestamped<W::Command>> {
        match self.take_arrived(MessageKind::Command)? {
            Message::Command(command) => Some(command),
            _ => None,
        }
    }

    fn recv_snapshot(&mut self) -> Option<Timestamped<W::Snapshot>> {
        match self.take_arrived(MessageKind::Snapshot)? {
            Message::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    fn recv_clock_sync(&mut self) -> Option<ClockSyncMessage> {
        match self.take_arrived(MessageKind::ClockSync)? {
            Message::ClockSync(sync) => Some(sync),
            _ => None,
        }
    }

    fn send(&mut self, message: Message<W>) {
        self.outbox.push(message);
    }

    fn flush(&mut self, kind: MessageKind) {
        let now = self.now_seconds;
        let (flushed, kept): (Vec<_>, Vec<_>) = self
            .outbox
            .drain(..)
            .partition(|message| message.kind() == kind);
        self.outbox = kept;
        self.flushed.extend(flushed.into_iter().map(|message| InFlight {
            at_seconds: now,
            message,
        }));
    }

    fn ping_ms(&self) -> f64 {
        self.ping_ms
    }

    fn set_ping_ms(&mut self, ping_ms: f64) {
        self.ping_ms = ping_ms;
    }
}

/// The server's view: one connection per client, handles are indices.
#[derive(Debug)]
pub struct MemoryServerNet<W: World> {
    connections: Vec<MemoryConnection<W>>,
}

impl<W: World> NetworkResource<W> for MemoryServerNet<W> {
    type Conn = MemoryConnection<W>;

    fn connections(&mut self) -> impl Iterator<Item = (ConnectionHandle, &mut Self::Conn)> {
        self.connections.iter_mut().enumerate()
    }

    fn owner_id_from_handle(&self, handle: ConnectionHandle) -> Option<OwnerId> {
        (handle < self.connections.len()).then_some(OwnerId(handle as u64))
    }
}

/// A client's view: a single connection to the server.
#[derive(Debug)]
pub struct MemoryClientNet<W: World> {
    connection: MemoryConnection<W>,
}

impl<W: World> NetworkResource<W> for MemoryClientNet<W> {
    type Conn = MemoryConnection<W>;

    fn connections(&mut self) -> impl Iterator<Item = (ConnectionHandle, &mut Self::Conn)> {
        std::iter::once((0, &mut self.connection))
    }

    fn owner_id_from_handle(&self, _handle: ConnectionHandle) -> Option<OwnerId> {
        None
    }
}

#[derive(Debug)]
pub struct MemoryNetwork<W: World> {
    server: MemoryServerNet<W>,
    clients: Vec<MemoryClientNet<W>>,
    conditions: LinkConditions,
    rng: StdRng,
    dropped: u64,
}

impl<W: World> MemoryNetwork<W> {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            server: MemoryServerNet {
                connections: Vec::new(),
            },
            clients: Vec::new(),
            conditions,
            rng: StdRng::seed_from_u64(seed),
            dropped: 0,
        }
    }

    /// Connects a new client and returns its handle on the server side.
    pub fn connect_client(&mut self) -> ConnectionHandle {
        self.server.connections.push(MemoryConnection::default());
        self.clients.push(MemoryClientNet {
            connection: MemoryConnection::default(),
        });
        self.clients.len() - 1
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn server_mut(&mut self) -> &mut MemoryServerNet<W> {
        &mut self.server
    }

    pub fn client_mut(&mut self, handle: ConnectionHandle) -> Option<&mut MemoryClientNet<W>> {
        self.clients.get_mut(handle)
    }

    pub fn conditions(&self) -> LinkConditions {
        self.conditions
    }

    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    /// Messages lost to simulated packet loss so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Moves the clock of every endpoint to `now_seconds` and carries every
    /// flushed message across its link.
    pub fn advance(&mut self, now_seconds: f64) {
        let conditions = self.conditions;
        for (server_side, client) in self.server.connections.iter_mut().zip(&mut self.clients) {
            let client_side = &mut client.connection;
            server_side.now_seconds = now_seconds;
            client_side.now_seconds = now_seconds;

            for in_flight in std::mem::take(&mut server_side.flushed) {
                if let Some(in_flight) = condition(&mut self.rng, conditions, in_flight) {
                    client_side.deliver(in_flight);
                } else {
                    self.dropped += 1;
                }
            }
            for in_flight in std::mem::take(&mut client_side.flushed) {
                if let Some(in_flight) = condition(&mut self.rng, conditions, in_flight) {
                    server_side.deliver(in_flight);
                } else {
                    self.dropped += 1;
                }
            }
        }
    }
}

fn condition<W: World>(
    rng: &mut StdRng,
    conditions: LinkConditions,
    mut in_flight: InFlight<W>,
) -> Option<InFlight<W>> {
    if conditions.loss_percent > 0.0 && rng.gen_range(0.0..100.0) < conditions.loss_percent {
        return None;
    }
    let jitter = if conditions.jitter_seconds > 0.0 {
        rng.gen_range(0.0..conditions.jitter_seconds)
    } else {
        0.0
    };
    in_flight.at_seconds += conditions.latency_seconds + jitter;
    Some(in_flight)
}
