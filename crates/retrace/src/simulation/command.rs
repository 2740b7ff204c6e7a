use std::collections::BTreeMap;

use crate::time::{Timestamp, Timestamped};

/// Pending commands keyed by the tick they apply to.
///
/// Every stored tick lies inside the acceptable window of the buffer's
/// reference timestamp, which keeps the circular ordering of the keys total.
/// Commands sharing a tick keep their insertion order.
#[derive(Debug, Clone)]
pub struct CommandBuffer<C> {
    map: BTreeMap<Timestamp, Vec<C>>,
    timestamp: Timestamp,
}

impl<C> Default for CommandBuffer<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandBuffer<C> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
            timestamp: Timestamp::default(),
        }
    }

    /// The reference tick, normally the last completed tick of the owning
    /// simulation.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Moves the reference tick and evicts anything that falls outside the
    /// new acceptable window, in either direction.
    pub fn update_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
        let window = timestamp.acceptable_window();
        let before = self.len();
        self.map.retain(|tick, _| window.contains(*tick));
        let evicted = before - self.len();
        if evicted > 0 {
            log::debug!("Evicted {evicted} commands outside the window around {timestamp}");
        }
    }

    /// Stores a command, or drops it with a warning when its tick is too far
    /// from the reference tick to be ordered.
    pub fn insert(&mut self, command: Timestamped<C>) {
        let tick = command.timestamp();
        if let Err(err) = tick.check_acceptable(self.timestamp) {
            log::warn!("Dropping command: {err}");
            return;
        }
        self.map.entry(tick).or_default().push(command.into_inner());
    }

    /// Removes every command at or before `timestamp`, oldest tick first.
    pub fn drain_up_to(&mut self, timestamp: Timestamp) -> Vec<Timestamped<C>> {
        let retained = self.map.split_off(&(timestamp + 1));
        let drained = std::mem::replace(&mut self.map, retained);
        Self::flatten(drained)
    }

    pub fn drain_all(&mut self) -> Vec<Timestamped<C>> {
        Self::flatten(std::mem::take(&mut self.map))
    }

    fn flatten(map: BTreeMap<Timestamp, Vec<C>>) -> Vec<Timestamped<C>> {
        map.into_iter()
            .flat_map(|(tick, commands)| {
                commands
                    .into_iter()
                    .map(move |command| Timestamped::new(command, tick))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &C)> {
        self.map
            .iter()
            .flat_map(|(tick, commands)| commands.iter().map(move |command| (*tick, command)))
    }

    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
