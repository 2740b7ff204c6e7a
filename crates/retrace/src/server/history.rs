use std::collections::BTreeMap;

use crate::time::Timestamp;

/// Commands the server has applied, grouped by the tick they were applied
/// on, kept so snapshots can be rolled back per recipient.
#[derive(Debug, Clone)]
pub struct CommandHistory<C> {
    ticks: BTreeMap<Timestamp, Vec<C>>,
}

impl<C> Default for CommandHistory<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CommandHistory<C> {
    pub fn new() -> Self {
        Self {
            ticks: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, timestamp: Timestamp, command: C) {
        self.ticks.entry(timestamp).or_default().push(command);
    }

    /// Commands applied on `timestamp`, in application order.
    pub fn at(&self, timestamp: Timestamp) -> &[C] {
        self.ticks.get(&timestamp).map_or(&[], Vec::as_slice)
    }

    /// Keeps the ticks from `retention` ticks before `now` up to the tick
    /// after it, which may already hold scheduled commands.
    pub fn prune(&mut self, now: Timestamp, retention: i16) {
        self.ticks.retain(|tick, _| {
            let age = now - *tick;
            (-1..=retention).contains(&age)
        });
    }

    pub fn len(&self) -> usize {
        self.ticks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn oldest(&self) -> Option<Timestamp> {
        self.ticks.keys().next().copied()
    }
}
