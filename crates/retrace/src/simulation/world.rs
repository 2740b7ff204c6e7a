use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::net::{ConnectionHandle, OwnerId};

/// An input produced by one participant and applied to a [`World`].
pub trait Command: Clone + Debug {
    /// The participant that controls whatever this command affects.
    fn owner(&self) -> Option<OwnerId> {
        None
    }
}

/// Render-facing projection of a world that can be blended between ticks.
pub trait DisplayState: Clone + Debug {
    /// Blends two states, `t = 0` giving `state1` and `t = 1` giving `state2`.
    fn from_interpolation(state1: &Self, state2: &Self, t: f64) -> Self;
}

/// A full copy of a world's state. Snapshots must be serializable so the
/// server can split them by owner before sending.
pub trait Snapshot: Clone + Debug + Serialize + DeserializeOwned {}

impl<T> Snapshot for T where T: Clone + Debug + Serialize + DeserializeOwned {}

/// The domain being simulated. Every [`crate::Simulation`] owns exactly one
/// world; reconciliation clones worlds and never shares them.
pub trait World: Clone + Debug + Default + 'static {
    type Command: Command;
    type Snapshot: Snapshot;
    type DisplayState: DisplayState;

    /// Advances the world by one fixed timestep.
    fn step(&mut self);

    /// Whether `client` may issue `command`. Invalid commands are dropped by
    /// the server without further notice.
    fn command_is_valid(&self, command: &Self::Command, client: ConnectionHandle) -> bool;

    fn apply_command(&mut self, command: &Self::Command);

    /// Undoes the effect of [`World::apply_command`]. Only needed when the
    /// server lag-compensates snapshots.
    fn rollback_command(&mut self, _command: &Self::Command) {}

    fn apply_snapshot(&mut self, snapshot: Self::Snapshot);

    fn snapshot(&self) -> Self::Snapshot;

    fn display_state(&self) -> Self::DisplayState;
}
