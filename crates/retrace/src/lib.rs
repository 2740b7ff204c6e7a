pub mod client;
pub mod config;
pub mod net;
pub mod server;
pub mod simulation;
pub mod time;

pub use client::{
    ActiveClient, Client, ClientStage, ClientWorldSimulations, ReconciliationStatus, Tweened,
};
pub use config::{Config, TweeningMethod};
pub use net::{
    ClockSyncMessage, ClockSyncer, Connection, ConnectionHandle, LinkConditions, MemoryNetwork,
    Message, MessageKind, NetworkResource, OwnerId, PingTracker,
};
pub use server::{CommandHistory, MergeError, Server};
pub use simulation::{Command, CommandBuffer, DisplayState, OldNew, Simulation, Snapshot, World};
pub use time::{
    FloatTimestamp, Stepper, TerminationCondition, TimeKeeper, Timestamp, Timestamped, WindowError,
};
