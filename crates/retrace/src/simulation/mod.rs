mod command;
mod old_new;
mod world;
mod world_simulation;

pub use command::CommandBuffer;
pub use old_new::OldNew;
pub use world::{Command, DisplayState, Snapshot, World};
pub use world_simulation::Simulation;
