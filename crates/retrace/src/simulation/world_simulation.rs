use crate::simulation::{CommandBuffer, World};
use crate::time::{Stepper, Timestamp, Timestamped};

/// A world together with the commands scheduled against it.
///
/// The buffer's reference timestamp doubles as the last completed tick, so the
/// two can never disagree.
#[derive(Debug, Clone)]
pub struct Simulation<W: World> {
    world: W,
    command_buffer: CommandBuffer<W::Command>,
    has_initialized: bool,
}

impl<W: World> Default for Simulation<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: World> Simulation<W> {
    /// An empty simulation waiting for its first snapshot.
    pub fn new() -> Self {
        Self {
            world: W::default(),
            command_buffer: CommandBuffer::new(),
            has_initialized: false,
        }
    }

    /// A simulation that is authoritative from the start.
    pub fn with_world(world: W) -> Self {
        Self {
            world,
            command_buffer: CommandBuffer::new(),
            has_initialized: true,
        }
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn command_buffer(&self) -> &CommandBuffer<W::Command> {
        &self.command_buffer
    }

    pub fn has_initialized(&self) -> bool {
        self.has_initialized
    }

    pub fn last_completed_timestamp(&self) -> Timestamp {
        self.command_buffer.timestamp()
    }

    /// The tick the next call to [`Simulation::step`] will produce.
    pub fn simulating_timestamp(&self) -> Timestamp {
        self.last_completed_timestamp() + 1
    }

    pub fn schedule_command(&mut self, command: Timestamped<W::Command>) {
        self.command_buffer.insert(command);
    }

    pub fn step(&mut self) {
        let timestamp = self.simulating_timestamp();
        for command in self.command_buffer.drain_up_to(timestamp) {
            self.world.apply_command(command.inner());
        }
        self.world.step();
        self.command_buffer.update_timestamp(timestamp);
    }

    /// Steps until `target` is completed or `max_steps` have run, whichever
    /// comes first.
    pub fn try_completing_simulations_up_to(&mut self, target: Timestamp, max_steps: usize) {
        for _ in 0..max_steps {
            if self.last_completed_timestamp() >= target {
                break;
            }
            self.step();
        }
    }

    /// Replaces the world with `snapshot` and takes over `rewound_buffer` as
    /// the pending commands from that tick onwards.
    pub fn apply_completed_snapshot(
        &mut self,
        snapshot: Timestamped<W::Snapshot>,
        rewound_buffer: CommandBuffer<W::Command>,
    ) {
        let timestamp = snapshot.timestamp();
        self.world.apply_snapshot(snapshot.into_inner());
        self.command_buffer = rewound_buffer;
        self.command_buffer.update_timestamp(timestamp);
        self.has_initialized = true;
    }

    /// Forces the last completed tick. Rewinding replays every buffered
    /// command at once so none of them is lost behind the new tick.
    pub fn reset_last_completed_timestamp(&mut self, timestamp: Timestamp) {
        let previous = self.last_completed_timestamp();
        if timestamp < previous {
            for command in self.command_buffer.drain_all() {
                self.world.apply_command(command.inner());
            }
        }
        self.command_buffer.update_timestamp(timestamp);
    }

    pub fn display_state(&self) -> Option<Timestamped<W::DisplayState>> {
        self.has_initialized.then(|| {
            Timestamped::new(self.world.display_state(), self.last_completed_timestamp())
        })
    }
}

impl<W: World> Stepper for Simulation<W> {
    fn step(&mut self) {
        Simulation::step(self);
    }

    fn last_completed_timestamp(&self) -> Timestamp {
        Simulation::last_completed_timestamp(self)
    }

    fn reset_last_completed_timestamp(&mut self, timestamp: Timestamp) {
        Simulation::reset_last_completed_timestamp(self, timestamp);
    }

    fn post_update(&mut self, _timestep_overshoot_seconds: f64) {}
}
