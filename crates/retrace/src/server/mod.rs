mod history;
pub mod merge;

pub use history::CommandHistory;
pub use merge::{MergeError, merge_snapshots};

use std::collections::HashMap;

use crate::config::Config;
use crate::net::{
    Connection, ConnectionHandle, Message, MessageKind, NetworkResource, OwnerId, PingTracker,
};
use crate::simulation::{Simulation, World};
use crate::time::{TerminationCondition, TimeKeeper, Timestamp, Timestamped};

/// Extra ticks added when forwarding a command to peers so it lands inside
/// their render buffer.
pub const RENDER_BUFFER_TICKS: i16 = 3;

/// Connections are split into this many tranches; one tranche receives a
/// lag-compensated snapshot per tick.
pub const SNAPSHOT_TRANCHES: usize = 6;

/// The authoritative simulation. It runs `lag_compensation_latency` behind
/// the shared clock and never simulates past it.
#[derive(Debug)]
pub struct Server<W: World> {
    timekeeping_simulation: TimeKeeper<Simulation<W>>,
    command_history: CommandHistory<W::Command>,
    pings: HashMap<ConnectionHandle, PingTracker>,
    seconds_since_last_snapshot: f64,
    last_snapshot_tick: Option<Timestamp>,
    config: Config,
}

impl<W: World> Server<W> {
    pub fn new(config: Config, seconds_since_startup: f64) -> Self {
        Self::with_world(W::default(), config, seconds_since_startup)
    }

    pub fn with_world(world: W, config: Config, seconds_since_startup: f64) -> Self {
        let mut simulation = Simulation::with_world(world);
        let initial_timestamp = Timestamp::from_seconds(
            seconds_since_startup - config.lag_compensation_latency,
            config.timestep_seconds,
        );
        simulation.reset_last_completed_timestamp(initial_timestamp);
        log::info!("Server simulation starting at {initial_timestamp}");

        Self {
            timekeeping_simulation: TimeKeeper::new(
                simulation,
                config.clone(),
                TerminationCondition::LastUndershoot,
            ),
            command_history: CommandHistory::new(),
            pings: HashMap::new(),
            seconds_since_last_snapshot: 0.0,
            last_snapshot_tick: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn simulation(&self) -> &Simulation<W> {
        self.timekeeping_simulation.stepper()
    }

    pub fn world(&self) -> &W {
        self.simulation().world()
    }

    pub fn last_completed_timestamp(&self) -> Timestamp {
        self.simulation().last_completed_timestamp()
    }

    pub fn simulating_timestamp(&self) -> Timestamp {
        self.simulation().simulating_timestamp()
    }

    pub fn display_state(&self) -> Option<Timestamped<W::DisplayState>> {
        self.simulation().display_state()
    }

    pub fn command_history(&self) -> &CommandHistory<W::Command> {
        &self.command_history
    }

    pub fn update<N: NetworkResource<W>>(
        &mut self,
        delta_seconds: f64,
        seconds_since_startup: f64,
        net: &mut N,
    ) {
        let delta_seconds = if delta_seconds < 0.0 {
            log::warn!("Server update received negative delta {delta_seconds}s, using 0");
            0.0
        } else {
            delta_seconds
        };

        self.timekeeping_simulation.update(
            delta_seconds,
            seconds_since_startup - self.config.lag_compensation_latency,
        );
        self.command_history.prune(
            self.last_completed_timestamp(),
            self.config.command_history_retention(),
        );

        for (handle, command) in self.pump_messages(seconds_since_startup, net) {
            self.receive_command(command, handle, net);
        }

        if self.config.lag_compensate_commands {
            self.send_lag_compensated_snapshots(net);
        } else {
            self.send_periodic_snapshots(delta_seconds, net);
        }
    }

    /// Answers clock sync requests and collects inbound commands.
    fn pump_messages<N: NetworkResource<W>>(
        &mut self,
        seconds_since_startup: f64,
        net: &mut N,
    ) -> Vec<(ConnectionHandle, Timestamped<W::Command>)> {
        let mut commands = Vec::new();
        for (handle, connection) in net.connections() {
            while let Some(mut sync) = connection.recv_clock_sync() {
                let pings = self.pings.entry(handle).or_default();
                if let Some(average_ms) = pings.add_sample(sync.client_ping_ms) {
                    log::debug!("Connection {handle} ping is {average_ms:.1}ms");
                    connection.set_ping_ms(average_ms);
                }

                sync.server_seconds_since_startup = seconds_since_startup;
                sync.client_id = handle;
                connection.send(Message::ClockSync(sync));
                connection.flush(MessageKind::ClockSync);
            }
            while let Some(command) = connection.recv_command() {
                commands.push((handle, command));
            }
        }
        commands
    }

    /// Validates a client's command, applies it on the next tick and forwards
    /// it to everyone else.
    pub fn receive_command<N: NetworkResource<W>>(
        &mut self,
        mut command: Timestamped<W::Command>,
        handle: ConnectionHandle,
        net: &mut N,
    ) {
        if !self.world().command_is_valid(command.inner(), handle) {
            log::trace!("Ignoring invalid command from connection {handle}");
            return;
        }

        command.set_timestamp(self.simulating_timestamp());
        self.schedule_and_record(command.clone());
        self.forward_command(&command, Some(handle), net);
    }

    /// Issues a command on behalf of the server itself.
    pub fn issue_command<N: NetworkResource<W>>(&mut self, command: W::Command, net: &mut N) {
        let command = Timestamped::new(command, self.simulating_timestamp());
        self.schedule_and_record(command.clone());
        self.forward_command(&command, None, net);
    }

    fn schedule_and_record(&mut self, command: Timestamped<W::Command>) {
        self.command_history
            .record(command.timestamp(), command.inner().clone());
        self.timekeeping_simulation
            .stepper_mut()
            .schedule_command(command);
    }

    fn forward_command<N: NetworkResource<W>>(
        &self,
        command: &Timestamped<W::Command>,
        origin: Option<ConnectionHandle>,
        net: &mut N,
    ) {
        let lag_frames = self.config.lag_compensation_frame_count();
        for (handle, connection) in net.connections() {
            if Some(handle) == origin {
                continue;
            }
            let half_rtt = self.config.latency_frame_count(connection.ping_ms());
            let mut forwarded = command.clone();
            forwarded
                .set_timestamp(command.timestamp() + half_rtt + lag_frames + RENDER_BUFFER_TICKS);
            connection.send(Message::Command(forwarded));
            connection.flush(MessageKind::Command);
        }
    }

    fn send_periodic_snapshots<N: NetworkResource<W>>(&mut self, delta_seconds: f64, net: &mut N) {
        self.seconds_since_last_snapshot += delta_seconds;
        if self.seconds_since_last_snapshot < self.config.snapshot_send_period {
            return;
        }
        self.seconds_since_last_snapshot = 0.0;

        let now = self.last_completed_timestamp();
        let lag_frames = self.config.lag_compensation_frame_count();
        let snapshot = self.world().snapshot();
        for (_, connection) in net.connections() {
            let half_rtt = self.config.latency_frame_count(connection.ping_ms());
            let label = now + lag_frames + lag_frames - half_rtt;
            connection.send(Message::Snapshot(Timestamped::new(snapshot.clone(), label)));
            connection.flush(MessageKind::Snapshot);
        }
    }

    fn send_lag_compensated_snapshots<N: NetworkResource<W>>(&mut self, net: &mut N) {
        let tranches = self.tranches_due();
        if tranches.is_empty() {
            return;
        }

        let recipients: Vec<(ConnectionHandle, f64)> = net
            .connections()
            .filter(|(handle, _)| tranches.contains(&(handle % SNAPSHOT_TRANCHES)))
            .map(|(handle, connection)| (handle, connection.ping_ms()))
            .collect();

        for (handle, ping_ms) in recipients {
            let owner = net.owner_id_from_handle(handle);
            let half_rtt = self.config.latency_frame_count(ping_ms);
            match self.lag_compensated_snapshot(owner, half_rtt) {
                Ok(snapshot) => net.send_message(handle, Message::Snapshot(snapshot)),
                Err(err) => log::warn!("Skipping snapshot for connection {handle}: {err}"),
            }
        }
    }

    /// Tranches of every tick completed since the last call, at most one
    /// full round. A rewound clock serves the current tick's tranche.
    fn tranches_due(&mut self) -> Vec<usize> {
        let now = self.last_completed_timestamp();
        let completed = match self.last_snapshot_tick.replace(now) {
            Some(last) => match now - last {
                0 => 0,
                ticks if ticks < 0 => 1,
                ticks => ticks.min(SNAPSHOT_TRANCHES as i16),
            },
            None => 1,
        };

        (0..completed)
            .map(|back| {
                let tick = now - back;
                i32::from(tick.ticks()).rem_euclid(SNAPSHOT_TRANCHES as i32) as usize
            })
            .collect()
    }

    /// Builds the snapshot a recipient with the given owner id and one-way
    /// latency (in ticks) should receive this tick: its own entities rolled
    /// back to `now - lag`, everyone else's to `now - 2 * half_rtt - lag`.
    pub fn lag_compensated_snapshot(
        &self,
        owner: Option<OwnerId>,
        half_rtt: i16,
    ) -> Result<Timestamped<W::Snapshot>, MergeError> {
        let now = self.last_completed_timestamp();
        let lag_frames = self.config.lag_compensation_frame_count();
        let retention = i32::from(self.config.command_history_retention());
        let clamp_depth = |depth: i32| depth.clamp(0, retention) as i16;

        let label = now - (half_rtt - lag_frames);
        let owner_depth = clamp_depth(i32::from(lag_frames));
        let non_owner_depth = clamp_depth(2 * i32::from(half_rtt) + i32::from(lag_frames));

        let owner_world = self.rolled_back_world(owner_depth);
        let non_owner_world = self.rolled_back_world(non_owner_depth);
        let merged = merge_snapshots(&owner_world.snapshot(), &non_owner_world.snapshot(), owner)?;

        let mut world = self.world().clone();
        world.apply_snapshot(merged);
        Ok(Timestamped::new(world.snapshot(), label))
    }

    /// A copy of the authoritative world with the commands of the last
    /// `depth` ticks undone, newest first.
    pub fn rolled_back_world(&self, depth: i16) -> W {
        let now = self.last_completed_timestamp();
        let mut world = self.world().clone();
        for back in 0..depth {
            for command in self.command_history.at(now - back).iter().rev() {
                world.rollback_command(command);
            }
        }
        world
    }
}
