use crate::client::{ClientWorldSimulations, ReconciliationStatus, Tweened};
use crate::config::Config;
use crate::net::{ClockSyncer, Connection, ConnectionHandle, Message, NetworkResource};
use crate::simulation::World;
use crate::time::{TerminationCondition, TimeKeeper, Timestamp, Timestamped};

/// A client whose clock is synchronised with the server, predicting ahead of
/// it and reconciling against its snapshots.
#[derive(Debug)]
pub struct ActiveClient<W: World> {
    clock_syncer: ClockSyncer,
    timekeeping_simulations: TimeKeeper<ClientWorldSimulations<W>>,
    config: Config,
}

impl<W: World> ActiveClient<W> {
    pub fn new(config: Config, clock_syncer: ClockSyncer, initial_timestamp: Timestamp) -> Self {
        log::info!("Starting client simulations at {initial_timestamp}");
        Self {
            clock_syncer,
            timekeeping_simulations: TimeKeeper::new(
                ClientWorldSimulations::new(config.clone(), initial_timestamp),
                config.clone(),
                TerminationCondition::FirstOvershoot,
            ),
            config,
        }
    }

    /// # Panics
    ///
    /// Panics if the clock syncer has lost its offset, which cannot happen
    /// for a client built by [`crate::Client`].
    pub fn update<N: NetworkResource<W>>(
        &mut self,
        delta_seconds: f64,
        seconds_since_startup: f64,
        net: &mut N,
    ) {
        self.clock_syncer
            .update::<W, N>(delta_seconds, seconds_since_startup, net);

        let simulations = self.timekeeping_simulations.stepper_mut();
        for (_, connection) in net.connections() {
            while let Some(command) = connection.recv_command() {
                simulations.receive_command(command);
            }
            while let Some(snapshot) = connection.recv_snapshot() {
                simulations.receive_snapshot(snapshot);
            }
        }

        let Some(server_seconds) = self
            .clock_syncer
            .server_seconds_since_startup(seconds_since_startup)
        else {
            panic!("ActiveClient updated before its clock was synchronised");
        };
        self.timekeeping_simulations.update(
            delta_seconds,
            server_seconds + self.config.lag_compensation_latency,
        );
    }

    /// Stamps `command` for the next tick, applies it locally and sends it to
    /// the server.
    pub fn issue_command<N: NetworkResource<W>>(&mut self, command: W::Command, net: &mut N) {
        let command = Timestamped::new(command, self.simulating_timestamp());
        self.timekeeping_simulations
            .stepper_mut()
            .receive_command(command.clone());
        net.broadcast_message(Message::Command(command));
    }

    pub fn last_completed_timestamp(&self) -> Timestamp {
        self.timekeeping_simulations
            .stepper()
            .last_completed_timestamp()
    }

    pub fn simulating_timestamp(&self) -> Timestamp {
        self.timekeeping_simulations.stepper().simulating_timestamp()
    }

    pub fn display_state(&self) -> Option<&Tweened<W::DisplayState>> {
        self.timekeeping_simulations.stepper().display_state()
    }

    pub fn last_published_state(&self) -> Option<&Timestamped<W::DisplayState>> {
        self.timekeeping_simulations.stepper().last_published_state()
    }

    pub fn reconciliation_status(&self) -> ReconciliationStatus {
        self.timekeeping_simulations
            .stepper()
            .infer_current_reconciliation_status()
    }

    pub fn simulations(&self) -> &ClientWorldSimulations<W> {
        self.timekeeping_simulations.stepper()
    }

    pub fn clock_syncer(&self) -> &ClockSyncer {
        &self.clock_syncer
    }

    pub fn client_id(&self) -> Option<ConnectionHandle> {
        self.clock_syncer.client_id()
    }

    /// Seconds the local simulation runs ahead of or behind where it should be.
    pub fn timestamp_drift_seconds(&self, seconds_since_startup: f64) -> Option<f64> {
        let server_seconds = self
            .clock_syncer
            .server_seconds_since_startup(seconds_since_startup)?;
        let target = crate::time::FloatTimestamp::from_seconds(
            server_seconds + self.config.lag_compensation_latency,
            self.config.timestep_seconds,
        );
        Some(
            self.timekeeping_simulations
                .timestamp_drift(target)
                .as_seconds(self.config.timestep_seconds),
        )
    }
}
