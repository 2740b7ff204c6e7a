mod active;
mod reconcile;

pub use active::ActiveClient;
pub use reconcile::{ClientWorldSimulations, ReconciliationStatus, Tweened};

use crate::config::Config;
use crate::net::{ClockSyncer, NetworkResource};
use crate::simulation::World;
use crate::time::Timestamp;

/// Connection lifecycle of a [`Client`]. Stages only ever move forward.
#[derive(Debug)]
pub enum ClientStage<W: World> {
    SyncingClock(ClockSyncer),
    SyncingInitialState(ActiveClient<W>),
    Ready(ActiveClient<W>),
}

impl<W: World> ClientStage<W> {
    pub fn name(&self) -> &'static str {
        match self {
            ClientStage::SyncingClock(_) => "syncing clock",
            ClientStage::SyncingInitialState(_) => "syncing initial state",
            ClientStage::Ready(_) => "ready",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ClientStage::Ready(_))
    }
}

#[derive(Debug)]
pub struct Client<W: World> {
    config: Config,
    stage: ClientStage<W>,
}

impl<W: World> Client<W> {
    pub fn new(config: Config) -> Self {
        Self {
            stage: ClientStage::SyncingClock(ClockSyncer::new(config.clone())),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage(&self) -> &ClientStage<W> {
        &self.stage
    }

    pub fn update<N: NetworkResource<W>>(
        &mut self,
        delta_seconds: f64,
        seconds_since_startup: f64,
        net: &mut N,
    ) {
        let delta_seconds = if delta_seconds < 0.0 {
            log::warn!("Client update received negative delta {delta_seconds}s, using 0");
            0.0
        } else {
            delta_seconds
        };

        match &mut self.stage {
            ClientStage::SyncingClock(clock_syncer) => {
                clock_syncer.update::<W, N>(delta_seconds, seconds_since_startup, net);
                if clock_syncer.is_ready()
                    && let Some(server_seconds) =
                        clock_syncer.server_seconds_since_startup(seconds_since_startup)
                {
                    let initial_timestamp = Timestamp::from_seconds(
                        server_seconds + self.config.lag_compensation_latency,
                        self.config.timestep_seconds,
                    );
                    let active = ActiveClient::new(
                        self.config.clone(),
                        clock_syncer.clone(),
                        initial_timestamp,
                    );
                    self.stage = ClientStage::SyncingInitialState(active);
                }
            }
            ClientStage::SyncingInitialState(active) => {
                active.update(delta_seconds, seconds_since_startup, net);
                if active.display_state().is_some() {
                    log::info!("Client ready at {}", active.last_completed_timestamp());
                    self.promote_to_ready();
                }
            }
            ClientStage::Ready(active) => {
                active.update(delta_seconds, seconds_since_startup, net);
            }
        }
    }

    fn promote_to_ready(&mut self) {
        let placeholder = ClientStage::SyncingClock(ClockSyncer::new(self.config.clone()));
        self.stage = match std::mem::replace(&mut self.stage, placeholder) {
            ClientStage::SyncingInitialState(active) => ClientStage::Ready(active),
            other => other,
        };
    }

    /// Issues a command once the client is ready. Earlier commands are
    /// dropped since there is no world to predict them against yet.
    pub fn issue_command<N: NetworkResource<W>>(&mut self, command: W::Command, net: &mut N) {
        match &mut self.stage {
            ClientStage::Ready(active) => active.issue_command(command, net),
            stage => log::debug!("Dropping command issued while {}", stage.name()),
        }
    }

    pub fn active(&self) -> Option<&ActiveClient<W>> {
        match &self.stage {
            ClientStage::SyncingInitialState(active) | ClientStage::Ready(active) => Some(active),
            ClientStage::SyncingClock(_) => None,
        }
    }

    pub fn display_state(&self) -> Option<&Tweened<W::DisplayState>> {
        match &self.stage {
            ClientStage::Ready(active) => active.display_state(),
            _ => None,
        }
    }

    pub fn reconciliation_status(&self) -> Option<ReconciliationStatus> {
        self.active().map(ActiveClient::reconciliation_status)
    }
}
