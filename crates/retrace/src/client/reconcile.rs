use std::cmp::Ordering;

use crate::config::Config;
use crate::simulation::{CommandBuffer, DisplayState, OldNew, Simulation, World};
use crate::time::{FloatTimestamp, Stepper, Timestamp, Timestamped};

/// What the client is doing to bring its displayed world in line with the
/// server, derived each step from the two simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationStatus {
    /// Both worlds agree and blending is done; the next queued snapshot is
    /// loaded as soon as it arrives.
    AwaitingSnapshot,
    /// Both worlds are on the same tick and the display is moving from the
    /// old one to the new one.
    Blending,
    /// The corrected world is ahead of the displayed one and waits for it.
    FastForwardingOvershot,
    /// The corrected world is still catching up but a newer snapshot has
    /// already arrived, so its progress is thrown away.
    FastForwardingObsolete,
    /// The corrected world is catching up to the displayed one.
    FastForwardingHealthy,
}

/// A display state sampled at a sub-tick position.
#[derive(Debug, Clone, PartialEq)]
pub struct Tweened<D> {
    display_state: D,
    timestamp: FloatTimestamp,
}

impl<D: DisplayState> Tweened<D> {
    pub fn from_interpolation(state1: &Timestamped<D>, state2: &Timestamped<D>, t: f64) -> Self {
        let span = f64::from(state2.timestamp() - state1.timestamp());
        Self {
            display_state: D::from_interpolation(state1.inner(), state2.inner(), t),
            timestamp: FloatTimestamp::from(state1.timestamp())
                + FloatTimestamp::from_unwrapped(span * t),
        }
    }

    fn exactly(state: &Timestamped<D>) -> Self {
        Self {
            display_state: state.inner().clone(),
            timestamp: FloatTimestamp::from(state.timestamp()),
        }
    }
}

impl<D> Tweened<D> {
    pub fn display_state(&self) -> &D {
        &self.display_state
    }

    pub fn float_timestamp(&self) -> FloatTimestamp {
        self.timestamp
    }
}

/// The client's pair of simulations: `old` is what the player sees and keeps
/// predicting, `new` is rebuilt from the latest server snapshot and fast
/// forwarded until it can be blended into view.
#[derive(Debug)]
pub struct ClientWorldSimulations<W: World> {
    queued_snapshot: Option<Timestamped<W::Snapshot>>,
    last_queued_snapshot_timestamp: Option<Timestamp>,
    base_command_buffer: CommandBuffer<W::Command>,
    world_simulations: OldNew<Simulation<W>>,
    blend_old_new_interpolation_t: f64,
    states: OldNew<Option<Timestamped<W::DisplayState>>>,
    display_state: Option<Tweened<W::DisplayState>>,
    config: Config,
}

impl<W: World> ClientWorldSimulations<W> {
    pub fn new(config: Config, initial_timestamp: Timestamp) -> Self {
        let mut world_simulations = OldNew::new(Simulation::new(), Simulation::new());
        world_simulations
            .old_mut()
            .reset_last_completed_timestamp(initial_timestamp);
        world_simulations
            .new_mut()
            .reset_last_completed_timestamp(initial_timestamp);

        let mut base_command_buffer = CommandBuffer::new();
        base_command_buffer.update_timestamp(initial_timestamp);

        Self {
            queued_snapshot: None,
            last_queued_snapshot_timestamp: None,
            base_command_buffer,
            world_simulations,
            blend_old_new_interpolation_t: 1.0,
            states: OldNew::new(None, None),
            display_state: None,
            config,
        }
    }

    pub fn last_completed_timestamp(&self) -> Timestamp {
        self.world_simulations.old().last_completed_timestamp()
    }

    pub fn simulating_timestamp(&self) -> Timestamp {
        self.world_simulations.old().simulating_timestamp()
    }

    pub fn blend_progress(&self) -> f64 {
        self.blend_old_new_interpolation_t
    }

    pub fn queued_snapshot_timestamp(&self) -> Option<Timestamp> {
        self.queued_snapshot.as_ref().map(Timestamped::timestamp)
    }

    pub fn display_state(&self) -> Option<&Tweened<W::DisplayState>> {
        self.display_state.as_ref()
    }

    /// The most recently published whole-tick state.
    pub fn last_published_state(&self) -> Option<&Timestamped<W::DisplayState>> {
        self.states.new_value().as_ref()
    }

    pub fn world_simulations(&self) -> &OldNew<Simulation<W>> {
        &self.world_simulations
    }

    pub fn base_command_buffer(&self) -> &CommandBuffer<W::Command> {
        &self.base_command_buffer
    }

    pub fn receive_command(&mut self, command: Timestamped<W::Command>) {
        log::trace!("Received command for {}", command.timestamp());
        self.base_command_buffer.insert(command.clone());
        self.world_simulations
            .old_mut()
            .schedule_command(command.clone());
        self.world_simulations.new_mut().schedule_command(command);
    }

    pub fn receive_snapshot(&mut self, snapshot: Timestamped<W::Snapshot>) {
        let timestamp = snapshot.timestamp();
        let last_completed = self.last_completed_timestamp();

        if let Err(err) = timestamp.check_acceptable(last_completed) {
            log::warn!("Dropping snapshot: {err}");
            return;
        }
        if timestamp > last_completed {
            log::warn!(
                "Dropping snapshot from the future: {timestamp} is ahead of {last_completed}"
            );
            return;
        }
        if let Some(last_queued) = self.last_queued_snapshot_timestamp
            && last_queued.check_acceptable(last_completed).is_ok()
            && timestamp <= last_queued
        {
            log::debug!("Discarding stale snapshot {timestamp}, already queued {last_queued}");
            return;
        }

        self.last_queued_snapshot_timestamp = Some(timestamp);
        self.queued_snapshot = Some(snapshot);
    }

    pub fn infer_current_reconciliation_status(&self) -> ReconciliationStatus {
        let (old, new) = self.world_simulations.get();
        match new
            .last_completed_timestamp()
            .cmp(&old.last_completed_timestamp())
        {
            Ordering::Equal if self.blend_old_new_interpolation_t < 1.0 => {
                ReconciliationStatus::Blending
            }
            Ordering::Equal => ReconciliationStatus::AwaitingSnapshot,
            Ordering::Greater => ReconciliationStatus::FastForwardingOvershot,
            Ordering::Less => match &self.queued_snapshot {
                Some(snapshot) if snapshot.timestamp() > new.last_completed_timestamp() => {
                    ReconciliationStatus::FastForwardingObsolete
                }
                _ => ReconciliationStatus::FastForwardingHealthy,
            },
        }
    }

    fn step(&mut self) {
        let status = self.infer_current_reconciliation_status();
        log::trace!(
            "Client step at {} is {:?} (t = {:.2})",
            self.last_completed_timestamp(),
            status,
            self.blend_old_new_interpolation_t
        );

        match status {
            ReconciliationStatus::AwaitingSnapshot => match self.queued_snapshot.take() {
                Some(snapshot) => {
                    self.world_simulations.swap();
                    self.load_snapshot(snapshot);
                    self.simulate_next_frame();
                    self.publish_old_state();
                }
                None => {
                    self.simulate_next_frame();
                    self.publish_blended_state();
                }
            },
            ReconciliationStatus::Blending => {
                self.blend_old_new_interpolation_t = (self.blend_old_new_interpolation_t
                    + self.config.blend_progress_per_frame())
                .clamp(0.0, 1.0);
                self.simulate_next_frame();
                self.publish_blended_state();
            }
            ReconciliationStatus::FastForwardingObsolete => {
                if let Some(snapshot) = self.queued_snapshot.take() {
                    self.load_snapshot(snapshot);
                }
                self.simulate_next_frame();
                self.publish_old_state();
            }
            ReconciliationStatus::FastForwardingOvershot
            | ReconciliationStatus::FastForwardingHealthy => {
                self.simulate_next_frame();
                self.publish_old_state();
            }
        }
    }

    fn load_snapshot(&mut self, snapshot: Timestamped<W::Snapshot>) {
        let timestamp = snapshot.timestamp();
        log::trace!("Loading snapshot {timestamp}");
        self.base_command_buffer.drain_up_to(timestamp);
        self.world_simulations
            .new_mut()
            .apply_completed_snapshot(snapshot, self.base_command_buffer.clone());
        self.blend_old_new_interpolation_t = 0.0;
    }

    fn simulate_next_frame(&mut self) {
        self.world_simulations.old_mut().step();
        let target = self.world_simulations.old().last_completed_timestamp();
        self.world_simulations
            .new_mut()
            .try_completing_simulations_up_to(target, self.config.fastforward_max_per_step);
        self.base_command_buffer.update_timestamp(target);
    }

    fn publish(&mut self, state: Option<Timestamped<W::DisplayState>>) {
        self.states.swap();
        *self.states.new_mut() = state;
    }

    fn publish_old_state(&mut self) {
        let state = self.world_simulations.old().display_state();
        self.publish(state);
    }

    fn publish_blended_state(&mut self) {
        let (old, new) = self.world_simulations.get();
        let state = match (old.display_state(), new.display_state()) {
            (Some(old_state), Some(new_state)) => {
                let blended = W::DisplayState::from_interpolation(
                    old_state.inner(),
                    new_state.inner(),
                    self.blend_old_new_interpolation_t,
                );
                Some(Timestamped::new(blended, new_state.timestamp()))
            }
            (None, new_state) => new_state,
            (old_state, None) => old_state,
        };
        self.publish(state);
    }
}

impl<W: World> Stepper for ClientWorldSimulations<W> {
    fn step(&mut self) {
        ClientWorldSimulations::step(self);
    }

    fn last_completed_timestamp(&self) -> Timestamp {
        ClientWorldSimulations::last_completed_timestamp(self)
    }

    fn reset_last_completed_timestamp(&mut self, timestamp: Timestamp) {
        let old_timestamp = self.last_completed_timestamp();
        if self.world_simulations.new_value().last_completed_timestamp() == old_timestamp {
            self.world_simulations
                .new_mut()
                .reset_last_completed_timestamp(timestamp);
        }
        self.world_simulations
            .old_mut()
            .reset_last_completed_timestamp(timestamp);
        self.base_command_buffer.update_timestamp(timestamp);

        if let Some(queued) = self.queued_snapshot_timestamp()
            && (queued.check_acceptable(timestamp).is_err() || queued > timestamp)
        {
            log::warn!("Dropping queued snapshot {queued} after skipping to {timestamp}");
            self.queued_snapshot = None;
        }
    }

    fn post_update(&mut self, timestep_overshoot_seconds: f64) {
        let tween_t = self.config.tweening_method.shape_interpolation_t(
            1.0 - timestep_overshoot_seconds / self.config.timestep_seconds,
        );

        self.display_state = match self.states.get() {
            (Some(undershot), Some(overshot)) => {
                Some(Tweened::from_interpolation(undershot, overshot, tween_t))
            }
            (None, Some(state)) | (Some(state), None) => Some(Tweened::exactly(state)),
            (None, None) => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionHandle;
    use crate::simulation::Command;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tally {
        total: i64,
    }

    #[derive(Debug, Clone)]
    struct Bump(i64);

    impl Command for Bump {}

    impl DisplayState for Tally {
        fn from_interpolation(state1: &Self, state2: &Self, t: f64) -> Self {
            let total = state1.total as f64 + (state2.total - state1.total) as f64 * t;
            Tally {
                total: total.round() as i64,
            }
        }
    }

    impl World for Tally {
        type Command = Bump;
        type Snapshot = Tally;
        type DisplayState = Tally;

        fn step(&mut self) {}

        fn command_is_valid(&self, _command: &Bump, _client: ConnectionHandle) -> bool {
            true
        }

        fn apply_command(&mut self, command: &Bump) {
            self.total += command.0;
        }

        fn apply_snapshot(&mut self, snapshot: Tally) {
            *self = snapshot;
        }

        fn snapshot(&self) -> Tally {
            self.clone()
        }

        fn display_state(&self) -> Tally {
            self.clone()
        }
    }

    fn simulations() -> ClientWorldSimulations<Tally> {
        let config = Config {
            timestep_seconds: 1.0 / 60.0,
            blend_latency: 4.0 / 60.0,
            fastforward_max_per_step: 3,
            ..Default::default()
        };
        ClientWorldSimulations::new(config, Timestamp::new(100))
    }

    fn step_n(simulations: &mut ClientWorldSimulations<Tally>, n: usize) {
        for _ in 0..n {
            Stepper::step(simulations);
        }
    }

    #[test]
    fn starts_awaiting_first_snapshot() {
        let simulations = simulations();
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::AwaitingSnapshot
        );
        assert!(simulations.last_published_state().is_none());
    }

    #[test]
    fn future_and_stale_snapshots_are_dropped() {
        let mut simulations = simulations();
        simulations.receive_snapshot(Timestamped::new(Tally::default(), Timestamp::new(101)));
        assert_eq!(simulations.queued_snapshot_timestamp(), None);

        simulations.receive_snapshot(Timestamped::new(Tally::default(), Timestamp::new(98)));
        simulations.receive_snapshot(Timestamped::new(Tally::default(), Timestamp::new(97)));
        assert_eq!(simulations.queued_snapshot_timestamp(), Some(Timestamp::new(98)));

        simulations.receive_snapshot(Timestamped::new(Tally::default(), Timestamp::new(99)));
        assert_eq!(simulations.queued_snapshot_timestamp(), Some(Timestamp::new(99)));
    }

    #[test]
    fn snapshot_is_fast_forwarded_then_blended() {
        let mut simulations = simulations();
        simulations.receive_command(Timestamped::new(Bump(1), Timestamp::new(99)));
        simulations.receive_command(Timestamped::new(Bump(10), Timestamp::new(103)));
        simulations.receive_snapshot(Timestamped::new(Tally { total: 5 }, Timestamp::new(96)));

        // Load at 96, fast forward three ticks while old reaches 101.
        step_n(&mut simulations, 1);
        let (old, new) = simulations.world_simulations().get();
        assert_eq!(old.last_completed_timestamp(), Timestamp::new(101));
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(99));
        assert_eq!(new.world().total, 6);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::FastForwardingHealthy
        );

        step_n(&mut simulations, 1);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::Blending
        );

        // Blending takes four steps at this blend latency.
        step_n(&mut simulations, 4);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::AwaitingSnapshot
        );
        let published = simulations.last_published_state().expect("published");
        assert_eq!(published.timestamp(), Timestamp::new(106));
        assert_eq!(published.inner().total, 16);
    }

    #[test]
    fn newer_snapshot_makes_fast_forward_obsolete() {
        let mut simulations = simulations();
        step_n(&mut simulations, 10);
        simulations.receive_snapshot(Timestamped::new(Tally { total: 1 }, Timestamp::new(100)));
        step_n(&mut simulations, 1);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::FastForwardingHealthy
        );

        simulations.receive_snapshot(Timestamped::new(Tally { total: 2 }, Timestamp::new(105)));
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::FastForwardingObsolete
        );
        step_n(&mut simulations, 1);
        let new = simulations.world_simulations().new_value();
        assert_eq!(new.world().total, 2);
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(108));
        assert_eq!(simulations.queued_snapshot_timestamp(), None);
    }

    #[test]
    fn tweening_follows_overshoot() {
        let mut simulations = simulations();
        simulations.receive_snapshot(Timestamped::new(Tally { total: 0 }, Timestamp::new(100)));
        step_n(&mut simulations, 1);
        simulations.receive_command(Timestamped::new(Bump(10), Timestamp::new(102)));
        step_n(&mut simulations, 6);

        let timestep = 1.0 / 60.0;
        simulations.post_update(0.25 * timestep);
        let display = simulations.display_state().expect("display");
        assert!((display.float_timestamp().ticks() - 106.75).abs() < 1e-9);
    }

    #[test]
    fn skipping_far_ahead_drops_queued_snapshot() {
        let mut simulations = simulations();
        step_n(&mut simulations, 5);
        simulations.receive_snapshot(Timestamped::new(Tally { total: 3 }, Timestamp::new(104)));
        assert_eq!(simulations.queued_snapshot_timestamp(), Some(Timestamp::new(104)));

        Stepper::reset_last_completed_timestamp(&mut simulations, Timestamp::new(30000));
        let (old, new) = simulations.world_simulations().get();
        assert_eq!(old.last_completed_timestamp(), Timestamp::new(30000));
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(30000));
        assert_eq!(simulations.queued_snapshot_timestamp(), None);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::AwaitingSnapshot
        );
    }

    #[test]
    fn skipping_back_behind_fast_forward_waits_for_old() {
        let mut simulations = simulations();
        step_n(&mut simulations, 10);
        simulations.receive_snapshot(Timestamped::new(Tally { total: 1 }, Timestamp::new(100)));
        step_n(&mut simulations, 1);
        let (old, new) = simulations.world_simulations().get();
        assert_eq!(old.last_completed_timestamp(), Timestamp::new(111));
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(103));

        // Only old is moved since new is not level with it.
        Stepper::reset_last_completed_timestamp(&mut simulations, Timestamp::new(102));
        let (old, new) = simulations.world_simulations().get();
        assert_eq!(old.last_completed_timestamp(), Timestamp::new(102));
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(103));
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::FastForwardingOvershot
        );

        step_n(&mut simulations, 1);
        let (old, new) = simulations.world_simulations().get();
        assert_eq!(old.last_completed_timestamp(), Timestamp::new(103));
        assert_eq!(new.last_completed_timestamp(), Timestamp::new(103));
        assert_eq!(new.world().total, 1);
        assert_eq!(
            simulations.infer_current_reconciliation_status(),
            ReconciliationStatus::Blending
        );
    }
}
