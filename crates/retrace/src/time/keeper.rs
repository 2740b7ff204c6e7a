use std::time::Instant;

use crate::config::Config;
use crate::time::{FloatTimestamp, Timestamp};

/// Tolerance used when comparing accumulated overshoot against zero, so that
/// float error in repeated additions of the timestep does not add or drop a
/// step.
const OVERSHOOT_EPSILON: f64 = 1e-9;

/// Something that advances in fixed ticks and can be driven by a [`TimeKeeper`].
pub trait Stepper {
    fn step(&mut self);

    fn last_completed_timestamp(&self) -> Timestamp;

    fn reset_last_completed_timestamp(&mut self, timestamp: Timestamp);

    /// Called once at the end of every update with the signed number of
    /// seconds the completed ticks run ahead of the target time.
    fn post_update(&mut self, timestep_overshoot_seconds: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCondition {
    /// Stop on the last tick that does not pass the target time.
    LastUndershoot,
    /// Stop on the first tick that reaches or passes the target time.
    FirstOvershoot,
}

impl TerminationCondition {
    pub fn should_terminate(self, current_overshoot: f64, next_overshoot: f64) -> bool {
        match self {
            TerminationCondition::LastUndershoot => next_overshoot > OVERSHOOT_EPSILON,
            TerminationCondition::FirstOvershoot => current_overshoot >= -OVERSHOOT_EPSILON,
        }
    }

    /// Splits a sub-tick target into the tick this condition would stop on
    /// and the overshoot in seconds that tick has relative to the target.
    pub fn decompose(self, target: FloatTimestamp, timestep_seconds: f64) -> (Timestamp, f64) {
        let snapped = target.round();
        let timestamp = if (snapped - target).ticks().abs() < OVERSHOOT_EPSILON {
            snapped
        } else {
            match self {
                TerminationCondition::LastUndershoot => target.floor(),
                TerminationCondition::FirstOvershoot => target.ceil(),
            }
        };
        let overshoot = (timestamp - target).as_seconds(timestep_seconds);
        (timestamp, overshoot)
    }
}

/// Fixed-timestep driver that keeps a [`Stepper`] locked onto an external
/// clock, nudging the step rate to absorb drift and jumping outright when the
/// drift gets too large.
#[derive(Debug)]
pub struct TimeKeeper<S: Stepper> {
    stepper: S,
    timestep_overshoot_seconds: f64,
    termination: TerminationCondition,
    config: Config,
}

impl<S: Stepper> TimeKeeper<S> {
    pub fn new(stepper: S, config: Config, termination: TerminationCondition) -> Self {
        Self {
            stepper,
            timestep_overshoot_seconds: 0.0,
            termination,
            config,
        }
    }

    pub fn stepper(&self) -> &S {
        &self.stepper
    }

    pub fn stepper_mut(&mut self) -> &mut S {
        &mut self.stepper
    }

    pub fn termination(&self) -> TerminationCondition {
        self.termination
    }

    pub fn timestep_overshoot_seconds(&self) -> f64 {
        self.timestep_overshoot_seconds
    }

    pub fn current_logical_timestamp(&self) -> FloatTimestamp {
        self.stepper.last_completed_timestamp()
            - FloatTimestamp::from_seconds(
                self.timestep_overshoot_seconds,
                self.config.timestep_seconds,
            )
    }

    /// Signed distance in ticks between where the stepper logically is and
    /// where it should be.
    pub fn timestamp_drift(&self, target: FloatTimestamp) -> FloatTimestamp {
        self.current_logical_timestamp() - target
    }

    /// Advances the stepper by `delta_seconds` of wall time, steering it
    /// towards `target_seconds` on the shared timeline.
    pub fn update(&mut self, delta_seconds: f64, target_seconds: f64) {
        let started = Instant::now();

        let compensated_delta_seconds =
            self.delta_seconds_compensated_for_drift(delta_seconds, target_seconds);
        let steps = self.advance_stepper(compensated_delta_seconds);
        self.timeskip_if_needed(target_seconds);
        self.stepper.post_update(self.timestep_overshoot_seconds);

        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > self.config.slow_tick_warning_seconds {
            log::warn!(
                "Slow update: {:.1}ms spent on {} steps (budget {:.1}ms)",
                elapsed * 1000.0,
                steps,
                self.config.slow_tick_warning_seconds * 1000.0
            );
        }
    }

    fn delta_seconds_compensated_for_drift(&self, delta_seconds: f64, target_seconds: f64) -> f64 {
        let timestep = self.config.timestep_seconds;
        let previous_target =
            FloatTimestamp::from_seconds(target_seconds - delta_seconds, timestep);
        let drift_seconds = self.timestamp_drift(previous_target).as_seconds(timestep);
        let drift_seconds = if drift_seconds.abs() < timestep * 0.5 {
            0.0
        } else {
            drift_seconds
        };

        (delta_seconds - drift_seconds).clamp(0.0, self.config.update_delta_seconds_max)
    }

    fn advance_stepper(&mut self, delta_seconds: f64) -> usize {
        let timestep = self.config.timestep_seconds;
        self.timestep_overshoot_seconds -= delta_seconds;

        let mut steps = 0;
        loop {
            let next_overshoot = self.timestep_overshoot_seconds + timestep;
            if self
                .termination
                .should_terminate(self.timestep_overshoot_seconds, next_overshoot)
            {
                break;
            }
            self.stepper.step();
            self.timestep_overshoot_seconds = next_overshoot;
            steps += 1;
        }
        steps
    }

    fn timeskip_if_needed(&mut self, target_seconds: f64) {
        let timestep = self.config.timestep_seconds;
        let target = FloatTimestamp::from_seconds(target_seconds, timestep);
        let drift_seconds = self.timestamp_drift(target).as_seconds(timestep);
        if drift_seconds.abs() < self.config.timestamp_skip_threshold_seconds {
            return;
        }

        let (timestamp, overshoot) = self.termination.decompose(target, timestep);
        log::warn!(
            "Timeskip from {} to {} after drifting {:.3}s",
            self.stepper.last_completed_timestamp(),
            timestamp,
            drift_seconds
        );
        self.stepper.reset_last_completed_timestamp(timestamp);
        self.timestep_overshoot_seconds = overshoot;
    }
}
