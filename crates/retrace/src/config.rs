/// How the client turns its two most recently published ticks into the state
/// shown for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TweeningMethod {
    /// Always show the last tick that has fully passed.
    MostRecentlyPassed,
    /// Snap to whichever of the two ticks is closer to the current time.
    Nearest,
    /// Blend between the two ticks with the raw sub-tick fraction.
    #[default]
    Interpolated,
}

impl TweeningMethod {
    pub fn shape_interpolation_t(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            TweeningMethod::MostRecentlyPassed => t.floor(),
            TweeningMethod::Nearest => t.round(),
            TweeningMethod::Interpolated => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds simulated by a single world step.
    pub timestep_seconds: f64,
    /// Seconds it takes to blend a corrected world into the displayed one.
    pub blend_latency: f64,
    /// How far the server runs behind the shared clock, and how far clients
    /// predict ahead of it. Also known as the server time delay latency.
    pub lag_compensation_latency: f64,
    pub clock_sync_needed_sample_count: usize,
    pub clock_sync_request_period: f64,
    pub clock_sync_assumed_outlier_rate: f64,
    pub max_tolerable_clock_deviation: f64,
    /// Period of the plain (non lag-compensated) snapshot broadcast.
    pub snapshot_send_period: f64,
    pub update_delta_seconds_max: f64,
    pub timestamp_skip_threshold_seconds: f64,
    pub fastforward_max_per_step: usize,
    pub tweening_method: TweeningMethod,
    pub lag_compensate_commands: bool,
    /// Extra ticks of server command history kept beyond `2 * lag`.
    pub command_history_size: usize,
    pub slow_tick_warning_seconds: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timestep_seconds: 1.0 / 60.0,
            blend_latency: 0.2,
            lag_compensation_latency: 0.3,
            clock_sync_needed_sample_count: 8,
            clock_sync_request_period: 0.2,
            clock_sync_assumed_outlier_rate: 0.2,
            max_tolerable_clock_deviation: 0.1,
            snapshot_send_period: 0.1,
            update_delta_seconds_max: 0.25,
            timestamp_skip_threshold_seconds: 1.0,
            fastforward_max_per_step: 10,
            tweening_method: TweeningMethod::Interpolated,
            lag_compensate_commands: true,
            command_history_size: 64,
            slow_tick_warning_seconds: 0.05,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lag compensation latency expressed in whole ticks.
    pub fn lag_compensation_frame_count(&self) -> i16 {
        (self.lag_compensation_latency / self.timestep_seconds).round() as i16
    }

    pub fn blend_progress_per_frame(&self) -> f64 {
        self.timestep_seconds / self.blend_latency
    }

    pub fn clock_sync_samples_to_discard_per_extreme(&self) -> usize {
        (self.clock_sync_needed_sample_count as f64 * self.clock_sync_assumed_outlier_rate / 2.0)
            .max(1.0)
            .ceil() as usize
    }

    pub fn clock_sync_samples_needed_to_store(&self) -> usize {
        self.clock_sync_needed_sample_count + self.clock_sync_samples_to_discard_per_extreme() * 2
    }

    /// Ticks of command history the server keeps around for rollbacks.
    pub fn command_history_retention(&self) -> i16 {
        let retention = 2 * i32::from(self.lag_compensation_frame_count())
            + self.command_history_size as i32;
        retention.clamp(0, i32::from(crate::time::COMPARABLE_HALF_WINDOW) - 1) as i16
    }

    /// Converts a one-way latency in milliseconds into whole ticks.
    pub fn latency_frame_count(&self, latency_ms: f64) -> i16 {
        (latency_ms / 1000.0 / self.timestep_seconds)
            .round()
            .clamp(0.0, f64::from(crate::time::COMPARABLE_HALF_WINDOW)) as i16
    }
}
