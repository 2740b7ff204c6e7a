/// Number of samples averaged into one ping estimate.
pub const PING_SAMPLE_WINDOW: usize = 10;

/// Collects latency samples in fixed windows and publishes their average once
/// per full window.
#[derive(Debug, Clone, Default)]
pub struct PingTracker {
    samples: Vec<f64>,
    smoothed_ms: Option<f64>,
}

impl PingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample, returning the new average when it completes a window.
    pub fn add_sample(&mut self, ping_ms: f64) -> Option<f64> {
        self.samples.push(ping_ms.max(0.0));
        if self.samples.len() < PING_SAMPLE_WINDOW {
            return None;
        }

        let average = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        self.samples.clear();
        self.smoothed_ms = Some(average);
        Some(average)
    }

    pub fn smoothed_ms(&self) -> Option<f64> {
        self.smoothed_ms
    }

    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }
}
