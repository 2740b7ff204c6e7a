use std::collections::VecDeque;

use crate::config::Config;
use crate::net::{
    ClockSyncMessage, Connection, ConnectionHandle, Message, NetworkResource, PingTracker,
};
use crate::simulation::World;

/// Estimates the offset between the local clock and the server's clock from
/// periodic round trips.
#[derive(Debug, Clone)]
pub struct ClockSyncer {
    server_seconds_offset: Option<f64>,
    server_seconds_offset_samples: VecDeque<f64>,
    seconds_since_last_request_sent: f64,
    client_id: Option<ConnectionHandle>,
    ping: PingTracker,
    config: Config,
}

impl ClockSyncer {
    pub fn new(config: Config) -> Self {
        Self {
            server_seconds_offset: None,
            server_seconds_offset_samples: VecDeque::with_capacity(
                config.clock_sync_samples_needed_to_store(),
            ),
            seconds_since_last_request_sent: config.clock_sync_request_period,
            client_id: None,
            ping: PingTracker::new(),
            config,
        }
    }

    pub fn update<W, N>(&mut self, delta_seconds: f64, seconds_since_startup: f64, net: &mut N)
    where
        W: World,
        N: NetworkResource<W>,
    {
        self.seconds_since_last_request_sent += delta_seconds;
        if self.seconds_since_last_request_sent >= self.config.clock_sync_request_period {
            self.seconds_since_last_request_sent = 0.0;
            log::trace!("Sending clock sync request at {seconds_since_startup:.3}s");
            net.broadcast_message(Message::ClockSync(ClockSyncMessage {
                client_send_seconds_since_startup: seconds_since_startup,
                server_seconds_since_startup: 0.0,
                client_id: 0,
                client_ping_ms: self.ping.smoothed_ms().unwrap_or(0.0),
            }));
        }

        for (_, connection) in net.connections() {
            while let Some(sync) = connection.recv_clock_sync() {
                let round_trip_seconds =
                    seconds_since_startup - sync.client_send_seconds_since_startup;
                let ping_ms = (round_trip_seconds / 2.0).max(0.0) * 1000.0;
                if let Some(average_ms) = self.ping.add_sample(ping_ms) {
                    connection.set_ping_ms(average_ms);
                }

                let corresponding_client_seconds =
                    (sync.client_send_seconds_since_startup + seconds_since_startup) / 2.0;
                self.add_sample(sync.server_seconds_since_startup - corresponding_client_seconds);

                if let Some(client_id) = self.client_id
                    && client_id != sync.client_id
                {
                    log::warn!(
                        "Server changed our client id from {client_id} to {}",
                        sync.client_id
                    );
                }
                self.client_id = Some(sync.client_id);
            }
        }
    }

    /// Records one offset sample. Once enough samples are stored the trimmed
    /// mean is adopted if this is the first estimate or it moved further than
    /// the tolerated deviation.
    pub fn add_sample(&mut self, server_seconds_offset: f64) {
        self.server_seconds_offset_samples
            .push_front(server_seconds_offset);

        let needed = self.config.clock_sync_samples_needed_to_store();
        if self.server_seconds_offset_samples.len() < needed {
            return;
        }

        let mut sorted: Vec<f64> = self.server_seconds_offset_samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let discard = self.config.clock_sync_samples_to_discard_per_extreme();
        let kept = &sorted[discard..sorted.len() - discard];
        let rolling_mean = kept.iter().sum::<f64>() / kept.len() as f64;

        match self.server_seconds_offset {
            None => {
                log::info!("Clock synchronised with offset {rolling_mean:.4}s");
                self.server_seconds_offset = Some(rolling_mean);
            }
            Some(current)
                if (rolling_mean - current).abs() > self.config.max_tolerable_clock_deviation =>
            {
                log::info!("Clock offset re-synchronised from {current:.4}s to {rolling_mean:.4}s");
                self.server_seconds_offset = Some(rolling_mean);
            }
            Some(_) => {}
        }

        self.server_seconds_offset_samples.pop_back();
    }

    pub fn is_ready(&self) -> bool {
        self.server_seconds_offset.is_some() && self.client_id.is_some()
    }

    pub fn sample_count(&self) -> usize {
        self.server_seconds_offset_samples.len()
    }

    pub fn server_seconds_offset(&self) -> Option<f64> {
        self.server_seconds_offset
    }

    pub fn server_seconds_since_startup(&self, client_seconds_since_startup: f64) -> Option<f64> {
        self.server_seconds_offset
            .map(|offset| client_seconds_since_startup + offset)
    }

    pub fn client_id(&self) -> Option<ConnectionHandle> {
        self.client_id
    }

    pub fn ping_ms(&self) -> Option<f64> {
        self.ping.smoothed_ms()
    }
}
