mod arena;

use anyhow::{Result, ensure};
use clap::{Parser, ValueEnum};
use glam::Vec2;
use retrace::{Client, Config, LinkConditions, MemoryNetwork, Server};

use arena::{Arena, Impulse};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Link {
    Perfect,
    Good,
    Average,
    Poor,
}

impl Link {
    fn conditions(self) -> LinkConditions {
        match self {
            Link::Perfect => LinkConditions::perfect(),
            Link::Good => LinkConditions::good(),
            Link::Average => LinkConditions::average(),
            Link::Poor => LinkConditions::poor(),
        }
    }
}

#[derive(Parser)]
#[command(name = "retrace-demo")]
#[command(about = "Headless server and clients reconciling over a simulated link")]
struct Args {
    #[arg(short, long, default_value_t = 4)]
    clients: usize,

    #[arg(short, long, default_value_t = 20.0, help = "Simulated seconds to run")]
    seconds: f64,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 144, help = "Host frames per second")]
    frame_rate: u32,

    #[arg(long, value_enum, default_value_t = Link::Average)]
    link: Link,

    #[arg(long, default_value_t = 300, help = "Lag compensation latency in ms")]
    lag_ms: u32,

    #[arg(long, help = "Broadcast plain snapshots instead of lag-compensated ones")]
    no_lag_compensation: bool,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    ensure!(args.tick_rate > 0, "tick rate must be positive");
    ensure!(args.frame_rate > 0, "frame rate must be positive");
    ensure!(args.clients > 0, "at least one client is needed");

    let config = Config {
        timestep_seconds: 1.0 / f64::from(args.tick_rate),
        lag_compensation_latency: f64::from(args.lag_ms) / 1000.0,
        lag_compensate_commands: !args.no_lag_compensation,
        ..Default::default()
    };

    let mut network = MemoryNetwork::<Arena>::new(args.link.conditions(), args.seed);
    let mut server = Server::with_world(
        Arena::new(args.clients, config.timestep_seconds as f32),
        config.clone(),
        0.0,
    );
    let mut clients: Vec<Client<Arena>> = (0..args.clients)
        .map(|_| {
            network.connect_client();
            Client::new(config.clone())
        })
        .collect();

    log::info!(
        "Running {} clients for {}s at {}Hz over a {:?} link",
        args.clients,
        args.seconds,
        args.tick_rate,
        args.link
    );

    let frame_seconds = 1.0 / f64::from(args.frame_rate);
    let frames = (args.seconds / frame_seconds).ceil() as u64;
    for frame in 0..frames {
        let now = frame as f64 * frame_seconds;
        network.advance(now);

        for (handle, client) in clients.iter_mut().enumerate() {
            let Some(net) = network.client_mut(handle) else {
                continue;
            };
            client.update(frame_seconds, now, net);

            if frame % u64::from(args.frame_rate / 4).max(1) == handle as u64 {
                let impulse = Impulse {
                    owner: handle as u64,
                    delta_velocity: steer(frame, handle),
                };
                client.issue_command(impulse, net);
            }
        }

        server.update(frame_seconds, now, network.server_mut());

        if frame % u64::from(args.frame_rate) == 0 {
            report(now, &server, &clients);
        }
    }

    log::info!(
        "Done at server tick {}, {} messages lost",
        server.last_completed_timestamp(),
        network.dropped()
    );
    Ok(())
}

/// A slowly rotating push, different for every player.
fn steer(frame: u64, handle: usize) -> Vec2 {
    let angle = frame as f32 * 0.01 + handle as f32;
    Vec2::from_angle(angle) * 2.0
}

fn report(now: f64, server: &Server<Arena>, clients: &[Client<Arena>]) {
    for (handle, client) in clients.iter().enumerate() {
        let Some(active) = client.active() else {
            log::info!("[{now:6.2}s] client {handle}: {}", client.stage().name());
            continue;
        };

        // Distance between where this client shows its own player and where
        // the server has it.
        let error = client
            .display_state()
            .and_then(|view| {
                let shown = view
                    .display_state()
                    .positions
                    .iter()
                    .find(|(owner, _)| *owner == handle as u64)?
                    .1;
                let actual = server.world().player(handle as u64)?.position;
                Some(shown.distance(actual))
            })
            .unwrap_or(f32::NAN);

        log::info!(
            "[{now:6.2}s] client {handle}: {} at {}, {:?}, drift {:+.4}s, off by {error:.2}",
            client.stage().name(),
            active.last_completed_timestamp(),
            active.reconciliation_status(),
            active.timestamp_drift_seconds(now).unwrap_or(0.0),
        );
    }
}
