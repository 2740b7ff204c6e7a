mod common;

use std::collections::HashSet;

use common::{Harness, Nudge, TIMESTEP, TokenWorld, config, init_logger, one_tick_link};
use retrace::net::memory::MemoryServerNet;
use retrace::{
    Config, Connection, LinkConditions, MemoryNetwork, NetworkResource, OwnerId, Server, Timestamp,
    Timestamped,
};

/// A server with two connected (but silent) clients that receives one nudge
/// from each of them after every update, so every tick of history holds
/// exactly one command per owner.
fn busy_server(
    config: Config,
    iterations: u32,
) -> (Server<TokenWorld>, MemoryNetwork<TokenWorld>) {
    let mut network = MemoryNetwork::new(LinkConditions::perfect(), 1);
    network.connect_client();
    network.connect_client();
    let mut server = Server::new(config, 0.0);

    for k in 0..iterations {
        let now = f64::from(k) * TIMESTEP;
        network.advance(now);
        let net = network.server_mut();
        server.update(TIMESTEP, now, net);
        nudge(&mut server, net, 0, 1);
        nudge(&mut server, net, 1, 10);
    }
    (server, network)
}

fn nudge(
    server: &mut Server<TokenWorld>,
    net: &mut MemoryServerNet<TokenWorld>,
    owner: u64,
    amount: i64,
) {
    let command = Timestamped::new(Nudge { owner, amount }, Timestamp::new(0));
    server.receive_command(command, owner as usize, net);
}

#[test]
fn test_server_runs_lag_behind_clock() {
    init_logger();
    let (server, _) = busy_server(config(), 40);

    assert_eq!(server.last_completed_timestamp(), Timestamp::new(31));
    assert_eq!(server.simulating_timestamp(), Timestamp::new(32));
    // The nudges received after the last update are scheduled, not applied.
    assert_eq!(server.world().position(0), 39);
    assert_eq!(server.world().position(1), 390);
}

#[test]
fn test_rolled_back_world_undoes_recent_ticks() {
    init_logger();
    let (server, _) = busy_server(config(), 40);

    let world = server.rolled_back_world(8);
    assert_eq!(world.position(0), 31);
    assert_eq!(world.position(1), 310);
    assert_eq!(server.rolled_back_world(0), *server.world());
}

#[test]
fn test_snapshot_mixes_rollback_horizons() {
    init_logger();
    let (server, _) = busy_server(config(), 40);

    let snapshot = server
        .lag_compensated_snapshot(Some(OwnerId(0)), 2)
        .unwrap();
    assert_eq!(snapshot.timestamp(), Timestamp::new(31 + 6));
    // Own token rolled back by the lag, the other by the lag plus the round
    // trip.
    assert_eq!(snapshot.inner().position(0), 39 - 8);
    assert_eq!(snapshot.inner().position(1), 390 - 120);
    assert_eq!(snapshot.inner().position(2), 0);
    let owners: Vec<u64> = snapshot.inner().tokens.iter().map(|token| token.owner).collect();
    assert_eq!(owners, vec![0, 1, 2, 3]);
}

#[test]
fn test_spectator_snapshot_uses_deepest_rollback() {
    init_logger();
    let (server, _) = busy_server(config(), 40);

    let snapshot = server.lag_compensated_snapshot(None, 2).unwrap();
    assert_eq!(snapshot.inner().position(0), 39 - 12);
    assert_eq!(snapshot.inner().position(1), 390 - 120);
}

#[test]
fn test_rollback_depth_is_clamped_to_history() {
    init_logger();
    let (server, _) = busy_server(config(), 80);
    let retention = i64::from(server.config().command_history_retention());
    assert_eq!(retention, 32);

    let snapshot = server.lag_compensated_snapshot(None, 100).unwrap();
    assert_eq!(snapshot.inner().position(0), 79 - retention);
    assert_eq!(snapshot.inner().position(1), 790 - 10 * retention);
}

#[test]
fn test_invalid_command_is_dropped() {
    init_logger();
    let (mut server, mut network) = busy_server(config(), 10);
    let recorded = server.command_history().len();

    nudge(&mut server, network.server_mut(), 5, 5);
    let foreign = Timestamped::new(Nudge { owner: 1, amount: 5 }, Timestamp::new(0));
    server.receive_command(foreign, 0, network.server_mut());

    assert_eq!(server.command_history().len(), recorded);
}

#[test]
fn test_command_is_forwarded_to_peers_only() {
    init_logger();
    let (mut server, mut network) = busy_server(config(), 10);
    let now = 10.0 * TIMESTEP;
    // Drain everything sent so far.
    network.advance(now);
    for handle in 0..2 {
        let connection = network.client_mut(handle).unwrap();
        for (_, connection) in connection.connections() {
            while connection.recv_command().is_some() {}
        }
    }

    let stamped_at = server.simulating_timestamp();
    nudge(&mut server, network.server_mut(), 0, 7);
    network.advance(now);

    let origin = network.client_mut(0).unwrap();
    for (_, connection) in origin.connections() {
        assert!(connection.recv_command().is_none());
    }

    let peer = network.client_mut(1).unwrap();
    let forwarded: Vec<_> = peer
        .connections()
        .flat_map(|(_, connection)| std::iter::from_fn(move || connection.recv_command()))
        .collect();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].inner(), &Nudge { owner: 0, amount: 7 });
    // No measured ping yet: lag plus the render buffer.
    assert_eq!(forwarded[0].timestamp(), stamped_at + 8 + 3);
}

#[test]
fn test_lag_compensated_snapshots_go_out_in_tranches() {
    init_logger();
    let mut network = MemoryNetwork::<TokenWorld>::new(LinkConditions::perfect(), 1);
    network.connect_client();
    let mut server = Server::<TokenWorld>::new(config(), 0.0);

    let mut received = Vec::new();
    for k in 0..30 {
        let now = f64::from(k) * TIMESTEP;
        network.advance(now);
        server.update(TIMESTEP, now, network.server_mut());
        network.advance(now);
        for (_, connection) in network.client_mut(0).unwrap().connections() {
            while let Some(snapshot) = connection.recv_snapshot() {
                received.push((server.last_completed_timestamp(), snapshot.timestamp()));
            }
        }
    }

    assert!(received.len() >= 4);
    for (now, label) in received {
        assert_eq!(now.ticks().rem_euclid(6), 0);
        assert_eq!(label, now + 8);
    }
}

#[test]
fn test_periodic_snapshots_without_lag_compensation() {
    init_logger();
    let config = Config {
        lag_compensate_commands: false,
        ..config()
    };
    let mut network = MemoryNetwork::<TokenWorld>::new(LinkConditions::perfect(), 1);
    network.connect_client();
    let mut server = Server::<TokenWorld>::new(config, 0.0);

    let mut received = Vec::new();
    for k in 0..64 {
        let now = f64::from(k) * TIMESTEP;
        network.advance(now);
        server.update(TIMESTEP, now, network.server_mut());
        network.advance(now);
        for (_, connection) in network.client_mut(0).unwrap().connections() {
            while let Some(snapshot) = connection.recv_snapshot() {
                received.push((server.last_completed_timestamp(), snapshot.timestamp()));
            }
        }
    }

    // One second at a 0.1s period, rounded to whole ticks.
    assert!((8..=10).contains(&received.len()), "{} snapshots", received.len());
    for (now, label) in received {
        assert_eq!(label, now + 16);
    }
}

/// Runs a bare server with `clients` silent connections at the given host
/// frame length and returns the labels each connection received.
fn snapshot_labels(clients: usize, frame_seconds: f64, frames: u32) -> Vec<Vec<Timestamp>> {
    let mut network = MemoryNetwork::<TokenWorld>::new(LinkConditions::perfect(), 1);
    for _ in 0..clients {
        network.connect_client();
    }
    let mut server = Server::<TokenWorld>::new(config(), 0.0);

    let mut labels = vec![Vec::new(); clients];
    for k in 0..frames {
        let now = f64::from(k) * frame_seconds;
        network.advance(now);
        server.update(frame_seconds, now, network.server_mut());
        network.advance(now);
        for (handle, received) in labels.iter_mut().enumerate() {
            for (_, connection) in network.client_mut(handle).unwrap().connections() {
                while let Some(snapshot) = connection.recv_snapshot() {
                    received.push(snapshot.timestamp());
                }
            }
        }
    }
    labels
}

#[test]
fn test_every_tranche_is_served_at_two_ticks_per_frame() {
    init_logger();
    let labels = snapshot_labels(6, 2.0 * TIMESTEP, 30);

    for (handle, received) in labels.iter().enumerate() {
        assert!(received.len() >= 8, "connection {handle} got {received:?}");
    }
}

#[test]
fn test_half_tick_frames_do_not_repeat_snapshots() {
    init_logger();
    let labels = snapshot_labels(1, 0.5 * TIMESTEP, 60);

    let received = &labels[0];
    assert!(received.len() >= 4, "got {received:?}");
    let unique: HashSet<Timestamp> = received.iter().copied().collect();
    assert_eq!(unique.len(), received.len(), "repeated labels in {received:?}");
}

#[test]
fn test_clients_become_ready_at_two_ticks_per_frame() {
    init_logger();
    let mut harness =
        Harness::new(config(), one_tick_link(), 2).with_frame_seconds(2.0 * TIMESTEP);
    harness.run(400);

    for (index, client) in harness.clients.iter().enumerate() {
        assert!(client.stage().is_ready(), "client {index} stuck {}", client.stage().name());
    }
}

#[test]
fn test_plain_snapshot_label_wraps_with_huge_lag() {
    init_logger();
    let config = Config {
        lag_compensation_latency: 20_000.0 * TIMESTEP,
        lag_compensate_commands: false,
        ..config()
    };
    let lag_frames = config.lag_compensation_frame_count();
    let mut network = MemoryNetwork::<TokenWorld>::new(LinkConditions::perfect(), 1);
    network.connect_client();
    let mut server = Server::<TokenWorld>::new(config, 0.0);

    let mut received = Vec::new();
    for k in 0..16 {
        let now = f64::from(k) * TIMESTEP;
        network.advance(now);
        server.update(TIMESTEP, now, network.server_mut());
        network.advance(now);
        for (_, connection) in network.client_mut(0).unwrap().connections() {
            while let Some(snapshot) = connection.recv_snapshot() {
                received.push((server.last_completed_timestamp(), snapshot.timestamp()));
            }
        }
    }

    assert!(!received.is_empty());
    for (now, label) in received {
        assert_eq!(label, now + lag_frames + lag_frames);
    }
}
