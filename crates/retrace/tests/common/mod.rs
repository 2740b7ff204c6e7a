#![allow(dead_code)]

use retrace::{
    Client, Command, Config, ConnectionHandle, DisplayState, LinkConditions, MemoryNetwork,
    OwnerId, Server, World,
};
use serde::{Deserialize, Serialize};

pub const TIMESTEP: f64 = 1.0 / 64.0;
pub const OWNERS: u64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub owner: u64,
    pub position: i64,
}

/// A row of tokens, one per owner, each nudged only by its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenWorld {
    pub tokens: Vec<Token>,
}

impl Default for TokenWorld {
    fn default() -> Self {
        Self {
            tokens: (0..OWNERS)
                .map(|owner| Token { owner, position: 0 })
                .collect(),
        }
    }
}

impl TokenWorld {
    pub fn position(&self, owner: u64) -> i64 {
        self.tokens
            .iter()
            .find(|token| token.owner == owner)
            .map_or(0, |token| token.position)
    }

    fn token_mut(&mut self, owner: u64) -> Option<&mut Token> {
        self.tokens.iter_mut().find(|token| token.owner == owner)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nudge {
    pub owner: u64,
    pub amount: i64,
}

impl Command for Nudge {
    fn owner(&self) -> Option<OwnerId> {
        Some(OwnerId(self.owner))
    }
}

impl DisplayState for TokenWorld {
    fn from_interpolation(state1: &Self, state2: &Self, t: f64) -> Self {
        let tokens = state1
            .tokens
            .iter()
            .zip(&state2.tokens)
            .map(|(a, b)| Token {
                owner: a.owner,
                position: (a.position as f64 + (b.position - a.position) as f64 * t).round() as i64,
            })
            .collect();
        Self { tokens }
    }
}

impl World for TokenWorld {
    type Command = Nudge;
    type Snapshot = TokenWorld;
    type DisplayState = TokenWorld;

    fn step(&mut self) {}

    fn command_is_valid(&self, command: &Nudge, client: ConnectionHandle) -> bool {
        command.owner == client as u64 && command.owner < OWNERS
    }

    fn apply_command(&mut self, command: &Nudge) {
        if let Some(token) = self.token_mut(command.owner) {
            token.position += command.amount;
        }
    }

    fn rollback_command(&mut self, command: &Nudge) {
        if let Some(token) = self.token_mut(command.owner) {
            token.position -= command.amount;
        }
    }

    fn apply_snapshot(&mut self, snapshot: TokenWorld) {
        *self = snapshot;
    }

    fn snapshot(&self) -> TokenWorld {
        self.clone()
    }

    fn display_state(&self) -> TokenWorld {
        self.clone()
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 64 ticks per second with an eight tick lag window, so every time value
/// in the tests is exact in binary.
pub fn config() -> Config {
    Config {
        timestep_seconds: TIMESTEP,
        lag_compensation_latency: 8.0 * TIMESTEP,
        blend_latency: 8.0 * TIMESTEP,
        command_history_size: 16,
        ..Default::default()
    }
}

pub fn one_tick_link() -> LinkConditions {
    LinkConditions {
        latency_seconds: TIMESTEP,
        ..LinkConditions::perfect()
    }
}

/// One server and a set of clients driven in lock step over a
/// [`MemoryNetwork`].
pub struct Harness {
    pub network: MemoryNetwork<TokenWorld>,
    pub server: Server<TokenWorld>,
    pub clients: Vec<Client<TokenWorld>>,
    pub config: Config,
    /// Host frame length, one timestep unless changed.
    pub frame_seconds: f64,
    pub tick: u64,
}

impl Harness {
    pub fn new(config: Config, conditions: LinkConditions, client_count: usize) -> Self {
        let mut network = MemoryNetwork::new(conditions, 7);
        let clients = (0..client_count)
            .map(|_| {
                network.connect_client();
                Client::new(config.clone())
            })
            .collect();
        Self {
            network,
            server: Server::new(config.clone(), 0.0),
            clients,
            frame_seconds: config.timestep_seconds,
            config,
            tick: 0,
        }
    }

    pub fn with_frame_seconds(mut self, frame_seconds: f64) -> Self {
        self.frame_seconds = frame_seconds;
        self
    }

    pub fn now(&self) -> f64 {
        self.tick as f64 * self.frame_seconds
    }

    /// Runs one host-loop iteration, issuing `commands` from the given
    /// clients after they updated.
    pub fn step_with(&mut self, commands: &[(usize, Nudge)]) {
        let delta = self.frame_seconds;
        let now = self.now();
        self.network.advance(now);

        for (index, client) in self.clients.iter_mut().enumerate() {
            let net = self.network.client_mut(index).expect("client endpoint");
            client.update(delta, now, net);
        }
        for (index, command) in commands {
            let net = self.network.client_mut(*index).expect("client endpoint");
            self.clients[*index].issue_command(command.clone(), net);
        }
        self.server.update(delta, now, self.network.server_mut());

        self.tick += 1;
    }

    pub fn run(&mut self, iterations: usize) {
        for _ in 0..iterations {
            self.step_with(&[]);
        }
    }
}
