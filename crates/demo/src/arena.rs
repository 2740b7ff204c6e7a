use glam::Vec2;
use retrace::{Command, ConnectionHandle, DisplayState, OwnerId, World};
use serde::{Deserialize, Serialize};

pub const ARENA_HALF_EXTENT: f32 = 20.0;
const FRICTION_PER_TICK: f32 = 0.98;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub owner: u64,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Player {
    fn new(owner: u64) -> Self {
        let angle = owner as f32 * std::f32::consts::FRAC_PI_4;
        Self {
            owner,
            position: Vec2::from_angle(angle) * (ARENA_HALF_EXTENT * 0.5),
            velocity: Vec2::ZERO,
        }
    }
}

/// Players sliding around a square arena. Each one is steered by impulses
/// from the connection that owns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub players: Vec<Player>,
    pub timestep_seconds: f32,
}

impl Arena {
    pub fn new(player_count: usize, timestep_seconds: f32) -> Self {
        Self {
            players: (0..player_count as u64).map(Player::new).collect(),
            timestep_seconds,
        }
    }

    pub fn player(&self, owner: u64) -> Option<&Player> {
        self.players.iter().find(|player| player.owner == owner)
    }

    fn player_mut(&mut self, owner: u64) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.owner == owner)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Impulse {
    pub owner: u64,
    pub delta_velocity: Vec2,
}

impl Command for Impulse {
    fn owner(&self) -> Option<OwnerId> {
        Some(OwnerId(self.owner))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArenaView {
    pub positions: Vec<(u64, Vec2)>,
}

impl DisplayState for ArenaView {
    fn from_interpolation(state1: &Self, state2: &Self, t: f64) -> Self {
        let positions = state1
            .positions
            .iter()
            .zip(&state2.positions)
            .map(|(&(owner, from), &(_, to))| (owner, from.lerp(to, t as f32)))
            .collect();
        Self { positions }
    }
}

impl World for Arena {
    type Command = Impulse;
    type Snapshot = Arena;
    type DisplayState = ArenaView;

    fn step(&mut self) {
        let dt = self.timestep_seconds;
        for player in &mut self.players {
            player.position += player.velocity * dt;
            player.velocity *= FRICTION_PER_TICK;

            // Bounce off the walls.
            for axis in 0..2 {
                if player.position[axis].abs() > ARENA_HALF_EXTENT {
                    player.position[axis] =
                        player.position[axis].clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
                    player.velocity[axis] = -player.velocity[axis];
                }
            }
        }
    }

    fn command_is_valid(&self, command: &Impulse, client: ConnectionHandle) -> bool {
        command.owner == client as u64
            && command.delta_velocity.is_finite()
            && self.player(command.owner).is_some()
    }

    fn apply_command(&mut self, command: &Impulse) {
        if let Some(player) = self.player_mut(command.owner) {
            player.velocity += command.delta_velocity;
        }
    }

    fn rollback_command(&mut self, command: &Impulse) {
        if let Some(player) = self.player_mut(command.owner) {
            player.velocity -= command.delta_velocity;
        }
    }

    fn apply_snapshot(&mut self, snapshot: Arena) {
        *self = snapshot;
    }

    fn snapshot(&self) -> Arena {
        self.clone()
    }

    fn display_state(&self) -> ArenaView {
        ArenaView {
            positions: self
                .players
                .iter()
                .map(|player| (player.owner, player.position))
                .collect(),
        }
    }
}
