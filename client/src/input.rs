//! Headless stand-in for keyboard input.
//!
//! A `Walker` plays the role of a player holding A or D: each held key moves
//! the local player one unit per step along x. It reports a new position only
//! when the player actually moved, which is the edge that drives a sync.

use rand::Rng;
use shared::{Position, PLAYER_RADIUS};

pub const WORLD_WIDTH: i32 = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Move left
    A,
    /// Move right
    D,
}

impl Key {
    fn dx(self) -> i32 {
        match self {
            Key::A => -1,
            Key::D => 1,
        }
    }

    fn opposite(self) -> Self {
        match self {
            Key::A => Key::D,
            Key::D => Key::A,
        }
    }
}

pub struct Walker<R> {
    rng: R,
    pos: Position,
    held: Option<Key>,
    steps_left: u32,
}

impl<R: Rng> Walker<R> {
    pub fn new(start: Position, rng: R) -> Self {
        Self {
            rng,
            pos: start,
            held: None,
            steps_left: 0,
        }
    }

    pub fn position(&self) -> Position {
        self.pos
    }

    pub fn held(&self) -> Option<Key> {
        self.held
    }

    /// Advances one input frame. Returns the new position if the player
    /// moved, None while no key is held.
    pub fn step(&mut self) -> Option<Position> {
        if self.steps_left == 0 {
            self.held = self.choose_key();
            self.steps_left = self.rng.gen_range(5..=30);
        }
        self.steps_left -= 1;

        let mut key = self.held?;
        let min_x = PLAYER_RADIUS;
        let max_x = WORLD_WIDTH - PLAYER_RADIUS;
        let next_x = self.pos.x + key.dx();
        if next_x < min_x || next_x > max_x {
            key = key.opposite();
            self.held = Some(key);
        }

        self.pos = self.pos.offset(key.dx(), 0);
        Some(self.pos)
    }

    fn choose_key(&mut self) -> Option<Key> {
        match self.rng.gen_range(0..4) {
            0 => None,
            1 | 2 => Some(Key::A),
            _ => Some(Key::D),
        }
    }
}
