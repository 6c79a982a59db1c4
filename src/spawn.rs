//! Spawn placement and the random draws behind it.
//!
//! Every random choice the game makes (spawn point, jitter, character)
//! goes through a [`Dice`] so tests and seeded runs can pin the outcome.

use std::sync::{Mutex, PoisonError};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::geo::LatLng;
use crate::roster::{Character, ROSTER};

/// Street corners in central London used when no better spawn is known.
pub const SPAWN_POOL: [LatLng; 10] = [
    LatLng::new(51.5074, -0.1278), // Trafalgar Square
    LatLng::new(51.5014, -0.1419), // Westminster
    LatLng::new(51.5123, -0.0909), // Liverpool Street
    LatLng::new(51.5154, -0.0725), // Old Street
    LatLng::new(51.5200, -0.1000), // Kings Cross
    LatLng::new(51.5080, -0.1281), // Charing Cross
    LatLng::new(51.5079, -0.1247), // Covent Garden
    LatLng::new(51.5113, -0.1190), // Holborn
    LatLng::new(51.5139, -0.0989), // Farringdon
    LatLng::new(51.5175, -0.1400), // Euston
];

/// Total width, in degrees, of the square a geolocated spawn is scattered over.
pub const AROUND_SPREAD_DEG: f64 = 0.02;

pub trait Dice: Send + Sync {
    /// Uniform index in `0..len`. `len` is never zero.
    fn index(&self, len: usize) -> usize;
    /// Uniform value in `[0, 1)`.
    fn unit(&self) -> f64;
}

pub struct ThreadDice;

impl Dice for ThreadDice {
    fn index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }

    fn unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

pub struct SeededDice {
    rng: Mutex<StdRng>,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Dice for SeededDice {
    fn index(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(0..len)
    }

    fn unit(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen::<f64>()
    }
}

/// Always rolls the same values. Indices wrap around `len`.
#[derive(Debug, Clone, Copy)]
pub struct FixedDice {
    pub index: usize,
    pub unit: f64,
}

impl FixedDice {
    pub fn new(index: usize) -> Self {
        Self { index, unit: 0.5 }
    }
}

impl Dice for FixedDice {
    fn index(&self, len: usize) -> usize {
        self.index % len
    }

    fn unit(&self) -> f64 {
        self.unit
    }
}

/// Where a session spawns, decided once at connect and reused on respawn.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SpawnArea {
    #[default]
    Pool,
    Around(LatLng),
}

pub fn pick_spawn(dice: &dyn Dice, area: SpawnArea) -> LatLng {
    match area {
        SpawnArea::Pool => SPAWN_POOL[dice.index(SPAWN_POOL.len())],
        SpawnArea::Around(center) => {
            let lat = center.lat + (dice.unit() - 0.5) * AROUND_SPREAD_DEG;
            let lng = center.lng + (dice.unit() - 0.5) * AROUND_SPREAD_DEG;
            let point = LatLng::new(lat, lng);
            if point.is_valid() {
                point
            } else {
                center
            }
        }
    }
}

pub fn pick_character(dice: &dyn Dice) -> &'static Character {
    &ROSTER[dice.index(ROSTER.len())]
}
