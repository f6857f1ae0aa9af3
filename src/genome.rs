use crate::model::Species;
use anyhow::Result;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

pub const MIN_RAY_RADIUS: u32 = 1;
pub const MIN_SIGHT_RANGE: f64 = 0.1;
pub const MIN_MOVEMENT_SPEED: f64 = 1.0;

/// Speed lost per unit of sight range gained.
const SIGHT_COST_IN_SPEED: f64 = 0.0625;
/// Sight range lost per unit of speed gained.
const SPEED_COST_IN_SIGHT: f64 = 0.125;

/// How strongly an agent is drawn to (or repelled by) one species.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Affinity {
    /// Constant term added whenever the species is seen.
    pub weight: f64,
    /// Scales the distance index, so closer sightings matter more (or less).
    pub distance_factor: f64,
}

impl Affinity {
    pub fn score(&self, distance_index: f64) -> f64 {
        distance_index * self.distance_factor + self.weight
    }
}

/// Heritable parameters of one agent.
///
/// Genomes are plain values: every birth copies one, and it is never
/// modified while its owner is alive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    /// Number of angular steps of the perception fan.
    pub ray_radius: u32,
    /// Length of the side rays. The forward ray sees 1.5 times farther.
    pub sight_range: f64,
    pub movement_speed: f64,
    /// Bounds of the random baseline utility, in either order.
    pub random_utility_range: [f64; 2],

    pub prey: Affinity,
    pub predator_a: Affinity,
    pub predator_b: Affinity,
}

impl Default for Genome {
    fn default() -> Self {
        Self {
            ray_radius: 16,
            sight_range: 10.0,
            movement_speed: 5.0,
            random_utility_range: [0.0, 1.0],
            prey: Affinity::default(),
            predator_a: Affinity::default(),
            predator_b: Affinity::default(),
        }
    }
}

impl Genome {
    /// Return a copy with every floor constraint enforced.
    pub fn clamped(mut self) -> Self {
        self.ray_radius = self.ray_radius.max(MIN_RAY_RADIUS);
        self.sight_range = self.sight_range.max(MIN_SIGHT_RANGE);
        self.movement_speed = self.movement_speed.max(MIN_MOVEMENT_SPEED);
        self
    }

    /// Angle between two neighbouring rays of the fan, in degrees.
    pub fn step_degrees(&self) -> f64 {
        360.0 / self.ray_radius.max(MIN_RAY_RADIUS) as f64
    }

    /// Baseline utility bounds as `(low, high)`.
    pub fn utility_bounds(&self) -> (f64, f64) {
        let [a, b] = self.random_utility_range;
        (a.min(b), a.max(b))
    }

    pub fn affinity(&self, species: Species) -> &Affinity {
        match species {
            Species::Prey => &self.prey,
            Species::PredatorA => &self.predator_a,
            Species::PredatorB => &self.predator_b,
        }
    }

    fn add_ray_radius_delta(&mut self, delta: f64) {
        let ray_radius = self.ray_radius as i64 + delta as i64;
        self.ray_radius = ray_radius.max(MIN_RAY_RADIUS as i64) as u32;
    }

    fn add_sight_delta(&mut self, delta: f64) {
        self.sight_range = (self.sight_range + delta).max(MIN_SIGHT_RANGE);
        if delta > 0.0 {
            self.movement_speed =
                (self.movement_speed - delta * SIGHT_COST_IN_SPEED).max(MIN_MOVEMENT_SPEED);
        }
    }

    fn add_speed_delta(&mut self, delta: f64) {
        self.movement_speed = (self.movement_speed + delta).max(MIN_MOVEMENT_SPEED);
        if delta > 0.0 {
            self.sight_range =
                (self.sight_range - delta * SPEED_COST_IN_SIGHT).max(MIN_SIGHT_RANGE);
        }
    }
}

/// Random perturbation applied to a genome at birth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Largest absolute change applied to a single field.
    pub factor: f64,
    /// Probability, in percent, that a given field changes.
    pub chance: f64,
}

impl Mutation {
    pub fn new(factor: f64, chance: f64) -> Self {
        Self { factor, chance }
    }

    /// Produce a mutated copy of `parent`.
    ///
    /// Each of the eleven scalar fields independently rolls against
    /// `chance` and, on success, receives a delta in `[-factor, factor]`.
    pub fn apply<R: Rng + ?Sized>(&self, parent: &Genome, rng: &mut R) -> Result<Genome> {
        let dice = Dice {
            pct_dist: Uniform::new(0.0, 100.0)?,
            delta_dist: Uniform::new_inclusive(-self.factor, self.factor)?,
            chance: self.chance,
        };

        let mut child = parent.clamped();

        if let Some(delta) = dice.roll(rng) {
            child.add_ray_radius_delta(delta);
        }
        if let Some(delta) = dice.roll(rng) {
            child.add_sight_delta(delta);
        }
        if let Some(delta) = dice.roll(rng) {
            child.add_speed_delta(delta);
        }

        for bound in &mut child.random_utility_range {
            if let Some(delta) = dice.roll(rng) {
                *bound += delta;
            }
        }

        // Weights are unbounded and uncoupled.
        for affinity in [&mut child.prey, &mut child.predator_a, &mut child.predator_b] {
            if let Some(delta) = dice.roll(rng) {
                affinity.weight += delta;
            }
            if let Some(delta) = dice.roll(rng) {
                affinity.distance_factor += delta;
            }
        }

        Ok(child)
    }
}

struct Dice {
    pct_dist: Uniform<f64>,
    delta_dist: Uniform<f64>,
    chance: f64,
}

impl Dice {
    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        if self.pct_dist.sample(rng) < self.chance {
            Some(self.delta_dist.sample(rng))
        } else {
            None
        }
    }
}
