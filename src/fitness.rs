use crate::model::Species;
use serde::{Deserialize, Serialize};

/// Kind of contact between two bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interaction {
    /// A predator touched prey.
    Consume,
    /// Two predators bumped into each other.
    Collide,
}

impl Interaction {
    pub fn between(a: Species, b: Species) -> Self {
        if a == Species::Prey || b == Species::Prey {
            Interaction::Consume
        } else {
            Interaction::Collide
        }
    }
}

/// Effect of an interaction on one participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payoff {
    pub delta: f64,
    /// The other participant leaves the world.
    pub despawns_other: bool,
}

/// Payoff received by `this` when it meets `other`.
pub fn payoff(this: Species, other: Species, event: Interaction) -> Option<Payoff> {
    use Interaction::*;
    use Species::*;

    let (delta, despawns_other) = match (this, other, event) {
        (PredatorA, Prey, Consume) => (2.0, true),
        (PredatorA, PredatorB, Collide) => (-100.0, false),
        (PredatorB, Prey, Consume) => (0.1, true),
        (PredatorB, PredatorA, Collide) => (5.0, true),
        _ => return None,
    };
    Some(Payoff {
        delta,
        despawns_other,
    })
}

/// Running score of one agent. Starts at zero and only moves through
/// interaction payoffs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fitness(f64);

impl Fitness {
    pub fn value(&self) -> f64 {
        self.0
    }

    pub(crate) fn credit(&mut self, delta: f64) {
        self.0 += delta;
    }
}
