use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Kinds of creatures living in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    /// Passive food, respawned from a static template every generation.
    Prey,
    /// Weaker predator. Eats prey, gets punished when it runs into predator B.
    PredatorA,
    /// Stronger predator. Eats prey and predator A.
    PredatorB,
}

impl Species {
    /// Species driven by the decision cycle and evolved between generations.
    pub const EVOLVING: [Species; 2] = [Species::PredatorA, Species::PredatorB];

    pub fn tag(self) -> Tag {
        match self {
            Species::Prey => Tag::Prey,
            Species::PredatorA => Tag::PredatorA,
            Species::PredatorB => Tag::PredatorB,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Species::Prey => "prey",
            Species::PredatorA => "predator-a",
            Species::PredatorB => "predator-b",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Species {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "prey" => Ok(Species::Prey),
            "predator-a" => Ok(Species::PredatorA),
            "predator-b" => Ok(Species::PredatorB),
            _ => bail!("unknown species {name:?}"),
        }
    }
}

/// Classification reported by world queries.
///
/// A sample that hits nothing carries no tag at all and keeps its random
/// baseline utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Prey,
    PredatorA,
    PredatorB,
    /// Walls and other solid geometry.
    Obstacle,
    /// Bush-like concealment.
    Cover,
}

impl Tag {
    pub fn species(self) -> Option<Species> {
        match self {
            Tag::Prey => Some(Species::Prey),
            Tag::PredatorA => Some(Species::PredatorA),
            Tag::PredatorB => Some(Species::PredatorB),
            Tag::Obstacle | Tag::Cover => None,
        }
    }
}
