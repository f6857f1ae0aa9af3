use crate::genome::Genome;
use crate::model::Tag;
use crate::perception::{Hit, PerceptionSample, WorldQuery};
use anyhow::Result;
use glam::DVec3;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

pub const OBSTACLE_UTILITY: f64 = -1.0;

/// Radius scanned for a lurking predator when a ray hits cover.
pub const AMBUSH_SCAN_RADIUS: f64 = 5.0;
pub const AMBUSH_PENALTY: f64 = -2.0;
/// Predators behind the agent (dot product below this) count as an ambush.
const AMBUSH_DOT_THRESHOLD: f64 = -0.5;

/// Candidate movement direction with its desirability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDirection {
    pub direction: DVec3,
    pub utility: f64,
}

/// Proximity of a hit: 1 at the origin, 0 at the edge of the range.
pub fn distance_index(distance: f64, range: f64) -> f64 {
    (1.0 - distance / range).clamp(0.0, 1.0)
}

/// Score every sample of the fan.
///
/// Each direction starts from a random baseline drawn from the genome's
/// utility range. A hit replaces the baseline with a tag-specific score.
pub fn evaluate<W, R>(
    samples: &[PerceptionSample],
    genome: &Genome,
    world: &W,
    origin: DVec3,
    forward: DVec3,
    rng: &mut R,
) -> Result<Vec<ScoredDirection>>
where
    W: WorldQuery + ?Sized,
    R: Rng + ?Sized,
{
    let (low, high) = genome.utility_bounds();
    let base_dist = Uniform::new_inclusive(low, high)?;

    let mut scored = Vec::with_capacity(samples.len());
    for sample in samples {
        let base = base_dist.sample(rng);
        let utility = match sample.hit {
            Some(hit) => score_hit(&hit, sample.range, genome, world, origin, forward),
            None => base,
        };
        scored.push(ScoredDirection {
            direction: DVec3::new(sample.direction.x, 0.0, sample.direction.z),
            utility,
        });
    }
    Ok(scored)
}

/// Score replacing the baseline for a tagged hit.
///
/// Samples without a hit never reach this and keep the baseline.
fn score_hit<W: WorldQuery + ?Sized>(
    hit: &Hit,
    range: f64,
    genome: &Genome,
    world: &W,
    origin: DVec3,
    forward: DVec3,
) -> f64 {
    match hit.tag {
        Tag::Prey | Tag::PredatorA | Tag::PredatorB => {
            let index = distance_index(hit.distance, range);
            hit.tag
                .species()
                .map_or(0.0, |species| genome.affinity(species).score(index))
        }
        Tag::Obstacle => OBSTACLE_UTILITY,
        // Scaled by the agent's own predator B weight, whatever the agent is.
        Tag::Cover => ambush_risk(world, origin, forward) * genome.predator_b.weight,
    }
}

/// `AMBUSH_PENALTY` if predator B lurks behind the agent, 0 otherwise.
pub fn ambush_risk<W: WorldQuery + ?Sized>(world: &W, origin: DVec3, forward: DVec3) -> f64 {
    let exposed = world
        .overlap_sphere(origin, AMBUSH_SCAN_RADIUS)
        .iter()
        .filter(|sighting| sighting.tag == Tag::PredatorB)
        .filter_map(|sighting| (sighting.position - origin).try_normalize())
        .any(|to_predator| forward.dot(to_predator) < AMBUSH_DOT_THRESHOLD);
    if exposed { AMBUSH_PENALTY } else { 0.0 }
}
