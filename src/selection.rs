use crate::utility::ScoredDirection;
use anyhow::{Result, bail};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Chance, in percent, of taking the best direction rather than the runner-up.
pub const TOP_CHOICE_PERCENT: f64 = 85.0;

/// Pick the best or, occasionally, the second best direction.
///
/// The occasional runner-up keeps agents from locking into oscillations
/// when two directions score almost the same.
pub fn choose_direction<R: Rng + ?Sized>(
    mut candidates: Vec<ScoredDirection>,
    rng: &mut R,
) -> Result<ScoredDirection> {
    let n_cand = candidates.len();
    if n_cand < 2 {
        bail!("at least 2 candidate directions are required, but got {n_cand}");
    }

    candidates.sort_by(|a, b| b.utility.total_cmp(&a.utility));

    let pct_dist = Uniform::new(0.0, 100.0)?;
    let rank = if pct_dist.sample(rng) <= TOP_CHOICE_PERCENT {
        0
    } else {
        1
    };
    Ok(candidates.swap_remove(rank))
}
