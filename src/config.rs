use crate::arena::{Area, Bush};
use crate::genome::{Genome, MIN_MOVEMENT_SPEED, MIN_RAY_RADIUS, MIN_SIGHT_RANGE};
use crate::model::Species;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::RangeBounds,
    path::{Path, PathBuf},
};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub evolution: EvolutionConfig,
    pub schedule: ScheduleConfig,
    pub arena: ArenaConfig,
    pub prey: PreyConfig,
    pub predator_a: SpeciesConfig,
    pub predator_b: SpeciesConfig,
}

/// Mutation and reseeding parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Largest change applied to a mutated field.
    pub mutation_factor: f64,
    /// Chance, in percent, that a field mutates.
    pub mutation_chance: f64,
    /// Seed the random generator is reset to at every generation boundary.
    pub reseed: u64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Simulated seconds per generation.
    pub simulation_interval: f64,
    /// Simulated seconds per tick.
    pub time_step: f64,
    /// Generations simulated by each `create` or `resume`.
    pub generations_per_run: usize,
    /// Fraction of the remaining turn an agent completes each tick.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f64,
}

fn default_turn_rate() -> f64 {
    0.1
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Half the side length of the square arena.
    pub half_size: f64,
    #[serde(default)]
    pub walls: Vec<Area>,
    #[serde(default)]
    pub bushes: Vec<Bush>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PreyConfig {
    pub radius: f64,
    /// One spawner per patch.
    pub patches: Vec<PreyPatch>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PreyPatch {
    pub area: Area,
    pub count: usize,
}

/// Parameters of an evolving species.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    /// Agents spawned per generation.
    pub count: usize,
    /// Fittest agents kept as parents.
    pub parent_size: usize,
    pub evolution_enabled: bool,
    pub radius: f64,
    /// Defaults to the whole arena.
    #[serde(default)]
    pub spawn_area: Option<Area>,
    /// Genome used until the first parents are selected.
    #[serde(default)]
    pub genome: Genome,
    /// Saved genome artifact that replaces `genome` when seeding.
    #[serde(default)]
    pub seed_genome: Option<PathBuf>,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn species(&self, species: Species) -> Option<&SpeciesConfig> {
        match species {
            Species::Prey => None,
            Species::PredatorA => Some(&self.predator_a),
            Species::PredatorB => Some(&self.predator_b),
        }
    }

    fn validate(&self) -> Result<()> {
        let evo = &self.evolution;
        check_num(evo.mutation_factor, 0.0..=1_000.0).context("invalid mutation factor")?;
        check_num(evo.mutation_chance, 0.0..=100.0).context("invalid mutation chance")?;

        let sched = &self.schedule;
        check_num(sched.simulation_interval, 1e-3..=1e6)
            .context("invalid simulation interval")?;
        check_num(sched.time_step, 1e-4..=sched.simulation_interval)
            .context("invalid time step")?;
        check_num(sched.generations_per_run, 1..10_000)
            .context("invalid number of generations per run")?;
        check_num(sched.turn_rate, 1e-6..=1.0).context("invalid turn rate")?;

        let half_size = self.arena.half_size;
        check_num(half_size, 1.0..=1e4).context("invalid arena half size")?;
        for (i_wall, wall) in self.arena.walls.iter().enumerate() {
            check_area(wall).with_context(|| format!("invalid wall {i_wall}"))?;
        }
        for (i_bush, bush) in self.arena.bushes.iter().enumerate() {
            check_num(bush.radius, 1e-3..=half_size)
                .and_then(|_| check_num(bush.teleport_range, 0.0..=half_size))
                .with_context(|| format!("invalid bush {i_bush}"))?;
        }

        check_num(self.prey.radius, 1e-3..=10.0).context("invalid prey radius")?;
        for (i_patch, patch) in self.prey.patches.iter().enumerate() {
            check_area(&patch.area)
                .and_then(|_| check_num(patch.count, 0..100_000))
                .with_context(|| format!("invalid prey patch {i_patch}"))?;
        }

        check_species(&self.predator_a).context("invalid predator A")?;
        check_species(&self.predator_b).context("invalid predator B")?;

        Ok(())
    }
}

fn check_species(cfg: &SpeciesConfig) -> Result<()> {
    check_num(cfg.count, 1..100_000).context("invalid number of agents")?;
    check_num(cfg.parent_size, 1..=cfg.count).context("invalid parent size")?;
    check_num(cfg.radius, 1e-3..=10.0).context("invalid radius")?;
    if let Some(area) = &cfg.spawn_area {
        check_area(area).context("invalid spawn area")?;
    }
    check_template(&cfg.genome).context("invalid genome")?;
    Ok(())
}

/// Hand-written templates also stay within sensible ceilings.
fn check_template(genome: &Genome) -> Result<()> {
    check_num(genome.ray_radius, ..=360).context("invalid ray radius")?;
    check_num(genome.sight_range, ..=1e4).context("invalid sight range")?;
    check_num(genome.movement_speed, ..=1e4).context("invalid movement speed")?;
    check_genome(genome)
}

/// Check the invariants every genome keeps, mutated ones included.
///
/// Only floors apply: mutation may push a field past any template ceiling.
pub fn check_genome(genome: &Genome) -> Result<()> {
    check_num(genome.ray_radius, MIN_RAY_RADIUS..).context("invalid ray radius")?;
    check_num(genome.sight_range, MIN_SIGHT_RANGE..).context("invalid sight range")?;
    check_num(genome.movement_speed, MIN_MOVEMENT_SPEED..)
        .context("invalid movement speed")?;
    let vals = [
        genome.sight_range,
        genome.movement_speed,
        genome.random_utility_range[0],
        genome.random_utility_range[1],
        genome.prey.weight,
        genome.prey.distance_factor,
        genome.predator_a.weight,
        genome.predator_a.distance_factor,
        genome.predator_b.weight,
        genome.predator_b.distance_factor,
    ];
    if vals.iter().any(|val| !val.is_finite()) {
        bail!("genome values must be finite");
    }
    Ok(())
}

fn check_area(area: &Area) -> Result<()> {
    for axis in 0..2 {
        let (lo, hi) = (area.min[axis], area.max[axis]);
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            bail!("area corners must be finite with min <= max, but are {area:?}");
        }
    }
    Ok(())
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
