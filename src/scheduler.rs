use crate::arena::{Area, Arena, BodyId, Contact, Spawner};
use crate::config::Config;
use crate::fitness::{self, Interaction};
use crate::genome::{Genome, Mutation};
use crate::model::Species;
use crate::motion::{self, Kinematics};
use crate::population::{Agent, Population};
use crate::record::{Archive, GenerationRecord};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use thiserror::Error;

/// Lifecycle phase of the scheduler.
///
/// `Seeding`, `Ranking`, `Selecting` and `Breeding` are transient: they only
/// hold while a transition is in progress and no tick runs during them. A
/// transition that fails puts back the phase it started from, so callers
/// only ever observe `Idle`, `Running` or `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Seeding,
    Running,
    Ranking,
    Selecting,
    Breeding,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Seeding => "seeding",
            Phase::Running => "running",
            Phase::Ranking => "ranking",
            Phase::Selecting => "selecting",
            Phase::Breeding => "breeding",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Control surface requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Continue,
    Resume,
    Stop,
    Generate,
    Tick,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::Continue => "continue",
            Action::Resume => "resume",
            Action::Stop => "stop",
            Action::Generate => "generate species",
            Action::Tick => "tick",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("cannot {action} while the simulation is {phase}")]
    InvalidTransition { action: Action, phase: Phase },
}

/// Drives the arena tick by tick and breeds a new generation every
/// `simulation_interval` simulated seconds.
#[derive(Serialize, Deserialize)]
pub struct Scheduler {
    cfg: Config,
    arena: Arena,
    pop_vec: Vec<Population>,
    prey_spawners: Vec<Spawner>,
    agent_spawners: Vec<Spawner>,
    mutation: Mutation,
    phase: Phase,
    generation: usize,
    elapsed: f64,
    rng: ChaCha12Rng,
}

impl Scheduler {
    /// Create an idle scheduler. Nothing is spawned until [`Scheduler::start`].
    pub fn new(cfg: Config) -> Self {
        let arena = Arena::new(cfg.arena.half_size, &cfg.arena.walls, &cfg.arena.bushes);
        let whole_arena = Area::square(cfg.arena.half_size);

        let prey_spawners: Vec<_> = cfg
            .prey
            .patches
            .iter()
            .enumerate()
            .map(|(key, patch)| Spawner {
                key,
                species: Species::Prey,
                area: patch.area,
                radius: cfg.prey.radius,
                count: patch.count,
            })
            .collect();

        let mut pop_vec = Vec::with_capacity(Species::EVOLVING.len());
        let mut agent_spawners = Vec::with_capacity(Species::EVOLVING.len());
        let species_cfgs = [
            (Species::PredatorA, &cfg.predator_a),
            (Species::PredatorB, &cfg.predator_b),
        ];
        for (key, (species, species_cfg)) in (prey_spawners.len()..).zip(species_cfgs) {
            pop_vec.push(Population::new(
                species,
                species_cfg.genome,
                species_cfg.parent_size,
                species_cfg.evolution_enabled,
            ));
            agent_spawners.push(Spawner {
                key,
                species,
                area: species_cfg.spawn_area.unwrap_or(whole_arena),
                radius: species_cfg.radius,
                count: species_cfg.count,
            });
        }

        let mutation = Mutation::new(
            cfg.evolution.mutation_factor,
            cfg.evolution.mutation_chance,
        );
        let rng = ChaCha12Rng::seed_from_u64(cfg.evolution.reseed);

        Self {
            cfg,
            arena,
            pop_vec,
            prey_spawners,
            agent_spawners,
            mutation,
            phase: Phase::Idle,
            generation: 0,
            elapsed: 0.0,
            rng,
        }
    }

    /// Replace the template a species is seeded from.
    ///
    /// Only meaningful before [`Scheduler::start`].
    pub fn with_seed_genome(mut self, species: Species, genome: Genome) -> Self {
        if let Some(i_pop) = pop_index(species) {
            self.pop_vec[i_pop].set_template(genome);
        }
        self
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn population(&self, species: Species) -> Option<&Population> {
        pop_index(species).map(|i_pop| &self.pop_vec[i_pop])
    }

    /// Seed every species and start running.
    pub fn start(&mut self) -> Result<()> {
        self.require(Action::Start, &[Phase::Idle])?;

        self.phase = Phase::Seeding;
        if let Err(err) = self.seed_all() {
            self.phase = Phase::Idle;
            return Err(err);
        }
        self.generation = 0;
        self.elapsed = 0.0;

        self.enter_running();
        log::info!("seeded generation 0");
        Ok(())
    }

    fn seed_all(&mut self) -> Result<()> {
        self.reseed();
        self.regenerate_prey().context("failed to spawn prey")?;
        for species in Species::EVOLVING {
            self.spawn_cohort(species, false)
                .with_context(|| format!("failed to seed {species}"))?;
        }
        Ok(())
    }

    /// Close the current generation right away and keep running.
    pub fn continue_simulation(&mut self, archive: &mut dyn Archive) -> Result<()> {
        self.require(Action::Continue, &[Phase::Running, Phase::Stopped])?;
        self.advance_generation(archive)
            .context("failed to advance generation")?;
        self.elapsed = 0.0;
        Ok(())
    }

    /// Wake the current cohort without reseeding.
    pub fn resume(&mut self) -> Result<()> {
        match self.phase {
            Phase::Stopped => {
                self.enter_running();
                log::info!("resumed generation {}", self.generation);
                Ok(())
            }
            Phase::Running => Ok(()),
            phase => Err(invalid(Action::Resume, phase)),
        }
    }

    /// Suspend every agent. Population membership is kept.
    pub fn stop(&mut self) -> Result<()> {
        match self.phase {
            Phase::Running => {
                for pop in &mut self.pop_vec {
                    for agt in pop.agents_mut() {
                        agt.sleep();
                        if let Some(body) = self.arena.body_mut(agt.body()) {
                            motion::halt(body);
                        }
                    }
                }
                self.phase = Phase::Stopped;
                log::info!("stopped generation {}", self.generation);
                Ok(())
            }
            Phase::Stopped => Ok(()),
            phase => Err(invalid(Action::Stop, phase)),
        }
    }

    /// Respawn one species from its parents, or from its template if none
    /// were selected yet.
    pub fn generate_species(&mut self, species: Species) -> Result<()> {
        self.require(Action::Generate, &[Phase::Idle, Phase::Running, Phase::Stopped])?;

        if species == Species::Prey {
            return self.regenerate_prey().context("failed to respawn prey");
        }
        self.spawn_cohort(species, true)
            .with_context(|| format!("failed to respawn {species}"))?;
        if self.phase == Phase::Running {
            self.wake(species);
        }
        Ok(())
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// A stopped scheduler ignores ticks.
    pub fn tick(&mut self, dt: f64, archive: &mut dyn Archive) -> Result<()> {
        match self.phase {
            Phase::Running => {}
            Phase::Stopped => return Ok(()),
            phase => return Err(invalid(Action::Tick, phase)),
        }

        let turn_rate = self.cfg.schedule.turn_rate;
        for pop in &self.pop_vec {
            for agt in pop.agents().iter().filter(|agt| agt.is_awake()) {
                let Some(body) = self.arena.body(agt.body()) else {
                    continue;
                };
                let choice = agt
                    .decide(&self.arena, body.position(), body.heading(), &mut self.rng)
                    .with_context(|| format!("failed to decide for {}", agt.label()))?;
                if let Some(body) = self.arena.body_mut(agt.body()) {
                    motion::steer(body, choice.direction, agt.genome().movement_speed, turn_rate);
                }
            }
        }

        self.arena.integrate(dt);
        self.arena
            .apply_cover(&mut self.rng)
            .context("failed to apply cover")?;
        let contacts = self.arena.contacts();
        self.resolve_contacts(&contacts);

        self.elapsed += dt;
        let interval = self.cfg.schedule.simulation_interval;
        if self.elapsed >= interval {
            self.advance_generation(archive)
                .context("failed to advance generation")?;
            self.elapsed -= interval;
        }
        Ok(())
    }

    fn resolve_contacts(&mut self, contacts: &[Contact]) {
        for contact in contacts {
            let (a, b) = (contact.a, contact.b);
            // Something earlier this tick already removed one of them.
            if !self.arena.contains(a.0) || !self.arena.contains(b.0) {
                continue;
            }
            let event = Interaction::between(a.1, b.1);

            let mut despawn_vec = Vec::new();
            for ((this_id, this), (other_id, other)) in [(a, b), (b, a)] {
                let Some(payoff) = fitness::payoff(this, other, event) else {
                    continue;
                };
                if let Some(agt) = self.agent_mut(this, this_id) {
                    agt.credit(payoff.delta);
                }
                if payoff.despawns_other {
                    despawn_vec.push(other_id);
                }
            }
            for id in despawn_vec {
                self.arena.despawn(id);
            }
        }
    }

    /// Rank, select and breed every species.
    ///
    /// On failure the phase and generation counter are put back.
    fn advance_generation(&mut self, archive: &mut dyn Archive) -> Result<()> {
        let (phase, generation) = (self.phase, self.generation);
        let result = self.close_generation(archive);
        if result.is_err() {
            self.phase = phase;
            self.generation = generation;
        }
        result
    }

    fn close_generation(&mut self, archive: &mut dyn Archive) -> Result<()> {
        self.generation += 1;
        self.reseed();
        self.regenerate_prey().context("failed to respawn prey")?;

        let mut summaries = Vec::with_capacity(self.pop_vec.len());
        for species in Species::EVOLVING {
            let i_pop = pop_index(species).context("species does not evolve")?;

            self.phase = Phase::Ranking;
            let arena = &self.arena;
            let n_gone = self.pop_vec[i_pop].prune(|id| arena.contains(id));
            log::debug!("{n_gone} {species} agents despawned during the generation");
            if self.pop_vec[i_pop].is_empty() {
                log::warn!("{species} population died out, reseeding from parents");
                self.spawn_cohort(species, true)
                    .with_context(|| format!("failed to reseed {species}"))?;
                if self.pop_vec[i_pop].is_empty() {
                    log::warn!("no room to reseed {species}, keeping its previous parents");
                    continue;
                }
            }

            self.phase = Phase::Selecting;
            let summary = self.pop_vec[i_pop]
                .select_parents()
                .with_context(|| format!("failed to select {species} parents"))?;
            log::debug!(
                "kept {} {species} parents",
                self.pop_vec[i_pop].parents().len()
            );

            let label = format!("{species}-gen-{:04}", self.generation);
            if let Err(err) = archive.save_genome_artifact(&summary.best_genome, &label) {
                log::warn!("failed to save {label}: {err:#}");
            }
            summaries.push(summary);
        }

        self.phase = Phase::Breeding;
        for species in Species::EVOLVING {
            self.spawn_cohort(species, true)
                .with_context(|| format!("failed to breed {species}"))?;
        }

        let record = GenerationRecord {
            index: self.generation,
            summaries,
        };
        let report: Vec<_> = record
            .summaries
            .iter()
            .map(|s| {
                format!(
                    "{} best {:.2} mean {:.2} ({} alive)",
                    s.species, s.best_fitness, s.mean_fitness, s.survivors
                )
            })
            .collect();
        log::info!("closed generation {}: {}", record.index, report.join(", "));
        if let Err(err) = archive.record_generation(&record) {
            log::warn!("failed to record generation {}: {err:#}", record.index);
        }

        self.enter_running();
        Ok(())
    }

    fn regenerate_prey(&mut self) -> Result<()> {
        for spawner in &self.prey_spawners {
            self.arena.regenerate(spawner, &mut self.rng)?;
        }
        Ok(())
    }

    /// Spawn a fresh cohort, bred from parents or seeded from the template.
    fn spawn_cohort(&mut self, species: Species, breed: bool) -> Result<()> {
        let i_pop = pop_index(species).context("species has no population")?;
        let body_vec = self
            .arena
            .regenerate(&self.agent_spawners[i_pop], &mut self.rng)?;

        let pop = &mut self.pop_vec[i_pop];
        if breed {
            pop.breed(&body_vec, &self.mutation, self.generation, &mut self.rng)
        } else {
            pop.seed(&body_vec, self.generation, &mut self.rng)
        }
    }

    fn agent_mut(&mut self, species: Species, body: BodyId) -> Option<&mut Agent> {
        let i_pop = pop_index(species)?;
        self.pop_vec[i_pop].agent_mut(body)
    }

    fn wake(&mut self, species: Species) {
        if let Some(i_pop) = pop_index(species) {
            for agt in self.pop_vec[i_pop].agents_mut() {
                agt.wake();
            }
        }
    }

    fn enter_running(&mut self) {
        for species in Species::EVOLVING {
            self.wake(species);
        }
        self.phase = Phase::Running;
    }

    fn reseed(&mut self) {
        self.rng = ChaCha12Rng::seed_from_u64(self.cfg.evolution.reseed);
    }

    fn require(&self, action: Action, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(invalid(action, self.phase))
        }
    }

    /// Save a checkpoint of the entire scheduler state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize scheduler")?;
        Ok(())
    }

    /// Load a previously saved scheduler checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let scheduler =
            decode::from_read(&mut reader).context("failed to deserialize scheduler")?;
        Ok(scheduler)
    }
}

fn pop_index(species: Species) -> Option<usize> {
    match species {
        Species::Prey => None,
        Species::PredatorA => Some(0),
        Species::PredatorB => Some(1),
    }
}

fn invalid(action: Action, phase: Phase) -> anyhow::Error {
    StateError::InvalidTransition { action, phase }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use anyhow::bail;
    use glam::DVec3;

    #[derive(Default)]
    struct MemoryArchive {
        label_vec: Vec<String>,
        record_vec: Vec<GenerationRecord>,
    }

    impl Archive for MemoryArchive {
        fn save_genome_artifact(&mut self, _genome: &Genome, label: &str) -> Result<()> {
            self.label_vec.push(label.to_string());
            Ok(())
        }

        fn record_generation(&mut self, record: &GenerationRecord) -> Result<()> {
            self.record_vec.push(record.clone());
            Ok(())
        }
    }

    struct BrokenArchive;

    impl Archive for BrokenArchive {
        fn save_genome_artifact(&mut self, _genome: &Genome, _label: &str) -> Result<()> {
            bail!("disk full")
        }

        fn record_generation(&mut self, _record: &GenerationRecord) -> Result<()> {
            bail!("disk full")
        }
    }

    fn started() -> Scheduler {
        let mut sched = Scheduler::new(sample_config());
        sched.start().unwrap();
        sched
    }

    fn bodies(sched: &Scheduler, species: Species) -> Vec<BodyId> {
        let pop = sched.population(species).unwrap();
        pop.agents().iter().map(|agt| agt.body()).collect()
    }

    fn positions(sched: &Scheduler) -> Vec<DVec3> {
        Species::EVOLVING
            .iter()
            .flat_map(|&species| bodies(sched, species))
            .filter_map(|id| sched.arena().body(id))
            .map(|body| body.position())
            .collect()
    }

    fn fitness_of(sched: &Scheduler, species: Species, body: BodyId) -> f64 {
        let pop = sched.population(species).unwrap();
        let agt = pop.agents().iter().find(|agt| agt.body() == body).unwrap();
        agt.fitness()
    }

    #[test]
    fn start_seeds_every_species() {
        let sched = started();
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(sched.generation(), 0);
        assert!(sched.arena().count(Species::Prey) > 0);

        for species in Species::EVOLVING {
            let template = sched.cfg().species(species).unwrap().genome;
            let pop = sched.population(species).unwrap();
            assert!(!pop.is_empty());
            assert!(pop.parents().is_empty());
            for agt in pop.agents() {
                assert!(agt.is_awake());
                assert_eq!(*agt.genome(), template);
                assert!(sched.arena().contains(agt.body()));
            }
        }
    }

    #[test]
    fn seed_genome_replaces_template() {
        let genome = Genome {
            ray_radius: 3,
            ..Genome::default()
        };
        let mut sched =
            Scheduler::new(sample_config()).with_seed_genome(Species::PredatorB, genome);
        sched.start().unwrap();

        let pop = sched.population(Species::PredatorB).unwrap();
        assert!(pop.agents().iter().all(|agt| *agt.genome() == genome));
    }

    #[test]
    fn invalid_transitions_report_state_errors() {
        let mut sched = Scheduler::new(sample_config());
        let mut archive = MemoryArchive::default();

        let err = sched.tick(0.1, &mut archive).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StateError>(),
            Some(&StateError::InvalidTransition {
                action: Action::Tick,
                phase: Phase::Idle
            })
        );
        assert!(sched.stop().is_err());
        assert!(sched.resume().is_err());
        assert!(sched.continue_simulation(&mut archive).is_err());
        assert_eq!(sched.phase(), Phase::Idle);

        sched.start().unwrap();
        let members = bodies(&sched, Species::PredatorA);
        let err = sched.start().unwrap_err();
        assert_eq!(err.to_string(), "cannot start while the simulation is running");
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(bodies(&sched, Species::PredatorA), members);
    }

    #[test]
    fn stop_keeps_membership_and_halts_bodies() {
        let mut sched = started();
        let mut archive = MemoryArchive::default();
        for _ in 0..3 {
            sched.tick(0.1, &mut archive).unwrap();
        }

        let members = bodies(&sched, Species::PredatorA);
        sched.stop().unwrap();
        assert_eq!(sched.phase(), Phase::Stopped);
        for species in Species::EVOLVING {
            for agt in sched.population(species).unwrap().agents() {
                assert!(!agt.is_awake());
                if let Some(body) = sched.arena().body(agt.body()) {
                    let velocity = body.velocity();
                    assert_eq!((velocity.x, velocity.z), (0.0, 0.0));
                }
            }
        }

        let before = positions(&sched);
        for _ in 0..30 {
            sched.tick(0.1, &mut archive).unwrap();
        }
        assert_eq!(positions(&sched), before);
        assert_eq!(sched.generation(), 0);

        sched.resume().unwrap();
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(bodies(&sched, Species::PredatorA), members);
        let pop = sched.population(Species::PredatorA).unwrap();
        assert!(pop.agents().iter().all(|agt| agt.is_awake()));
    }

    #[test]
    fn interval_closes_a_generation() {
        let mut sched = started();
        let mut archive = MemoryArchive::default();
        for _ in 0..25 {
            sched.tick(0.1, &mut archive).unwrap();
        }

        assert_eq!(sched.generation(), 1);
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(
            archive.label_vec,
            ["predator-a-gen-0001", "predator-b-gen-0001"]
        );
        assert_eq!(archive.record_vec.len(), 1);
        let record = &archive.record_vec[0];
        assert_eq!(record.index, 1);
        let species_vec: Vec<_> = record.summaries.iter().map(|s| s.species).collect();
        assert_eq!(species_vec, Species::EVOLVING);

        let template = sched.cfg().predator_b.genome;
        let pop = sched.population(Species::PredatorB).unwrap();
        assert!(!pop.parents().is_empty());
        assert!(pop.agents().iter().all(|agt| *agt.genome() == template));
        assert!(pop.agents().iter().all(|agt| agt.fitness() == 0.0));
        assert_eq!(pop.agents()[0].label(), "predator-b-0001-000");
    }

    #[test]
    fn extinct_population_is_reseeded_before_ranking() {
        let mut sched = started();
        let mut archive = MemoryArchive::default();
        for id in bodies(&sched, Species::PredatorA) {
            sched.arena.despawn(id);
        }
        assert_eq!(sched.arena().count(Species::PredatorA), 0);

        sched.continue_simulation(&mut archive).unwrap();
        assert_eq!(sched.generation(), 1);
        assert_eq!(sched.phase(), Phase::Running);

        let summary = &archive.record_vec[0].summaries[0];
        assert_eq!(summary.species, Species::PredatorA);
        assert!(summary.survivors > 0);
        assert_eq!(summary.best_fitness, 0.0);
        assert!(!sched.population(Species::PredatorA).unwrap().is_empty());
        assert!(sched.arena().count(Species::PredatorA) > 0);
    }

    #[test]
    fn unfillable_reseed_skips_selection() {
        let mut cfg = sample_config();
        cfg.predator_b.spawn_area = Some(Area {
            min: [4.2, -0.8],
            max: [4.8, 0.8],
        });
        let mut sched = Scheduler::new(cfg);
        let mut archive = MemoryArchive::default();
        sched.start().unwrap();
        assert!(sched.population(Species::PredatorB).unwrap().is_empty());

        sched.continue_simulation(&mut archive).unwrap();
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(sched.generation(), 1);
        assert_eq!(archive.label_vec, ["predator-a-gen-0001"]);
        let species_vec: Vec<_> = archive.record_vec[0]
            .summaries
            .iter()
            .map(|s| s.species)
            .collect();
        assert_eq!(species_vec, [Species::PredatorA]);
        assert!(sched.population(Species::PredatorB).unwrap().parents().is_empty());
        assert!(!sched.population(Species::PredatorA).unwrap().is_empty());

        sched.stop().unwrap();
        sched.resume().unwrap();
        for _ in 0..25 {
            sched.tick(0.1, &mut archive).unwrap();
        }
        assert_eq!(sched.generation(), 2);
        assert_eq!(sched.phase(), Phase::Running);
    }

    #[test]
    fn failed_transitions_restore_the_phase() {
        let mut cfg = sample_config();
        cfg.prey.patches[0].area = Area {
            min: [1.0, 1.0],
            max: [0.0, 0.0],
        };
        let mut sched = Scheduler::new(cfg);
        assert!(sched.start().is_err());
        assert_eq!(sched.phase(), Phase::Idle);

        let mut sched = started();
        let mut archive = MemoryArchive::default();
        let members = bodies(&sched, Species::PredatorA);
        sched.prey_spawners[0].area = Area {
            min: [1.0, 1.0],
            max: [0.0, 0.0],
        };

        assert!(sched.continue_simulation(&mut archive).is_err());
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(sched.generation(), 0);
        assert_eq!(bodies(&sched, Species::PredatorA), members);
        assert!(archive.record_vec.is_empty());

        sched.stop().unwrap();
        assert!(sched.continue_simulation(&mut archive).is_err());
        assert_eq!(sched.phase(), Phase::Stopped);
        sched.resume().unwrap();
        assert_eq!(sched.phase(), Phase::Running);
    }

    #[test]
    fn continue_from_stopped_breeds_and_runs() {
        let mut sched = started();
        let mut archive = MemoryArchive::default();
        let old_a = bodies(&sched, Species::PredatorA);
        sched.stop().unwrap();

        sched.continue_simulation(&mut archive).unwrap();
        assert_eq!(sched.phase(), Phase::Running);
        assert_eq!(sched.generation(), 1);
        assert_eq!(archive.record_vec.len(), 1);

        let new_a = bodies(&sched, Species::PredatorA);
        assert!(new_a.iter().all(|id| !old_a.contains(id)));
        for species in Species::EVOLVING {
            let pop = sched.population(species).unwrap();
            assert!(!pop.parents().is_empty());
            assert!(pop.agents().iter().all(|agt| agt.is_awake()));
        }

        let before = positions(&sched);
        sched.tick(0.1, &mut archive).unwrap();
        assert_ne!(positions(&sched), before);
    }

    #[test]
    fn archive_failures_do_not_halt_the_loop() {
        let mut sched = started();
        sched.continue_simulation(&mut BrokenArchive).unwrap();
        sched.continue_simulation(&mut BrokenArchive).unwrap();
        assert_eq!(sched.generation(), 2);
        assert_eq!(sched.phase(), Phase::Running);
    }

    #[test]
    fn replays_are_deterministic() {
        let mut archive = MemoryArchive::default();
        let mut a = started();
        let mut b = started();
        assert_eq!(positions(&a), positions(&b));
        for _ in 0..10 {
            a.tick(0.1, &mut archive).unwrap();
            b.tick(0.1, &mut archive).unwrap();
        }
        assert_eq!(positions(&a), positions(&b));
    }

    #[test]
    fn contacts_pay_out_and_despawn() {
        let mut sched = started();
        let hunter = bodies(&sched, Species::PredatorA)[0];
        let guard = bodies(&sched, Species::PredatorB)[0];
        let spot = sched.arena().body(hunter).unwrap().position();
        let meal = sched.arena.insert(Species::Prey, spot, 0.3);

        sched.resolve_contacts(&[Contact {
            a: (meal, Species::Prey),
            b: (hunter, Species::PredatorA),
        }]);
        assert!(!sched.arena().contains(meal));
        assert_eq!(fitness_of(&sched, Species::PredatorA, hunter), 2.0);

        sched.resolve_contacts(&[Contact {
            a: (hunter, Species::PredatorA),
            b: (guard, Species::PredatorB),
        }]);
        assert!(!sched.arena().contains(hunter));
        assert!(sched.arena().contains(guard));
        assert_eq!(fitness_of(&sched, Species::PredatorA, hunter), -98.0);
        assert_eq!(fitness_of(&sched, Species::PredatorB, guard), 5.0);
    }

    #[test]
    fn generate_species_respawns_one_cohort() {
        let mut sched = started();
        let old_b = bodies(&sched, Species::PredatorB);
        let old_a = bodies(&sched, Species::PredatorA);

        sched.generate_species(Species::PredatorB).unwrap();
        let new_b = bodies(&sched, Species::PredatorB);
        assert!(!new_b.is_empty());
        assert!(old_b.iter().all(|&id| !sched.arena().contains(id)));
        assert!(new_b.iter().all(|id| !old_b.contains(id)));
        assert_eq!(bodies(&sched, Species::PredatorA), old_a);

        let pop = sched.population(Species::PredatorB).unwrap();
        assert!(pop.agents().iter().all(|agt| agt.is_awake()));
    }
}
