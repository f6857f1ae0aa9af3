use crate::arena::BodyId;
use crate::fitness::Fitness;
use crate::genome::{Genome, Mutation};
use crate::model::Species;
use crate::perception::{self, WorldQuery};
use crate::record::SpeciesSummary;
use crate::selection;
use crate::utility::{self, ScoredDirection};
use anyhow::{Context, Result, bail};
use glam::{DQuat, DVec3};
use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

/// Runtime state of one live agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    body: BodyId,
    genome: Genome,
    fitness: Fitness,
    awake: bool,
    label: String,
}

impl Agent {
    pub fn new(body: BodyId, genome: Genome, label: String) -> Self {
        Self {
            body,
            genome: genome.clamped(),
            fitness: Fitness::default(),
            awake: false,
            label,
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn fitness(&self) -> f64 {
        self.fitness.value()
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn wake(&mut self) {
        self.awake = true;
    }

    pub fn sleep(&mut self) {
        self.awake = false;
    }

    pub(crate) fn credit(&mut self, delta: f64) {
        self.fitness.credit(delta);
    }

    /// Perceive, score and pick the direction to move along this tick.
    pub fn decide<W, R>(
        &self,
        world: &W,
        position: DVec3,
        heading: DQuat,
        rng: &mut R,
    ) -> Result<ScoredDirection>
    where
        W: WorldQuery + ?Sized,
        R: Rng + ?Sized,
    {
        let forward = perception::ground_forward(heading);
        let samples = perception::sample_fan(world, position, forward, &self.genome);
        let scored = utility::evaluate(&samples, &self.genome, world, position, forward, rng)
            .context("failed to score directions")?;
        selection::choose_direction(scored, rng)
    }
}

/// Live agents of one species plus the parents chosen at the last ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    species: Species,
    /// Genome used when there are no parents yet.
    template: Genome,
    parent_size: usize,
    evolution_enabled: bool,
    agt_vec: Vec<Agent>,
    parent_vec: Vec<Genome>,
}

impl Population {
    pub fn new(
        species: Species,
        template: Genome,
        parent_size: usize,
        evolution_enabled: bool,
    ) -> Self {
        Self {
            species,
            template: template.clamped(),
            parent_size,
            evolution_enabled,
            agt_vec: Vec::new(),
            parent_vec: Vec::new(),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agt_vec
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agt_vec
    }

    pub fn set_template(&mut self, genome: Genome) {
        self.template = genome.clamped();
    }

    pub fn parents(&self) -> &[Genome] {
        &self.parent_vec
    }

    pub fn is_empty(&self) -> bool {
        self.agt_vec.is_empty()
    }

    pub fn agent_mut(&mut self, body: BodyId) -> Option<&mut Agent> {
        self.agt_vec.iter_mut().find(|agt| agt.body == body)
    }

    /// Drop agents whose bodies left the world. Returns how many were dropped.
    pub fn prune(&mut self, is_alive: impl Fn(BodyId) -> bool) -> usize {
        let n_agt = self.agt_vec.len();
        self.agt_vec.retain(|agt| is_alive(agt.body));
        n_agt - self.agt_vec.len()
    }

    /// Agents by descending fitness. Ties keep their cohort order.
    pub fn ranked(&self) -> Vec<&Agent> {
        let mut ranked: Vec<_> = self.agt_vec.iter().collect();
        ranked.sort_by(|a, b| b.fitness().total_cmp(&a.fitness()));
        ranked
    }

    /// Keep the genomes of the `parent_size` fittest agents as parents.
    ///
    /// Fails on an empty population; callers must repopulate first.
    pub fn select_parents(&mut self) -> Result<SpeciesSummary> {
        let ranked = self.ranked();
        let Some(best) = ranked.first() else {
            bail!("cannot rank an empty {} population", self.species);
        };

        let n_agt = ranked.len();
        let mean_fitness = ranked.iter().map(|agt| agt.fitness()).sum::<f64>() / n_agt as f64;
        let summary = SpeciesSummary {
            species: self.species,
            survivors: n_agt,
            best_fitness: best.fitness(),
            mean_fitness,
            best_genome: best.genome,
        };
        let parent_vec: Vec<_> = ranked
            .iter()
            .take(self.parent_size)
            .map(|agt| agt.genome)
            .collect();

        self.parent_vec = parent_vec;
        Ok(summary)
    }

    /// Fill the cohort with unmutated copies of the parents (or the template).
    pub fn seed<R: Rng + ?Sized>(
        &mut self,
        bodies: &[BodyId],
        generation: usize,
        rng: &mut R,
    ) -> Result<()> {
        self.fill(bodies, None, generation, rng)
    }

    /// Fill the cohort with offspring of random parents, mutated if this
    /// species evolves.
    pub fn breed<R: Rng + ?Sized>(
        &mut self,
        bodies: &[BodyId],
        mutation: &Mutation,
        generation: usize,
        rng: &mut R,
    ) -> Result<()> {
        let mutation = self.evolution_enabled.then_some(mutation);
        self.fill(bodies, mutation, generation, rng)
    }

    fn fill<R: Rng + ?Sized>(
        &mut self,
        bodies: &[BodyId],
        mutation: Option<&Mutation>,
        generation: usize,
        rng: &mut R,
    ) -> Result<()> {
        let mut agt_vec = Vec::with_capacity(bodies.len());
        for (i_agt, &body) in bodies.iter().enumerate() {
            let parent = self.parent_vec.choose(rng).copied().unwrap_or(self.template);
            let genome = match mutation {
                Some(mutation) => mutation
                    .apply(&parent, rng)
                    .context("failed to mutate genome")?,
                None => parent,
            };
            let label = format!("{}-{generation:04}-{i_agt:03}", self.species);
            agt_vec.push(Agent::new(body, genome, label));
        }
        self.agt_vec = agt_vec;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Area, Arena, Spawner};
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn bodies(arena: &mut Arena, count: usize, rng: &mut ChaCha12Rng) -> Vec<BodyId> {
        let spawner = Spawner {
            key: 0,
            species: Species::PredatorA,
            area: Area::square(10.0),
            radius: 0.5,
            count,
        };
        arena.regenerate(&spawner, rng).unwrap()
    }

    fn tagged(sight_range: f64) -> Genome {
        Genome {
            sight_range,
            ..Genome::default()
        }
    }

    #[test]
    fn selection_takes_the_fittest() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut arena = Arena::new(20.0, &[], &[]);
        let id_vec = bodies(&mut arena, 3, &mut rng);
        assert_eq!(id_vec.len(), 3);

        let mut pop = Population::new(Species::PredatorA, Genome::default(), 2, true);
        pop.agt_vec = id_vec
            .iter()
            .zip([(5.0, 1.0), (9.0, 2.0), (1.0, 3.0)])
            .map(|(&body, (fitness, sight_range))| {
                let mut agt = Agent::new(body, tagged(sight_range), String::new());
                agt.credit(fitness);
                agt
            })
            .collect();

        let summary = pop.select_parents().unwrap();
        assert_eq!(pop.parents(), [tagged(2.0), tagged(1.0)]);
        assert_eq!(summary.best_genome, tagged(2.0));
        assert_eq!(summary.best_fitness, 9.0);
        assert_eq!(summary.mean_fitness, 5.0);
        assert_eq!(summary.survivors, 3);
    }

    #[test]
    fn short_population_gives_every_agent() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut arena = Arena::new(20.0, &[], &[]);
        let id_vec = bodies(&mut arena, 2, &mut rng);
        let mut pop = Population::new(Species::PredatorB, Genome::default(), 5, true);
        pop.seed(&id_vec, 0, &mut rng).unwrap();
        pop.select_parents().unwrap();
        assert_eq!(pop.parents().len(), 2);
    }

    #[test]
    fn empty_population_cannot_be_ranked() {
        let mut pop = Population::new(Species::PredatorB, Genome::default(), 2, true);
        assert!(pop.select_parents().is_err());
        assert!(pop.parents().is_empty());
    }

    #[test]
    fn offspring_come_from_parents() {
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        let mut arena = Arena::new(20.0, &[], &[]);
        let id_vec = bodies(&mut arena, 12, &mut rng);

        let mut pop = Population::new(Species::PredatorA, tagged(50.0), 2, false);
        pop.parent_vec = vec![tagged(2.0), tagged(3.0)];
        pop.breed(&id_vec, &Mutation::new(5.0, 100.0), 1, &mut rng)
            .unwrap();

        assert_eq!(pop.agents().len(), id_vec.len());
        for agt in pop.agents() {
            assert!([2.0, 3.0].contains(&agt.genome().sight_range));
            assert_eq!(agt.fitness(), 0.0);
            assert!(!agt.is_awake());
        }
    }

    #[test]
    fn missing_parents_fall_back_to_template() {
        let mut rng = ChaCha12Rng::seed_from_u64(8);
        let mut arena = Arena::new(20.0, &[], &[]);
        let id_vec = bodies(&mut arena, 4, &mut rng);

        let mut pop = Population::new(Species::PredatorA, tagged(7.0), 2, true);
        pop.breed(&id_vec, &Mutation::new(1.0, 0.0), 0, &mut rng)
            .unwrap();
        assert!(pop.agents().iter().all(|agt| *agt.genome() == tagged(7.0)));
        assert_eq!(pop.agents()[1].label(), "predator-a-0000-001");
    }

    #[test]
    fn prune_drops_despawned_bodies() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let mut arena = Arena::new(20.0, &[], &[]);
        let id_vec = bodies(&mut arena, 3, &mut rng);
        let mut pop = Population::new(Species::PredatorA, Genome::default(), 2, true);
        pop.seed(&id_vec, 0, &mut rng).unwrap();

        arena.despawn(id_vec[1]);
        assert_eq!(pop.prune(|id| arena.contains(id)), 1);
        assert_eq!(pop.agents().len(), 2);
        assert!(pop.agent_mut(id_vec[1]).is_none());
    }
}
