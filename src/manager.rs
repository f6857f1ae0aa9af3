use crate::analysis::Analyzer;
use crate::config::{self, Config};
use crate::genome::Genome;
use crate::model::Species;
use crate::record::{Archive, GenerationRecord};
use crate::scheduler::Scheduler;
use anyhow::{Context, Result, bail};
use glob::glob;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Start a new run and simulate its first generations.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        let artifacts_dir = self.artifacts_dir(run_idx);
        fs::create_dir_all(&artifacts_dir)
            .with_context(|| format!("failed to create {artifacts_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let mut sched = Scheduler::new(self.cfg.clone());
        for species in Species::EVOLVING {
            let seed_genome = self.cfg.species(species).and_then(|c| c.seed_genome.as_ref());
            let Some(path) = seed_genome else {
                continue;
            };
            let file = self.sim_dir.join(path);
            let genome = load_genome(&file).with_context(|| format!("failed to load {file:?}"))?;
            log::info!("seeding {species} from {file:?}");
            sched = sched.with_seed_genome(species, genome);
        }
        sched.start().context("failed to start simulation")?;

        self.run_segment(run_idx, sched, false)
    }

    /// Simulate more generations of an existing run.
    ///
    /// With `advance`, the generation interrupted by the last stop is closed
    /// before ticking resumes.
    pub fn resume_run(&self, run_idx: usize, advance: bool) -> Result<()> {
        let checkpoint_file = self.checkpoint_file(run_idx);
        let sched = Scheduler::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        if sched.cfg() != &self.cfg {
            bail!("checkpoint config differs from the current config");
        }
        log::info!("loaded {checkpoint_file:?}");

        self.run_segment(run_idx, sched, advance)
    }

    fn run_segment(&self, run_idx: usize, mut sched: Scheduler, advance: bool) -> Result<()> {
        let file_idx = self
            .count_history_files(run_idx)
            .context("failed to count history files")?;
        let mut run_log = RunLog::new(self.artifacts_dir(run_idx));

        if advance {
            sched
                .continue_simulation(&mut run_log)
                .context("failed to continue simulation")?;
        } else {
            sched.resume().context("failed to resume simulation")?;
        }

        let target = sched.generation() + self.cfg.schedule.generations_per_run;
        let dt = self.cfg.schedule.time_step;
        while sched.generation() < target {
            sched
                .tick(dt, &mut run_log)
                .context("failed to run simulation")?;
        }
        sched.stop().context("failed to stop simulation")?;
        log_status(&sched);

        run_log
            .save_history(self.history_file(run_idx, file_idx))
            .context("failed to save history")?;

        sched
            .save_checkpoint(self.checkpoint_file(run_idx))
            .context("failed to save checkpoint")?;

        Ok(())
    }

    /// Respawn one species of a stopped run and save it back.
    pub fn generate_species(&self, run_idx: usize, species: Species) -> Result<()> {
        let checkpoint_file = self.checkpoint_file(run_idx);
        let mut sched = Scheduler::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        if sched.cfg() != &self.cfg {
            bail!("checkpoint config differs from the current config");
        }

        sched
            .generate_species(species)
            .with_context(|| format!("failed to generate {species}"))?;
        log_status(&sched);

        sched
            .save_checkpoint(&checkpoint_file)
            .context("failed to save checkpoint")?;

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let mut analyzer = Analyzer::new();

            let n_files = self
                .count_history_files(run_idx)
                .context("failed to count history files")?;
            for file_idx in 0..n_files {
                analyzer
                    .add_file(self.history_file(run_idx, file_idx))
                    .context("failed to add file")?;
            }

            let results_file = self.results_file(run_idx);
            analyzer
                .save_results(&results_file)
                .context("failed to save results")?;
            log::info!("saved {results_file:?}");
        }

        Ok(())
    }

    /// Remove analysis results, keeping runs intact.
    pub fn clean_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let results_file = self.results_file(run_idx);
            if results_file.exists() {
                fs::remove_file(&results_file)
                    .with_context(|| format!("failed to remove {results_file:?}"))?;
                log::info!("removed {results_file:?}");
            }
        }

        Ok(())
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn artifacts_dir(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("artifacts")
    }

    fn count_history_files(&self, run_idx: usize) -> Result<usize> {
        let pattern = self.run_dir(run_idx).join("history-*.msgpack");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob history files")?
            .filter_map(Result::ok)
            .count();
        Ok(count)
    }

    fn checkpoint_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("checkpoint.msgpack")
    }

    fn history_file(&self, run_idx: usize, file_idx: usize) -> PathBuf {
        self.run_dir(run_idx)
            .join(format!("history-{file_idx:04}.msgpack"))
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.json")
    }
}

fn log_status(sched: &Scheduler) {
    let arena = sched.arena();
    let mut counts = vec![format!("{} prey", arena.count(Species::Prey))];
    for species in Species::EVOLVING {
        let n_agt = sched.population(species).map_or(0, |pop| pop.agents().len());
        counts.push(format!("{}/{n_agt} {species}", arena.count(species)));
    }
    log::info!(
        "{} at generation {} with {}",
        sched.phase(),
        sched.generation(),
        counts.join(", ")
    );
}

/// Read a genome artifact written by [`RunLog`].
fn load_genome(file: &Path) -> Result<Genome> {
    let contents =
        fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
    let genome: Genome = toml::from_str(&contents).context("failed to deserialize genome")?;
    config::check_genome(&genome).context("invalid genome")?;
    Ok(genome)
}

/// Archive backed by a run directory.
///
/// Genome artifacts are written right away as TOML; generation records are
/// kept until [`RunLog::save_history`].
struct RunLog {
    artifacts_dir: PathBuf,
    record_vec: Vec<GenerationRecord>,
}

impl RunLog {
    fn new(artifacts_dir: PathBuf) -> Self {
        Self {
            artifacts_dir,
            record_vec: Vec::new(),
        }
    }

    fn save_history<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self.record_vec).context("failed to serialize history")?;
        Ok(())
    }
}

impl Archive for RunLog {
    fn save_genome_artifact(&mut self, genome: &Genome, label: &str) -> Result<()> {
        let file = self.artifacts_dir.join(format!("{label}.toml"));
        let contents = toml::to_string(genome).context("failed to serialize genome")?;
        fs::write(&file, contents).with_context(|| format!("failed to write {file:?}"))?;
        Ok(())
    }

    fn record_generation(&mut self, record: &GenerationRecord) -> Result<()> {
        self.record_vec.push(record.clone());
        Ok(())
    }
}
