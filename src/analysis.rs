use crate::genome::Genome;
use crate::model::Species;
use crate::record::{GenerationRecord, SpeciesSummary};
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, record: &GenerationRecord) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

fn species_slot(summary: &SpeciesSummary) -> Result<usize> {
    Species::EVOLVING
        .iter()
        .position(|&species| species == summary.species)
        .with_context(|| format!("{} does not evolve", summary.species))
}

/// Per-species statistics of one summary field over all generations.
pub struct SummaryField {
    name: &'static str,
    field: fn(&SpeciesSummary) -> f64,
    acc_vec: Vec<Accumulator>,
}

impl SummaryField {
    pub fn new(name: &'static str, field: fn(&SpeciesSummary) -> f64) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(Species::EVOLVING.len(), Accumulator::new);
        Self {
            name,
            field,
            acc_vec,
        }
    }
}

impl Obs for SummaryField {
    fn update(&mut self, record: &GenerationRecord) -> Result<()> {
        for summary in &record.summaries {
            let slot = species_slot(summary)?;
            self.acc_vec[slot].add((self.field)(summary));
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: serde_json::Map<_, _> = Species::EVOLVING
            .iter()
            .zip(&self.acc_vec)
            .map(|(species, acc)| (species.to_string(), serde_json::json!(acc.report())))
            .collect();
        serde_json::json!({ (self.name): reports })
    }
}

/// Fittest genome seen for each species and the generation it came from.
pub struct Champion {
    best_vec: Vec<Option<(usize, f64, Genome)>>,
}

impl Champion {
    pub fn new() -> Self {
        Self {
            best_vec: vec![None; Species::EVOLVING.len()],
        }
    }
}

impl Obs for Champion {
    fn update(&mut self, record: &GenerationRecord) -> Result<()> {
        for summary in &record.summaries {
            let best = &mut self.best_vec[species_slot(summary)?];
            let improved = match best {
                Some((_, fitness, _)) => summary.best_fitness > *fitness,
                None => true,
            };
            if improved {
                *best = Some((record.index, summary.best_fitness, summary.best_genome));
            }
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: serde_json::Map<_, _> = Species::EVOLVING
            .iter()
            .zip(&self.best_vec)
            .map(|(species, best)| {
                let report = match best {
                    Some((generation, fitness, genome)) => serde_json::json!({
                        "generation": generation,
                        "fitness": fitness,
                        "genome": genome,
                    }),
                    None => serde_json::Value::Null,
                };
                (species.to_string(), report)
            })
            .collect();
        serde_json::json!({ "champion": reports })
    }
}

pub struct Analyzer {
    n_records: usize,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(SummaryField::new("best_fitness", |s| s.best_fitness)),
            Box::new(SummaryField::new("mean_fitness", |s| s.mean_fitness)),
            Box::new(SummaryField::new("survivors", |s| s.survivors as f64)),
            Box::new(Champion::new()),
        ];
        Self {
            n_records: 0,
            obs_ptr_vec,
        }
    }

    /// Feed every generation record stored in a history file.
    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        let record_vec: Vec<GenerationRecord> =
            decode::from_read(&mut reader).context("failed to read history")?;
        for record in &record_vec {
            self.add_record(record)?;
        }
        Ok(())
    }

    pub fn add_record(&mut self, record: &GenerationRecord) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(record).context("failed to update observable")?;
        }
        self.n_records += 1;
        Ok(())
    }

    pub fn reports(&self) -> Vec<serde_json::Value> {
        let mut reports = vec![serde_json::json!({ "generations": self.n_records })];
        reports.extend(self.obs_ptr_vec.iter().map(|obs| obs.report()));
        reports
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, &self.reports())?;
        Ok(())
    }
}
