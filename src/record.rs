use crate::genome::Genome;
use crate::model::Species;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Outcome of one species in a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSummary {
    pub species: Species,
    /// Live agents at ranking time.
    pub survivors: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_genome: Genome,
}

/// Summary of a completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub index: usize,
    pub summaries: Vec<SpeciesSummary>,
}

/// Storage for generation winners and history.
///
/// Failures are reported to the caller, who logs them and keeps going.
pub trait Archive {
    fn save_genome_artifact(&mut self, genome: &Genome, label: &str) -> Result<()>;

    fn record_generation(&mut self, record: &GenerationRecord) -> Result<()>;
}
