// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Scores answer spans for a file of features:
//
//   Step 1: Load features from JSON Lines        (Layer 4 - data)
//   Step 2: Rebuild the reader from checkpoint   (Layer 6 - infra)
//   Step 3: Batch + run the reader               (Layer 5 - ml)
//   Step 4: Write one RawSpanResult per line     (Layer 2)
//
// Results keep the input order, so line i of the output belongs
// to line i of the feature file.

use anyhow::{Context, Result};
use burn::prelude::*;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::data::{batcher::FeatureBatcher, loader::JsonlFeatureLoader};
use crate::domain::{
    span_result::RawSpanResult,
    traits::{FeatureSource, SpanScorer},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::predictor::Predictor;

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub features_path:     PathBuf,
    pub checkpoint_dir:    PathBuf,
    pub output_path:       PathBuf,
    pub batch_size:        usize,
    pub pad_token_id:      i64,
    pub max_entity_length: usize,
    /// Mask out every entity slot
    pub no_entity:         bool,
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// Returns the number of results written.
    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<usize> {
        let cfg = &self.config;
        let source = JsonlFeatureLoader::new(&cfg.features_path);
        let ckpt = CheckpointManager::open(&cfg.checkpoint_dir)?;
        let batcher = FeatureBatcher::new(cfg.pad_token_id, cfg.max_entity_length)
            .with_no_entity(cfg.no_entity);
        let scorer = Predictor::<B>::from_checkpoint(&ckpt, batcher, cfg.batch_size, device)?;
        self.run(&source, &scorer)
    }

    fn run(&self, source: &dyn FeatureSource, scorer: &dyn SpanScorer) -> Result<usize> {
        let features = source.load_all()?;
        let results = scorer.score(features)?;
        write_results(&self.config.output_path, &results)?;
        tracing::info!(
            "Wrote {} result(s) to '{}'",
            results.len(),
            self.config.output_path.display()
        );
        Ok(results.len())
    }
}

fn write_results(path: &Path, results: &[RawSpanResult]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Cannot create result file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for result in results {
        serde_json::to_writer(&mut out, result)?;
        out.write_all(b"\n")?;
    }
    out.flush()
        .with_context(|| format!("Cannot write result file '{}'", path.display()))
}
