// ============================================================
// Layer 5 — Predictor
// ============================================================
// Loads a reader checkpoint and scores answer spans for a list
// of features. Features are batched through Burn's DataLoader;
// each batch's logits are copied to the host and trimmed back to
// the feature's own word length, so padding columns never reach
// the result file.
//
// N-best extraction and answer text reconstruction happen
// downstream from the raw results.

use anyhow::{anyhow, Context, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};

use crate::data::{
    batcher::{FeatureBatcher, ReaderBatch},
    dataset::{FeatureDataset, IndexedFeature},
};
use crate::domain::{feature::ReadingFeature, span_result::RawSpanResult, traits::SpanScorer};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    reader::ReadingComprehensionModel,
    weights::{KeyPolicy, ParameterStore},
};

/// Backend used by the command line.
pub type InferBackend = burn::backend::Wgpu;

pub struct Predictor<B: Backend> {
    model:      ReadingComprehensionModel<B>,
    batcher:    FeatureBatcher,
    batch_size: usize,
    device:     B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        model:      ReadingComprehensionModel<B>,
        batcher:    FeatureBatcher,
        batch_size: usize,
        device:     B::Device,
    ) -> Self {
        Self { model, batcher, batch_size: batch_size.max(1), device }
    }

    /// Rebuild the reader from `config.json` and load its weights strictly.
    pub fn from_checkpoint(
        ckpt:       &CheckpointManager,
        batcher:    FeatureBatcher,
        batch_size: usize,
        device:     B::Device,
    ) -> Result<Self> {
        let cfg = ckpt.load_config()?;
        let model = cfg.init_reader::<B>(&device)?;
        let (model, report) = model
            .load_state_dict(&ckpt.load_state()?, KeyPolicy::Strict)
            .with_context(|| {
                format!("Checkpoint '{}' does not hold a reader", ckpt.dir().display())
            })?;
        tracing::info!(
            "Reader loaded: {} layers, hidden={}, {} tensors",
            cfg.num_hidden_layers, cfg.hidden_size, report.loaded
        );
        Ok(Self::new(model, batcher, batch_size, device))
    }
}

fn host_values<B: Backend>(t: Tensor<B, 2>) -> Result<Vec<f32>> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| anyhow!("Cannot read logits back from the device: {err:?}"))
}

impl<B: Backend> SpanScorer for Predictor<B> {
    fn score(&self, features: Vec<ReadingFeature>) -> Result<Vec<RawSpanResult>> {
        let word_lengths: Vec<usize> = features.iter().map(|f| f.num_words()).collect();
        let unique_ids: Vec<u64> = features.iter().map(|f| f.unique_id).collect();
        let mut results: Vec<Option<RawSpanResult>> = vec![None; features.len()];

        let loader = DataLoaderBuilder::<B, IndexedFeature, ReaderBatch<B>>::new(self.batcher.clone())
            .batch_size(self.batch_size)
            .num_workers(1)
            .set_device(self.device.clone())
            .build(FeatureDataset::new(features));

        let mut loss_sum = 0.0f64;
        let mut gold_batches = 0usize;

        for batch in loader.iter() {
            // features carrying gold spans also get the span loss
            let output = match (batch.start_positions, batch.end_positions) {
                (Some(start), Some(end)) => {
                    let (loss, output) =
                        self.model.forward_loss(batch.words, batch.entities, start, end)?;
                    loss_sum += loss.into_scalar().elem::<f64>();
                    gold_batches += 1;
                    output
                }
                _ => self.model.forward(batch.words, batch.entities)?,
            };
            let width = output.start_logits.dims()[1];
            let starts = host_values(output.start_logits)?;
            let ends = host_values(output.end_logits)?;

            for (row, &index) in batch.example_indices.iter().enumerate() {
                let offset = row * width;
                let len = word_lengths[index].min(width);
                results[index] = Some(RawSpanResult {
                    unique_id:    unique_ids[index],
                    start_logits: starts[offset..offset + len].to_vec(),
                    end_logits:   ends[offset..offset + len].to_vec(),
                });
            }
            tracing::debug!("Scored batch of {} feature(s)", batch.example_indices.len());
        }

        if gold_batches > 0 {
            tracing::info!(
                "Mean span loss over {} gold batch(es): {:.4}",
                gold_batches,
                loss_sum / gold_batches as f64
            );
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                result.ok_or_else(|| anyhow!("Feature {i} (unique_id {}) was never scored", unique_ids[i]))
            })
            .collect()
    }
}
