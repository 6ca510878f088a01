// ============================================================
// Layer 2 — InitUseCase
// ============================================================
// Builds a fresh model and writes it out as a checkpoint:
//
//   Step 1: Validate the config and seed the backend   (Layer 5 - ml)
//   Step 2: Build the chosen model variant             (Layer 5 - ml)
//   Step 3: Optionally adapt plain BERT weights        (Layer 6 - infra)
//   Step 4: Save model.safetensors + config.json       (Layer 6 - infra)
//
// Entity parameters absent from a BERT checkpoint keep their
// fresh initial values and are listed in the load report.

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::infra::checkpoint::{read_safetensors, CheckpointManager};
use crate::ml::{
    config::EntityModelConfig,
    weights::{LoadReport, ParameterStore},
};

/// Which model the checkpoint holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    /// Standard entity model with the span-prediction head
    Reader,
    /// Two-stage model with the entity selector
    EndToEnd,
}

#[derive(Debug, Clone)]
pub struct InitConfig {
    pub checkpoint_dir: PathBuf,
    pub model:          EntityModelConfig,
    pub variant:        ModelVariant,
    /// Plain BERT `.safetensors` file to start from
    pub bert_weights:   Option<PathBuf>,
    pub seed:           u64,
}

#[derive(Debug)]
pub struct InitSummary {
    pub num_tensors: usize,
    pub num_values:  usize,
    /// Present when BERT weights were adapted
    pub report:      Option<LoadReport>,
}

pub struct InitUseCase {
    config: InitConfig,
}

impl InitUseCase {
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<InitSummary> {
        let cfg = &self.config;
        cfg.model.validate()?;
        B::seed(device, cfg.seed);

        let ckpt = CheckpointManager::create(&cfg.checkpoint_dir)?;
        let summary = match cfg.variant {
            ModelVariant::Reader => self.finish(cfg.model.init_reader::<B>(device)?, &ckpt)?,
            ModelVariant::EndToEnd => {
                self.finish(cfg.model.init_end_to_end_model::<B>(device)?, &ckpt)?
            }
        };
        ckpt.save_config(&cfg.model)?;

        tracing::info!(
            "Initialised {:?} checkpoint in '{}': {} tensors, {} values",
            cfg.variant,
            ckpt.dir().display(),
            summary.num_tensors,
            summary.num_values
        );
        Ok(summary)
    }

    fn finish<B: Backend, M: ParameterStore<B>>(
        &self,
        model: M,
        ckpt:  &CheckpointManager,
    ) -> Result<InitSummary> {
        let (model, report) = match &self.config.bert_weights {
            Some(path) => {
                let state = read_safetensors(path)?;
                tracing::info!("Adapting {} BERT tensor(s) from '{}'", state.len(), path.display());
                let (model, report) = model.load_bert_weights(state)?;
                (model, Some(report))
            }
            None => (model, None),
        };

        let state = model.state_dict()?;
        ckpt.save_state(&state)?;
        Ok(InitSummary {
            num_tensors: state.len(),
            num_values:  model.registry().num_values(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::write_safetensors;
    use crate::ml::{
        model::tests::{tiny_config, TB},
        weights::{KeyPolicy, StateDict},
    };

    fn init_config(dir: PathBuf, variant: ModelVariant) -> InitConfig {
        InitConfig {
            checkpoint_dir: dir,
            model:          tiny_config(),
            variant,
            bert_weights:   None,
            seed:           7,
        }
    }

    #[test]
    fn test_writes_loadable_reader_checkpoint() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let summary = InitUseCase::new(init_config(dir.path().join("ckpt"), ModelVariant::Reader))
            .execute::<TB>(&device)
            .unwrap();
        assert!(summary.report.is_none());

        let ckpt = CheckpointManager::open(dir.path().join("ckpt")).unwrap();
        let state = ckpt.load_state().unwrap();
        assert_eq!(state.len(), summary.num_tensors);

        let reader = ckpt.load_config().unwrap().init_reader::<TB>(&device).unwrap();
        let (_, report) = reader.load_state_dict(&state, KeyPolicy::Strict).unwrap();
        assert_eq!(report.loaded, summary.num_tensors);
    }

    #[test]
    fn test_end_to_end_variant_saves_selector() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        InitUseCase::new(init_config(dir.path().to_path_buf(), ModelVariant::EndToEnd))
            .execute::<TB>(&device)
            .unwrap();

        let state = CheckpointManager::open(dir.path()).unwrap().load_state().unwrap();
        assert!(state.get("entity_selector.bias.weight").is_some());
        assert!(state.get("qa_outputs.weight").is_none());
    }

    #[test]
    fn test_bert_weights_are_adapted_and_reported() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();

        // A BERT-layout checkpoint: `bert.` prefix and gamma/beta names
        let donor = tiny_config().init_entity_model::<TB>(&device).unwrap();
        let mut bert = StateDict::default();
        for (path, tensor) in donor.state_dict().unwrap().tensors {
            if path.starts_with("entity_embeddings") {
                continue;
            }
            let renamed = path
                .replace("LayerNorm.weight", "LayerNorm.gamma")
                .replace("LayerNorm.bias", "LayerNorm.beta");
            bert.insert(format!("bert.{renamed}"), tensor);
        }
        assert!(bert.get("bert.embeddings.LayerNorm.gamma").is_some());
        assert!(bert.get("bert.encoder.layer.0.attention.output.LayerNorm.beta").is_some());
        let bert_path = dir.path().join("bert.safetensors");
        write_safetensors(&bert_path, &bert).unwrap();

        let mut cfg = init_config(dir.path().join("ckpt"), ModelVariant::Reader);
        cfg.bert_weights = Some(bert_path);
        let summary = InitUseCase::new(cfg).execute::<TB>(&device).unwrap();

        let report = summary.report.unwrap();
        assert!(report.unexpected.is_empty());
        assert!(report.missing.iter().any(|p| p == "entity_embeddings.entity_embeddings.weight"));
        assert!(report.missing.iter().any(|p| p == "qa_outputs.weight"));

        let saved = CheckpointManager::open(dir.path().join("ckpt")).unwrap().load_state().unwrap();
        let donor_state = donor.state_dict().unwrap();
        for path in [
            "embeddings.word_embeddings.weight",
            "embeddings.LayerNorm.weight",
            "encoder.layer.1.output.LayerNorm.bias",
        ] {
            assert_eq!(saved.get(path), donor_state.get(path), "{path}");
        }
    }

    #[test]
    fn test_invalid_config_writes_nothing() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = init_config(dir.path().join("ckpt"), ModelVariant::Reader);
        cfg.model = cfg.model.with_num_attention_heads(3);

        assert!(InitUseCase::new(cfg).execute::<TB>(&device).is_err());
        assert!(!dir.path().join("ckpt").exists());
    }
}
