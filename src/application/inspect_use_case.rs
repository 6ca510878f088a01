// ============================================================
// Layer 2 — InspectUseCase
// ============================================================
// Lists the parameters of a checkpoint: every stored tensor with
// its shape, the total value count, and how the file lines up
// with the registry of the model variant it claims to hold.

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::init_use_case::ModelVariant;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::weights::{ParamRegistry, ParameterStore, StateDict};

#[derive(Debug)]
pub struct InspectReport {
    /// (path, shape) in path order
    pub tensors:    Vec<(String, Vec<usize>)>,
    pub num_values: usize,
    /// Registry paths absent from the file
    pub missing:    Vec<String>,
    /// File entries the registry does not know
    pub unexpected: Vec<String>,
}

pub struct InspectUseCase {
    checkpoint_dir: PathBuf,
    variant:        ModelVariant,
}

impl InspectUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, variant: ModelVariant) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), variant }
    }

    pub fn execute<B: Backend>(&self, device: &B::Device) -> Result<InspectReport> {
        let ckpt = CheckpointManager::open(&self.checkpoint_dir)?;
        let cfg = ckpt.load_config()?;
        let registry = match self.variant {
            ModelVariant::Reader => cfg.init_reader::<B>(device)?.registry(),
            ModelVariant::EndToEnd => cfg.init_end_to_end_model::<B>(device)?.registry(),
        };
        Ok(compare(&registry, &ckpt.load_state()?))
    }
}

fn compare(registry: &ParamRegistry, state: &StateDict) -> InspectReport {
    let tensors: Vec<(String, Vec<usize>)> = state
        .tensors
        .iter()
        .map(|(path, t)| (path.clone(), t.shape.clone()))
        .collect();
    let num_values = state.tensors.values().map(|t| t.values.len()).sum();

    let missing = registry
        .paths()
        .filter(|p| state.get(p).is_none())
        .map(str::to_string)
        .collect();
    let unexpected = state
        .tensors
        .keys()
        .filter(|p| registry.get(p).is_none())
        .cloned()
        .collect();

    InspectReport { tensors, num_values, missing, unexpected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::init_use_case::{InitConfig, InitUseCase};
    use crate::ml::model::tests::{tiny_config, TB};

    fn init(dir: PathBuf, variant: ModelVariant) -> usize {
        let cfg = InitConfig {
            checkpoint_dir: dir,
            model:          tiny_config(),
            variant,
            bert_weights:   None,
            seed:           1,
        };
        InitUseCase::new(cfg).execute::<TB>(&Default::default()).unwrap().num_values
    }

    #[test]
    fn test_reports_every_tensor_of_a_matching_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let num_values = init(dir.path().to_path_buf(), ModelVariant::Reader);

        let report = InspectUseCase::new(dir.path(), ModelVariant::Reader)
            .execute::<TB>(&Default::default())
            .unwrap();
        assert_eq!(report.num_values, num_values);
        assert!(report.missing.is_empty());
        assert!(report.unexpected.is_empty());

        let qa = report.tensors.iter().find(|(p, _)| p == "qa_outputs.weight").unwrap();
        assert_eq!(qa.1, vec![2, 8]);
    }

    #[test]
    fn test_variant_mismatch_shows_up_as_key_differences() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path().to_path_buf(), ModelVariant::Reader);

        let report = InspectUseCase::new(dir.path(), ModelVariant::EndToEnd)
            .execute::<TB>(&Default::default())
            .unwrap();
        assert!(report.missing.iter().any(|p| p.starts_with("entity_selector.")));
        assert_eq!(report.unexpected, vec!["qa_outputs.bias".to_string(), "qa_outputs.weight".to_string()]);
    }
}
