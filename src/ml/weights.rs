// ============================================================
// Layer 5 — Parameter Registry & Weight Loading
// ============================================================
// Every float parameter gets a dotted checkpoint path derived
// from the module tree while burn walks it:
//
//   encoder.layer.3.attention.self.query.weight
//   entity_embeddings.LayerNorm.bias
//
// Field names are translated to the published BERT layout
// (`layer_norm` → `LayerNorm`, `self_attn` → `self`, LayerNorm
// gamma/beta → weight/bias). Linear weights live as [in, out]
// inside burn but as [out, in] in checkpoints; the registry
// records the checkpoint shape and the loader transposes.
//
//   ModuleVisitor  → ParamRegistry, StateDict
//   ModuleMapper   → load a StateDict into a module

use std::collections::{BTreeMap, BTreeSet};

use burn::{
    module::{Module, ModuleMapper, ModuleVisitor, Param, ParamId},
    prelude::*,
};

use crate::ml::{
    e2e::EndToEndEntityModel,
    error::ModelError,
    model::EntityModel,
    reader::ReadingComprehensionModel,
};

// ─── Path tracking ────────────────────────────────────────────────────────────
/// How a parameter is laid out in checkpoints relative to burn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLayout {
    /// Same shape and order.
    Plain,
    /// burn [in, out], checkpoint [out, in].
    LinearWeight,
}

/// Wrapper fields whose children are stored at the wrapper's own level.
const TRANSPARENT_FIELDS: &[(&str, &str)] = &[("Struct:ReadingComprehensionModel", "model")];

struct Segment {
    name:   Option<String>,
    layout: ParamLayout,
}

#[derive(Default)]
struct PathTracker {
    stack: Vec<Segment>,
}

impl PathTracker {
    fn enter(&mut self, name: &str, container_type: &str) {
        let transparent = TRANSPARENT_FIELDS
            .iter()
            .any(|&(container, field)| container == container_type && field == name);

        let translated = match (container_type, name) {
            ("Struct:LayerNorm", "gamma") => "weight",
            ("Struct:LayerNorm", "beta")  => "bias",
            (_, "layer_norm")             => "LayerNorm",
            (_, "self_attn")              => "self",
            _                             => name,
        };
        let layout = if container_type == "Struct:Linear" && name == "weight" {
            ParamLayout::LinearWeight
        } else {
            ParamLayout::Plain
        };

        self.stack.push(Segment {
            name: (!transparent).then(|| translated.to_string()),
            layout,
        });
    }

    fn exit(&mut self) {
        self.stack.pop();
    }

    fn path(&self) -> String {
        self.stack
            .iter()
            .filter_map(|s| s.name.as_deref())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn layout(&self) -> ParamLayout {
        self.stack.last().map_or(ParamLayout::Plain, |s| s.layout)
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub path:   String,
    pub id:     ParamId,
    /// Shape as stored in checkpoints.
    pub shape:  Vec<usize>,
    pub layout: ParamLayout,
}

/// Ordered list of every float parameter of a module.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    pub entries: Vec<ParamEntry>,
}

impl ParamRegistry {
    pub fn get(&self, path: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn num_values(&self) -> usize {
        self.entries.iter().map(|e| e.shape.iter().product::<usize>()).sum()
    }
}

#[derive(Default)]
struct RegistryBuilder {
    tracker: PathTracker,
    entries: Vec<ParamEntry>,
}

impl<B: Backend> ModuleVisitor<B> for RegistryBuilder {
    fn enter_module(&mut self, name: &str, container_type: &str) {
        self.tracker.enter(name, container_type);
    }

    fn exit_module(&mut self, _name: &str, _container_type: &str) {
        self.tracker.exit();
    }

    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        let layout = self.tracker.layout();
        let mut shape = param.val().dims().to_vec();
        if layout == ParamLayout::LinearWeight {
            shape.reverse();
        }
        self.entries.push(ParamEntry {
            path: self.tracker.path(),
            id: param.id,
            shape,
            layout,
        });
    }
}

// ─── State dict ───────────────────────────────────────────────────────────────
/// Host copy of one parameter, row-major f32 in checkpoint layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTensor {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamTensor {
    pub fn new(path: &str, shape: Vec<usize>, values: Vec<f32>) -> Result<Self, ModelError> {
        let expected = shape.iter().product::<usize>();
        if expected != values.len() {
            return Err(ModelError::CorruptTensor {
                path: path.to_string(),
                shape,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { shape, values })
    }
}

/// Flat mapping from checkpoint path to tensor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    pub tensors: BTreeMap<String, ParamTensor>,
}

impl StateDict {
    pub fn insert(&mut self, path: impl Into<String>, tensor: ParamTensor) {
        self.tensors.insert(path.into(), tensor);
    }

    pub fn get(&self, path: &str) -> Option<&ParamTensor> {
        self.tensors.get(path)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Snapshot every float parameter of `module`.
    pub fn from_module<B: Backend, M: Module<B>>(module: &M) -> Result<Self, ModelError> {
        let mut collector = StateCollector::default();
        module.visit(&mut collector);
        match collector.error {
            Some(err) => Err(err),
            None => Ok(collector.state),
        }
    }

    /// Rename keys of a plain BERT checkpoint to this crate's layout:
    /// `gamma`/`beta` become `weight`/`bias` and a leading `bert.` is dropped.
    pub fn adapt_bert_keys(self) -> Self {
        let tensors = self
            .tensors
            .into_iter()
            .map(|(key, tensor)| {
                let renamed = key.replace("gamma", "weight").replace("beta", "bias");
                let renamed = match renamed.strip_prefix("bert.") {
                    Some(rest) => rest.to_string(),
                    None => renamed,
                };
                (renamed, tensor)
            })
            .collect();
        Self { tensors }
    }
}

#[derive(Default)]
struct StateCollector {
    tracker: PathTracker,
    state:   StateDict,
    error:   Option<ModelError>,
}

impl<B: Backend> ModuleVisitor<B> for StateCollector {
    fn enter_module(&mut self, name: &str, container_type: &str) {
        self.tracker.enter(name, container_type);
    }

    fn exit_module(&mut self, _name: &str, _container_type: &str) {
        self.tracker.exit();
    }

    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if self.error.is_some() {
            return;
        }
        let tensor = match self.tracker.layout() {
            ParamLayout::LinearWeight => param.val().transpose(),
            ParamLayout::Plain => param.val(),
        };
        let shape = tensor.dims().to_vec();
        let values = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ModelError::TensorData(format!("{e:?}")));

        match values {
            Ok(values) => self.state.insert(self.tracker.path(), ParamTensor { shape, values }),
            Err(err) => self.error = Some(err),
        }
    }
}

// ─── Loading ──────────────────────────────────────────────────────────────────
/// What to do with keys present on only one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Warn about missing keys, log unexpected keys, keep going.
    Lenient,
    /// Any missing or unexpected key is an error.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded:     usize,
    /// Parameters left at their current values.
    pub missing:    Vec<String>,
    /// Checkpoint entries nothing claimed.
    pub unexpected: Vec<String>,
}

struct StateLoader<'a> {
    tracker: PathTracker,
    state:   &'a StateDict,
    loaded:  usize,
}

impl<B: Backend> ModuleMapper<B> for StateLoader<'_> {
    fn enter_module(&mut self, name: &str, container_type: &str) {
        self.tracker.enter(name, container_type);
    }

    fn exit_module(&mut self, _name: &str, _container_type: &str) {
        self.tracker.exit();
    }

    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let Some(entry) = self.state.get(&self.tracker.path()) else {
            return param;
        };
        let layout = self.tracker.layout();
        let (id, current, mapper) = param.consume();
        let device = current.device();
        let require_grad = current.is_require_grad();

        let data = TensorData::new(entry.values.clone(), entry.shape.clone());
        let mut value = Tensor::<B, D>::from_data(data, &device);
        if layout == ParamLayout::LinearWeight {
            value = value.transpose();
        }
        self.loaded += 1;
        Param::from_mapped_value(id, value.set_require_grad(require_grad), mapper)
    }
}

/// Check `state` against `registry` and work out which keys line up.
fn reconcile(
    registry: &ParamRegistry,
    state:    &StateDict,
    policy:   KeyPolicy,
) -> Result<LoadReport, ModelError> {
    let mut missing = Vec::new();
    for entry in &registry.entries {
        match state.get(&entry.path) {
            Some(tensor) if tensor.shape != entry.shape => {
                return Err(ModelError::ShapeMismatch {
                    path:       entry.path.clone(),
                    checkpoint: tensor.shape.clone(),
                    expected:   entry.shape.clone(),
                });
            }
            Some(tensor) => {
                let expected = tensor.shape.iter().product::<usize>();
                if expected != tensor.values.len() {
                    return Err(ModelError::CorruptTensor {
                        path: entry.path.clone(),
                        shape: tensor.shape.clone(),
                        expected,
                        actual: tensor.values.len(),
                    });
                }
            }
            None => missing.push(entry.path.clone()),
        }
    }

    let known: BTreeSet<&str> = registry.paths().collect();
    let unexpected: Vec<String> = state
        .tensors
        .keys()
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();

    if policy == KeyPolicy::Strict {
        if !missing.is_empty() {
            return Err(ModelError::MissingKeys(missing));
        }
        if !unexpected.is_empty() {
            return Err(ModelError::UnexpectedKeys(unexpected));
        }
    }
    if !missing.is_empty() {
        tracing::warn!(
            "{} parameter(s) not found in checkpoint, keeping initial values: {}",
            missing.len(),
            missing.join(", ")
        );
    }
    if !unexpected.is_empty() {
        tracing::info!(
            "{} checkpoint weight(s) not used: {}",
            unexpected.len(),
            unexpected.join(", ")
        );
    }

    Ok(LoadReport {
        loaded: registry.entries.len() - missing.len(),
        missing,
        unexpected,
    })
}

// ─── ParameterStore ───────────────────────────────────────────────────────────
/// Checkpoint access for the model variants.
pub trait ParameterStore<B: Backend>: Module<B> + Sized {
    fn registry(&self) -> ParamRegistry {
        let mut builder = RegistryBuilder::default();
        self.visit(&mut builder);
        ParamRegistry { entries: builder.entries }
    }

    fn state_dict(&self) -> Result<StateDict, ModelError> {
        StateDict::from_module::<B, Self>(self)
    }

    /// Copy matching tensors from `state` into the module.
    ///
    /// Shape mismatches always fail and leave nothing half-loaded.
    fn load_state_dict(
        self,
        state:  &StateDict,
        policy: KeyPolicy,
    ) -> Result<(Self, LoadReport), ModelError> {
        let report = reconcile(&self.registry(), state, policy)?;
        let mut loader = StateLoader {
            tracker: PathTracker::default(),
            state,
            loaded: 0,
        };
        let module = self.map(&mut loader);
        tracing::debug!("copied {} tensor(s) into the model", loader.loaded);
        Ok((module, report))
    }

    /// Load a plain BERT checkpoint. Entity parameters are reported as
    /// missing and keep their initial values.
    fn load_bert_weights(self, state: StateDict) -> Result<(Self, LoadReport), ModelError> {
        self.load_state_dict(&state.adapt_bert_keys(), KeyPolicy::Lenient)
    }
}

impl<B: Backend> ParameterStore<B> for EntityModel<B> {}
impl<B: Backend> ParameterStore<B> for EndToEndEntityModel<B> {}
impl<B: Backend> ParameterStore<B> for ReadingComprehensionModel<B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::{sample_inputs, tiny_config, TB};

    fn values<const D: usize>(t: Tensor<TB, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_registry_uses_checkpoint_names() {
        let device = Default::default();
        let model  = tiny_config().init_entity_model::<TB>(&device).unwrap();
        let registry = model.registry();

        let query = registry
            .get("encoder.layer.0.attention.self.query.weight")
            .unwrap();
        assert_eq!(query.layout, ParamLayout::LinearWeight);
        assert_eq!(query.shape, vec![8, 8]);

        let inter = registry.get("encoder.layer.1.intermediate.dense.weight").unwrap();
        assert_eq!(inter.shape, vec![16, 8]);

        assert!(registry.get("embeddings.LayerNorm.weight").is_some());
        assert!(registry.get("entity_embeddings.LayerNorm.bias").is_some());
        assert!(registry.get("encoder.layer.0.attention.output.LayerNorm.weight").is_some());
        assert!(registry.get("pooler.dense.bias").is_some());
        assert!(registry.paths().all(|p| !p.contains("gamma") && !p.contains("layer_norm")));
    }

    #[test]
    fn test_reader_paths_sit_at_top_level() {
        let device = Default::default();
        let reader = tiny_config().init_reader::<TB>(&device).unwrap();
        let registry = reader.registry();
        assert!(registry.get("embeddings.word_embeddings.weight").is_some());
        assert!(registry.get("qa_outputs.weight").is_some());
        assert!(registry.paths().all(|p| !p.starts_with("model.")));
    }

    #[test]
    fn test_end_to_end_registry_includes_linking_stack() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let registry = model.registry();
        assert_eq!(
            registry.get("mask_entity_embeddings.entity_embeddings.weight").unwrap().shape,
            vec![2, 8]
        );
        assert!(registry.get("el_encoder.layer.0.output.dense.weight").is_some());
        assert!(registry.get("el_encoder.layer.1.output.dense.weight").is_none());
        assert_eq!(registry.get("entity_selector.bias.weight").unwrap().shape, vec![100, 1]);
        assert!(registry.get("entity_selector.transform.LayerNorm.weight").is_some());
    }

    #[test]
    fn test_state_round_trip_reproduces_outputs() {
        let device = Default::default();
        let source = tiny_config().init_entity_model::<TB>(&device).unwrap();
        let target = tiny_config().init_entity_model::<TB>(&device).unwrap();

        let state = source.state_dict().unwrap();
        let (target, report) = target.load_state_dict(&state, KeyPolicy::Strict).unwrap();
        assert!(report.missing.is_empty());
        assert_eq!(report.loaded, source.registry().entries.len());
        assert_eq!(target.state_dict().unwrap(), state);

        let (words, entities) = sample_inputs(&device);
        let a = source.forward(words.clone(), entities.clone()).unwrap();
        let b = target.forward(words, entities).unwrap();
        assert_eq!(a.word_hidden.into_data(), b.word_hidden.into_data());
        assert_eq!(a.pooled.into_data(), b.pooled.into_data());
    }

    #[test]
    fn test_linear_weights_are_stored_out_by_in() {
        let device = Default::default();
        let reader = tiny_config().init_reader::<TB>(&device).unwrap();
        let state  = reader.state_dict().unwrap();

        let stored = state.get("qa_outputs.weight").unwrap();
        assert_eq!(stored.shape, vec![2, 8]);

        // burn keeps [8, 2]; stored row 1 is burn column 1
        let burn_weight = values(reader.qa_outputs.weight.val());
        let column: Vec<f32> = (0..8).map(|i| burn_weight[i * 2 + 1]).collect();
        assert_eq!(&stored.values[8..16], column.as_slice());
    }

    #[test]
    fn test_bert_checkpoint_adaptation() {
        let device = Default::default();
        let source = tiny_config().init_entity_model::<TB>(&device).unwrap();

        // plain BERT: word side only, old LayerNorm names, `bert.` prefix
        let mut bert = StateDict::default();
        for (path, tensor) in source.state_dict().unwrap().tensors {
            if path.starts_with("entity_embeddings") {
                continue;
            }
            let path = path
                .replace("LayerNorm.weight", "LayerNorm.gamma")
                .replace("LayerNorm.bias", "LayerNorm.beta");
            bert.insert(format!("bert.{path}"), tensor);
        }
        bert.insert(
            "cls.predictions.bias",
            ParamTensor::new("cls.predictions.bias", vec![30], vec![0.0; 30]).unwrap(),
        );

        let target = tiny_config().init_entity_model::<TB>(&device).unwrap();
        let entity_before = values(target.entity_embeddings.entity_embeddings.weight.val());

        let (target, report) = target.load_bert_weights(bert).unwrap();
        assert_eq!(report.missing.len(), 5);
        assert!(report.missing.iter().all(|p| p.starts_with("entity_embeddings.")));
        assert_eq!(report.unexpected, vec!["cls.predictions.bias".to_string()]);

        assert_eq!(
            values(target.entity_embeddings.entity_embeddings.weight.val()),
            entity_before
        );
        assert_eq!(
            values(target.embeddings.word_embeddings.weight.val()),
            values(source.embeddings.word_embeddings.weight.val())
        );
    }

    #[test]
    fn test_shape_mismatch_names_path_and_fails() {
        let device = Default::default();
        let model  = tiny_config().init_entity_model::<TB>(&device).unwrap();

        let mut state = StateDict::default();
        state.insert(
            "pooler.dense.bias",
            ParamTensor::new("pooler.dense.bias", vec![7], vec![0.0; 7]).unwrap(),
        );
        match model.load_state_dict(&state, KeyPolicy::Lenient) {
            Err(ModelError::ShapeMismatch { path, checkpoint, expected }) => {
                assert_eq!(path, "pooler.dense.bias");
                assert_eq!(checkpoint, vec![7]);
                assert_eq!(expected, vec![8]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_policy_rejects_missing_keys() {
        let device = Default::default();
        let model  = tiny_config().init_entity_model::<TB>(&device).unwrap();
        let result = model.load_state_dict(&StateDict::default(), KeyPolicy::Strict);
        assert!(matches!(result, Err(ModelError::MissingKeys(_))));
    }

    #[test]
    fn test_param_tensor_rejects_wrong_value_count() {
        assert!(matches!(
            ParamTensor::new("x", vec![2, 3], vec![0.0; 5]),
            Err(ModelError::CorruptTensor { expected: 6, actual: 5, .. })
        ));
    }

    #[test]
    fn test_frozen_table_stays_frozen_after_load() {
        use burn::backend::{Autodiff, NdArray};
        type AB = Autodiff<NdArray<f32>>;

        let device = Default::default();
        let mut model = tiny_config().init_entity_model::<AB>(&device).unwrap();
        let state = model.state_dict().unwrap();
        model.entity_embeddings.entity_embeddings =
            model.entity_embeddings.entity_embeddings.no_grad();

        let (model, _) = model.load_state_dict(&state, KeyPolicy::Strict).unwrap();
        assert!(!model.entity_embeddings.entity_embeddings.weight.is_require_grad());
        assert!(model.embeddings.word_embeddings.weight.is_require_grad());
    }
}
