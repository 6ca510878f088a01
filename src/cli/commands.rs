// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `init`, `predict` and `inspect`
// and all their configurable flags.
//
// clap's derive macros generate help text, error messages for
// missing args and type conversion (string → usize, f64, ...).
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{
    init_use_case::{InitConfig, ModelVariant},
    predict_use_case::PredictConfig,
};
use crate::ml::config::EntityModelConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a fresh checkpoint, optionally starting from BERT weights
    Init(InitArgs),

    /// Score answer spans for a JSON Lines feature file
    Predict(PredictArgs),

    /// List the parameters stored in a checkpoint
    Inspect(InspectArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum VariantArg {
    /// Entity model + span-prediction head
    Reader,
    /// Two-stage model with the entity selector
    EndToEnd,
}

impl From<VariantArg> for ModelVariant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Reader   => ModelVariant::Reader,
            VariantArg::EndToEnd => ModelVariant::EndToEnd,
        }
    }
}

/// All arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to write model.safetensors and config.json into
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = VariantArg::Reader)]
    pub variant: VariantArg,

    /// Plain BERT .safetensors checkpoint to adapt
    #[arg(long)]
    pub bert_weights: Option<PathBuf>,

    /// Backend RNG seed used for weight initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,

    /// Size of the knowledge-base entity vocabulary
    #[arg(long, default_value_t = 500_000)]
    pub entity_vocab_size: usize,

    #[arg(long, default_value_t = 768)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 12)]
    pub num_hidden_layers: usize,

    /// hidden_size must be divisible by this
    #[arg(long, default_value_t = 12)]
    pub num_attention_heads: usize,

    #[arg(long, default_value_t = 3072)]
    pub intermediate_size: usize,

    #[arg(long, default_value_t = 512)]
    pub max_position_embeddings: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Depth of the entity-linking encoder (end-to-end variant)
    #[arg(long, default_value_t = 3)]
    pub num_el_hidden_layers: usize,

    /// Entity-selector logits are divided by this before the softmax
    #[arg(long, default_value_t = 1.0)]
    pub entity_selector_softmax_temp: f64,

    /// Keep the entity-identity table out of gradient updates
    #[arg(long)]
    pub freeze_entity_embeddings: bool,
}

impl From<&InitArgs> for EntityModelConfig {
    fn from(a: &InitArgs) -> Self {
        EntityModelConfig::new(a.vocab_size, a.entity_vocab_size)
            .with_hidden_size(a.hidden_size)
            .with_num_hidden_layers(a.num_hidden_layers)
            .with_num_attention_heads(a.num_attention_heads)
            .with_intermediate_size(a.intermediate_size)
            .with_max_position_embeddings(a.max_position_embeddings)
            .with_hidden_dropout_prob(a.dropout)
            .with_attention_probs_dropout_prob(a.dropout)
            .with_num_el_hidden_layers(a.num_el_hidden_layers)
            .with_entity_selector_softmax_temp(a.entity_selector_softmax_temp)
            .with_freeze_entity_embeddings(a.freeze_entity_embeddings)
    }
}

/// Convert CLI InitArgs into the application-layer InitConfig.
/// The application layer never sees clap types.
impl From<InitArgs> for InitConfig {
    fn from(a: InitArgs) -> Self {
        InitConfig {
            model:          EntityModelConfig::from(&a),
            checkpoint_dir: a.checkpoint_dir,
            variant:        a.variant.into(),
            bert_weights:   a.bert_weights,
            seed:           a.seed,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// JSON Lines file, one reading feature per line
    #[arg(long)]
    pub features: PathBuf,

    /// Directory written by `init`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Where to write the raw span results (JSON Lines)
    #[arg(long, default_value = "results.jsonl")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Word id used to pad word sequences
    #[arg(long, default_value_t = 0)]
    pub pad_token_id: i64,

    /// Entity slots beyond this are dropped
    #[arg(long, default_value_t = 128)]
    pub max_entity_length: usize,

    /// Mask out every entity slot
    #[arg(long)]
    pub no_entity: bool,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig {
            features_path:     a.features,
            checkpoint_dir:    a.checkpoint_dir,
            output_path:       a.output,
            batch_size:        a.batch_size,
            pad_token_id:      a.pad_token_id,
            max_entity_length: a.max_entity_length,
            no_entity:         a.no_entity,
        }
    }
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Model variant the checkpoint should hold
    #[arg(long, value_enum, default_value_t = VariantArg::Reader)]
    pub variant: VariantArg,
}
