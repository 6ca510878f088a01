// ============================================================
// Layer 5 — Model Configuration
// ============================================================
// One flat hyperparameter bundle shared by every component.
// Fields that only the end-to-end variant reads (entity-linking
// depth, selector temperature) are simply ignored by the
// standard model.
//
// #[derive(Config)] generates `new(required..)`, `with_*`
// builders, Clone, serde support and `save`/`load` to JSON.

use burn::config::Config;

use crate::ml::error::ModelError;

/// Entity id reserved for padding slots and padding candidates.
pub const PADDING_ENTITY_ID: i64 = 0;

/// Entity id of the [MASK] entity used by denoising.
pub const MASK_ENTITY_ID: i64 = 2;

/// Position id marking "no such position" in entity spans.
pub const NO_POSITION: i64 = -1;

/// Additive penalty for masked attention slots and padding candidates.
pub const MASKED_SCORE: f64 = -10000.0;

#[derive(Config, Debug)]
pub struct EntityModelConfig {
    /// Word-piece vocabulary size
    pub vocab_size: usize,
    /// Knowledge-base entity vocabulary size (ids 0..=2 are special)
    pub entity_vocab_size: usize,
    #[config(default = 768)]
    pub hidden_size: usize,
    #[config(default = 12)]
    pub num_hidden_layers: usize,
    #[config(default = 12)]
    pub num_attention_heads: usize,
    #[config(default = 3072)]
    pub intermediate_size: usize,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
    #[config(default = 0.1)]
    pub attention_probs_dropout_prob: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
    #[config(default = 0.02)]
    pub initializer_range: f64,
    /// Depth of the entity-linking encoder (end-to-end variant)
    #[config(default = 3)]
    pub num_el_hidden_layers: usize,
    /// Entity-selector logits are divided by this before the softmax
    #[config(default = 1.0)]
    pub entity_selector_softmax_temp: f64,
    /// Build the entity-identity table with gradients disabled
    #[config(default = false)]
    pub freeze_entity_embeddings: bool,
    /// Return every layer's hidden states alongside the final output
    #[config(default = false)]
    pub output_hidden_states: bool,
    /// Return every layer's attention probabilities
    #[config(default = false)]
    pub output_attentions: bool,
}

impl EntityModelConfig {
    /// Reject combinations the encoder cannot be built with.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.hidden_size == 0 || self.num_attention_heads == 0 {
            return Err(ModelError::invalid_config(
                "hidden_size and num_attention_heads must be positive",
            ));
        }
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(ModelError::invalid_config(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.num_hidden_layers == 0 {
            return Err(ModelError::invalid_config("num_hidden_layers must be positive"));
        }
        if self.entity_selector_softmax_temp <= 0.0 {
            return Err(ModelError::invalid_config(format!(
                "entity_selector_softmax_temp must be positive, got {}",
                self.entity_selector_softmax_temp
            )));
        }
        // ids 0 (padding), 1 (unknown) and 2 ([MASK]) must exist
        if self.entity_vocab_size <= MASK_ENTITY_ID as usize {
            return Err(ModelError::invalid_config(format!(
                "entity_vocab_size must exceed {}, got {}",
                MASK_ENTITY_ID, self.entity_vocab_size
            )));
        }
        for (name, p) in [
            ("hidden_dropout_prob", self.hidden_dropout_prob),
            ("attention_probs_dropout_prob", self.attention_probs_dropout_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ModelError::invalid_config(format!(
                    "{name} must lie in [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bert_base() {
        let cfg = EntityModelConfig::new(30522, 500_000);
        assert_eq!(cfg.hidden_size, 768);
        assert_eq!(cfg.head_dim(), 64);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let cfg = EntityModelConfig::new(100, 10)
            .with_hidden_size(30)
            .with_num_attention_heads(4);
        assert!(matches!(cfg.validate(), Err(ModelError::InvalidConfig(_))));
    }

    #[test]
    fn test_non_positive_temperature_rejected() {
        let cfg = EntityModelConfig::new(100, 10).with_entity_selector_softmax_temp(0.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_entity_vocab_must_hold_special_ids() {
        let cfg = EntityModelConfig::new(100, 2);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = EntityModelConfig::new(100, 20)
            .with_hidden_size(32)
            .with_num_el_hidden_layers(1);
        cfg.save(&path).unwrap();

        let loaded = EntityModelConfig::load(&path).unwrap();
        assert_eq!(loaded.hidden_size, 32);
        assert_eq!(loaded.num_el_hidden_layers, 1);
        assert_eq!(loaded.entity_vocab_size, 20);
    }
}
