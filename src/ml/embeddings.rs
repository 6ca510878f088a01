// ============================================================
// Layer 5 — Word and Entity Embeddings
// ============================================================
// WordEmbeddings is the usual BERT input layer:
//   word + absolute position + token type → LayerNorm → dropout
//
// EntityEmbeddings turns a knowledge-base entity that spans
// several word pieces into one vector:
//
//   identity(entity_id)
// + masked mean of position(p) over the entity's real positions
// + token_type(segment_id)
//   → LayerNorm → dropout
//
// Position lists are padded with -1. Padded slots are clamped
// to index 0 only so the lookup stays in range; the 0/1 mask
// removes them from the sum, and the count carries a tiny
// epsilon so an entity with no real positions gets a zero
// position term instead of NaN.

use burn::{
    nn::{Dropout, DropoutConfig, Embedding, LayerNorm},
    prelude::*,
};

use crate::ml::{
    config::{EntityModelConfig, NO_POSITION},
    error::ModelError,
    init,
};

/// Added to the real-position count before dividing.
const SPAN_EPS: f64 = 1e-12;

// ─── WordEmbeddings ───────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct WordEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> WordEmbeddings<B> {
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        let std = cfg.initializer_range;
        Self {
            word_embeddings:       init::padded_embedding(cfg.vocab_size, cfg.hidden_size, std, device),
            position_embeddings:   init::embedding(cfg.max_position_embeddings, cfg.hidden_size, std, device),
            token_type_embeddings: init::embedding(cfg.type_vocab_size, cfg.hidden_size, std, device),
            layer_norm:            init::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, device),
            dropout:               DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    /// Reject ids outside the word and token-type tables.
    pub fn check_ids(
        &self,
        word_ids:    &Tensor<B, 2, Int>,
        segment_ids: &Tensor<B, 2, Int>,
    ) -> Result<(), ModelError> {
        validate_ids(word_ids, "word id", table_rows(&self.word_embeddings))?;
        validate_ids(segment_ids, "word segment id", table_rows(&self.token_type_embeddings))
    }

    /// word_ids, segment_ids: [batch, W] → [batch, W, hidden]
    pub fn forward(&self, word_ids: Tensor<B, 2, Int>, segment_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = word_ids.dims();
        let device = word_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let embeddings = self.word_embeddings.forward(word_ids)
            + self.position_embeddings.forward(positions)
            + self.token_type_embeddings.forward(segment_ids);
        self.dropout.forward(self.layer_norm.forward(embeddings))
    }
}

// ─── EntityEmbeddings ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EntityEmbeddings<B: Backend> {
    /// Identity table; row 0 (padding) starts as the zero vector.
    /// The end-to-end selector reads this same table.
    pub entity_embeddings:     Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> EntityEmbeddings<B> {
    /// Table over the full entity vocabulary.
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        let mut table = Self::with_vocab(cfg, cfg.entity_vocab_size, device);
        if cfg.freeze_entity_embeddings {
            table.entity_embeddings = table.entity_embeddings.no_grad();
        }
        table
    }

    /// Table over an explicit vocabulary, e.g. the 2-row masked-entity table.
    pub fn with_vocab(cfg: &EntityModelConfig, entity_vocab_size: usize, device: &B::Device) -> Self {
        let std = cfg.initializer_range;
        Self {
            entity_embeddings:     init::padded_embedding(entity_vocab_size, cfg.hidden_size, std, device),
            position_embeddings:   init::embedding(cfg.max_position_embeddings, cfg.hidden_size, std, device),
            token_type_embeddings: init::embedding(cfg.type_vocab_size, cfg.hidden_size, std, device),
            layer_norm:            init::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, device),
            dropout:               DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    /// Reject ids outside the identity and token-type tables. `entity_ids`
    /// may be [batch, E] or a candidate tensor [batch, M, C].
    pub fn check_ids<const D: usize>(
        &self,
        entity_ids:  &Tensor<B, D, Int>,
        segment_ids: &Tensor<B, 2, Int>,
    ) -> Result<(), ModelError> {
        validate_ids(entity_ids, "entity id", table_rows(&self.entity_embeddings))?;
        validate_ids(segment_ids, "entity segment id", table_rows(&self.token_type_embeddings))
    }

    /// entity_ids: [batch, E], position_ids: [batch, E, P], segment_ids: [batch, E]
    /// → [batch, E, hidden]
    pub fn forward(
        &self,
        entity_ids:   Tensor<B, 2, Int>,
        position_ids: Tensor<B, 3, Int>,
        segment_ids:  Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let embeddings = self.entity_embeddings.forward(entity_ids)
            + self.span_position_embedding(position_ids)
            + self.token_type_embeddings.forward(segment_ids);
        self.dropout.forward(self.layer_norm.forward(embeddings))
    }

    /// One embedding per candidate of every mention slot.
    ///
    /// candidate_ids: [batch, M, C], position_ids: [batch, M, P], segment_ids: [batch, M]
    /// → [batch, M, C, hidden]. Position and segment terms are shared by
    /// all candidates of a slot.
    pub fn forward_candidates(
        &self,
        candidate_ids: Tensor<B, 3, Int>,
        position_ids:  Tensor<B, 3, Int>,
        segment_ids:   Tensor<B, 2, Int>,
    ) -> Tensor<B, 4> {
        let [batch_size, num_slots, num_candidates] = candidate_ids.dims();
        let identity = self
            .entity_embeddings
            .forward(candidate_ids.reshape([batch_size, num_slots * num_candidates]));
        let hidden = identity.dims()[2];
        let identity = identity.reshape([batch_size, num_slots, num_candidates, hidden]);

        let shared = self.span_position_embedding(position_ids)
            + self.token_type_embeddings.forward(segment_ids);
        let embeddings = identity + shared.unsqueeze_dim::<4>(2);
        self.dropout.forward(self.layer_norm.forward(embeddings))
    }

    /// Masked mean of position embeddings over each entity's span.
    /// [batch, E, P] → [batch, E, hidden]
    pub fn span_position_embedding(&self, position_ids: Tensor<B, 3, Int>) -> Tensor<B, 3> {
        let [batch_size, num_slots, max_span] = position_ids.dims();

        let real = position_ids
            .clone()
            .not_equal_elem(NO_POSITION)
            .float()
            .unsqueeze_dim::<4>(3); // [batch, E, P, 1]

        let looked_up = self
            .position_embeddings
            .forward(position_ids.clamp_min(0).reshape([batch_size, num_slots * max_span]));
        let hidden = looked_up.dims()[2];
        let looked_up = looked_up.reshape([batch_size, num_slots, max_span, hidden]);

        let summed = (looked_up * real.clone()).sum_dim(2); // [batch, E, 1, hidden]
        let count  = real.sum_dim(2);                       // [batch, E, 1, 1]
        (summed / count.add_scalar(SPAN_EPS)).squeeze_dim::<3>(2)
    }
}

/// Reject position ids that are neither -1 nor a valid table index.
fn table_rows<B: Backend>(table: &Embedding<B>) -> usize {
    table.weight.val().dims()[0]
}

/// Every id must index a row of a table with `limit` rows.
pub fn validate_ids<B: Backend, const D: usize>(
    ids:   &Tensor<B, D, Int>,
    kind:  &'static str,
    limit: usize,
) -> Result<(), ModelError> {
    let values = ids
        .to_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ModelError::TensorData(format!("{e:?}")))?;

    match values.into_iter().find(|&v| v < 0 || v >= limit as i64) {
        Some(value) => Err(ModelError::InvalidId { kind, value, limit }),
        None => Ok(()),
    }
}

pub fn validate_position_ids<B: Backend>(
    position_ids:  &Tensor<B, 3, Int>,
    max_positions: usize,
) -> Result<(), ModelError> {
    let values = position_ids
        .to_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ModelError::TensorData(format!("{e:?}")))?;

    match values
        .into_iter()
        .find(|&p| p < NO_POSITION || p >= max_positions as i64)
    {
        Some(value) => Err(ModelError::InvalidPositionId { value, max_positions }),
        None => Ok(()),
    }
}
