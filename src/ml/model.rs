// ============================================================
// Layer 5 — Entity-Aware Encoder
// ============================================================
// Words and entities are embedded separately, concatenated along
// the sequence axis and run through one transformer stack:
//
//   [ w_0 .. w_{W-1} | e_0 .. e_{E-1} ]  →  N × BertLayer
//                    ↓ split at W
//   word reps [B, W, H]   entity reps [B, E, H]   pooled [B, H]
//
// Both the standard and the end-to-end model finish with the same
// joint pass, so it lives here as `JointStack::run`.

use burn::prelude::*;

use crate::ml::{
    config::EntityModelConfig,
    embeddings::{validate_position_ids, EntityEmbeddings, WordEmbeddings},
    encoder::{Encoder, Pooler},
    error::ModelError,
    mask::extended_attention_mask,
};

// ─── Inputs / Outputs ─────────────────────────────────────────────────────────
/// Word-side tensors, all [batch, W].
#[derive(Clone, Debug)]
pub struct WordInput<B: Backend> {
    pub word_ids:       Tensor<B, 2, Int>,
    pub segment_ids:    Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
}

/// Entity-side tensors. `position_ids` is [batch, E, P] padded with -1,
/// everything else [batch, E].
#[derive(Clone, Debug)]
pub struct EntityInput<B: Backend> {
    pub entity_ids:     Tensor<B, 2, Int>,
    pub position_ids:   Tensor<B, 3, Int>,
    pub segment_ids:    Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
}

#[derive(Debug)]
pub struct EntityModelOutput<B: Backend> {
    pub word_hidden:   Tensor<B, 3>,
    pub entity_hidden: Tensor<B, 3>,
    pub pooled:        Tensor<B, 2>,
    /// Temperature-scaled candidate scores [batch, M, C] (end-to-end only).
    pub selector_scores: Option<Tensor<B, 3>>,
    /// Joint-sequence states, embedding output first.
    pub hidden_states: Option<Vec<Tensor<B, 3>>>,
    pub attentions:    Option<Vec<Tensor<B, 4>>>,
}

// ─── Shared joint pass ────────────────────────────────────────────────────────
pub(crate) struct JointStack<'a, B: Backend> {
    pub encoder:            &'a Encoder<B>,
    pub pooler:             &'a Pooler<B>,
    pub keep_hidden_states: bool,
    pub keep_attentions:    bool,
}

impl<B: Backend> JointStack<'_, B> {
    pub fn run(
        &self,
        word_embeddings:       Tensor<B, 3>,
        entity_embeddings:     Tensor<B, 3>,
        word_attention_mask:   Tensor<B, 2, Int>,
        entity_attention_mask: Tensor<B, 2, Int>,
    ) -> EntityModelOutput<B> {
        let [batch_size, num_words, hidden] = word_embeddings.dims();
        let num_entities = entity_embeddings.dims()[1];

        let joint = Tensor::cat(vec![word_embeddings, entity_embeddings], 1);
        let bias  = extended_attention_mask(word_attention_mask, entity_attention_mask);
        let out   = self.encoder.forward(joint, bias, self.keep_hidden_states, self.keep_attentions);

        let total = num_words + num_entities;
        let word_hidden = out
            .last_hidden_state
            .clone()
            .slice([0..batch_size, 0..num_words, 0..hidden]);
        let entity_hidden = out
            .last_hidden_state
            .slice([0..batch_size, num_words..total, 0..hidden]);
        let pooled = self.pooler.forward(word_hidden.clone());

        EntityModelOutput {
            word_hidden,
            entity_hidden,
            pooled,
            selector_scores: None,
            hidden_states:   out.hidden_states,
            attentions:      out.attentions,
        }
    }
}

/// Input checks shared by both model variants. Entity-side ids are
/// checked by the caller, since their shape differs per variant.
pub(crate) fn check_inputs<B: Backend>(
    embeddings:    &WordEmbeddings<B>,
    words:         &WordInput<B>,
    position_ids:  &Tensor<B, 3, Int>,
    max_positions: usize,
) -> Result<(), ModelError> {
    let len = words.word_ids.dims()[1];
    if len == 0 {
        return Err(ModelError::EmptySequence);
    }
    if len > max_positions {
        return Err(ModelError::SequenceTooLong { len, max_positions });
    }
    embeddings.check_ids(&words.word_ids, &words.segment_ids)?;
    validate_position_ids(position_ids, max_positions)
}

// ─── EntityModel ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EntityModel<B: Backend> {
    pub embeddings:        WordEmbeddings<B>,
    pub entity_embeddings: EntityEmbeddings<B>,
    pub encoder:           Encoder<B>,
    pub pooler:            Pooler<B>,
    pub max_position_embeddings: usize,
    pub output_hidden_states:    bool,
    pub output_attentions:       bool,
}

impl EntityModelConfig {
    /// Build a freshly initialised standard model.
    pub fn init_entity_model<B: Backend>(&self, device: &B::Device) -> Result<EntityModel<B>, ModelError> {
        self.validate()?;
        Ok(EntityModel {
            embeddings:        WordEmbeddings::new(self, device),
            entity_embeddings: EntityEmbeddings::new(self, device),
            encoder:           Encoder::new(self.num_hidden_layers, self, device),
            pooler:            Pooler::new(self, device),
            max_position_embeddings: self.max_position_embeddings,
            output_hidden_states:    self.output_hidden_states,
            output_attentions:       self.output_attentions,
        })
    }
}

impl<B: Backend> EntityModel<B> {
    pub fn forward(
        &self,
        words:    WordInput<B>,
        entities: EntityInput<B>,
    ) -> Result<EntityModelOutput<B>, ModelError> {
        check_inputs(&self.embeddings, &words, &entities.position_ids, self.max_position_embeddings)?;
        self.entity_embeddings.check_ids(&entities.entity_ids, &entities.segment_ids)?;

        let word_embeddings = self.embeddings.forward(words.word_ids, words.segment_ids);
        let entity_embeddings = self.entity_embeddings.forward(
            entities.entity_ids,
            entities.position_ids,
            entities.segment_ids,
        );

        let stack = JointStack {
            encoder:            &self.encoder,
            pooler:             &self.pooler,
            keep_hidden_states: self.output_hidden_states,
            keep_attentions:    self.output_attentions,
        };
        Ok(stack.run(
            word_embeddings,
            entity_embeddings,
            words.attention_mask,
            entities.attention_mask,
        ))
    }
}
