// ============================================================
// Layer 5 — Entity Selector
// ============================================================
// Scores each candidate entity of a mention slot against the
// slot's hidden state:
//
//   score(m, c) = <transform(h_m), E[cand_c]> + bias[cand_c]
//               + (cand_c == 0 ? -10000 : 0)
//
// E is the identity table of the model's EntityEmbeddings; the
// selector borrows it at call time instead of owning a copy, so
// the scoring weights and the input embeddings are one parameter
// and receive one gradient.

use burn::{
    nn::Embedding,
    prelude::*,
};

use crate::ml::{
    config::{EntityModelConfig, MASKED_SCORE, PADDING_ENTITY_ID},
    encoder::HeadTransform,
    init,
};

#[derive(Module, Debug)]
pub struct EntitySelector<B: Backend> {
    pub transform: HeadTransform<B>,
    /// One scalar per entity, zero at start.
    pub bias:      Embedding<B>,
}

impl<B: Backend> EntitySelector<B> {
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            transform: HeadTransform::new(cfg, device),
            bias:      init::embedding(cfg.entity_vocab_size, 1, cfg.initializer_range, device),
        }
    }

    /// hidden: [batch, M, hidden], candidate_ids: [batch, M, C]
    /// → raw candidate scores [batch, M, C]
    pub fn forward(
        &self,
        hidden:        Tensor<B, 3>,
        candidate_ids: Tensor<B, 3, Int>,
        entity_table:  &Embedding<B>,
    ) -> Tensor<B, 3> {
        let [batch_size, num_slots, num_candidates] = candidate_ids.dims();
        let flat_ids = candidate_ids.clone().reshape([batch_size, num_slots * num_candidates]);

        let query = self.transform.forward(hidden).unsqueeze_dim::<4>(2); // [b, M, 1, H]
        let keys  = entity_table.forward(flat_ids.clone());
        let hidden_size = keys.dims()[2];
        let keys = keys.reshape([batch_size, num_slots, num_candidates, hidden_size]);

        let dot  = (keys * query).sum_dim(3).squeeze_dim::<3>(3);
        let bias = self
            .bias
            .forward(flat_ids)
            .reshape([batch_size, num_slots, num_candidates]);
        let padding = candidate_ids
            .equal_elem(PADDING_ENTITY_ID)
            .float()
            .mul_scalar(MASKED_SCORE);

        dot + bias + padding
    }
}
