// ============================================================
// Layer 5 — Attention Mask Builder
// ============================================================
// Word and entity slots share one attention sequence, so their
// masks are concatenated in the same order as the embeddings
// and turned into an additive bias:
//
//   bias = (1 - mask) * -10000        shape [batch, 1, 1, W + E]
//
// Real slots add 0; padded slots push their score so low that
// softmax gives them ~0 probability.

use burn::prelude::*;

use crate::ml::config::MASKED_SCORE;

/// Build the additive attention bias for a word+entity sequence.
pub fn extended_attention_mask<B: Backend>(
    word_attention_mask:   Tensor<B, 2, Int>,
    entity_attention_mask: Tensor<B, 2, Int>,
) -> Tensor<B, 4> {
    let mask = Tensor::cat(vec![word_attention_mask, entity_attention_mask], 1).float();
    let [batch_size, seq_len] = mask.dims();
    mask.neg()
        .add_scalar(1.0)
        .mul_scalar(MASKED_SCORE)
        .reshape([batch_size, 1, 1, seq_len])
}
