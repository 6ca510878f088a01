// ============================================================
// Layer 5 — Reading-Comprehension Head
// ============================================================
// Entity-aware encoder + one Linear(hidden → 2) over word reps.
// Entity reps are computed but not read by the head; they shape
// the word reps through attention.
//
// Loss = (CE_start + CE_end) / 2, where gold positions are first
// clamped to [0, W] and position W means "ignore this example".

use burn::{
    nn::Linear,
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::ml::{
    config::EntityModelConfig,
    error::ModelError,
    init,
    model::{EntityInput, EntityModel, WordInput},
};

#[derive(Module, Debug)]
pub struct ReadingComprehensionModel<B: Backend> {
    /// Checkpoint paths of the wrapped model sit at the top level.
    pub model:      EntityModel<B>,
    pub qa_outputs: Linear<B>,
}

#[derive(Debug)]
pub struct ReaderOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl EntityModelConfig {
    pub fn init_reader<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<ReadingComprehensionModel<B>, ModelError> {
        Ok(ReadingComprehensionModel {
            model:      self.init_entity_model(device)?,
            qa_outputs: init::linear(self.hidden_size, 2, self.initializer_range, device),
        })
    }
}

impl<B: Backend> ReadingComprehensionModel<B> {
    /// → start_logits, end_logits: [batch, W]
    pub fn forward(
        &self,
        words:    WordInput<B>,
        entities: EntityInput<B>,
    ) -> Result<ReaderOutput<B>, ModelError> {
        let hidden = self.model.forward(words, entities)?.word_hidden;
        let [batch_size, seq_len, _] = hidden.dims();

        let logits = self.qa_outputs.forward(hidden); // [batch, W, 2]
        let start_logits = logits
            .clone()
            .slice([0..batch_size, 0..seq_len, 0..1])
            .reshape([batch_size, seq_len]);
        let end_logits = logits
            .slice([0..batch_size, 0..seq_len, 1..2])
            .reshape([batch_size, seq_len]);

        Ok(ReaderOutput { start_logits, end_logits })
    }

    pub fn forward_loss(
        &self,
        words:           WordInput<B>,
        entities:        EntityInput<B>,
        start_positions: Tensor<B, 1, Int>,
        end_positions:   Tensor<B, 1, Int>,
    ) -> Result<(Tensor<B, 1>, ReaderOutput<B>), ModelError> {
        let output = self.forward(words, entities)?;
        let loss = (span_cross_entropy(output.start_logits.clone(), start_positions)
                  + span_cross_entropy(output.end_logits.clone(), end_positions)) / 2.0_f64;
        Ok((loss, output))
    }
}

/// Mean cross-entropy over examples whose target is a real position.
///
/// logits: [batch, W], targets: [batch]. Targets outside [0, W] are
/// clamped first; target W is ignored. A batch with every target
/// ignored yields zero.
pub fn span_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch_size, seq_len] = logits.dims();
    let ignored = seq_len as i64;

    let targets = targets.clamp(0, ignored);
    let valid   = targets.clone().lower_elem(ignored).float();
    let index   = targets.clamp_max(ignored - 1).reshape([batch_size, 1]);

    let picked = log_softmax(logits, 1).gather(1, index).reshape([batch_size]);
    let total  = (picked.neg() * valid.clone()).sum();
    total / valid.sum().clamp_min(1.0)
}
