// ============================================================
// Layer 5 — End-to-End Entity Model
// ============================================================
// Entities are not given; each mention slot carries a list of
// candidate ids and the model picks among them itself:
//
//   1. linking pass
//        words + [MASK]-style slot embeddings
//        → shallow encoder (num_el_hidden_layers)
//        → selector scores / temperature → softmax over candidates
//   2. soft mixing
//        slot embedding = Σ_c p(c) · candidate_embedding(c)
//   3. optional denoising
//        slots with a label ≠ -1 use the [MASK] entity instead
//   4. main pass, identical to the standard model
//
// The selector scores against `entity_embeddings.entity_embeddings`,
// the same table the candidate embeddings are read from.

use burn::{prelude::*, tensor::activation::softmax};

use crate::ml::{
    config::{EntityModelConfig, MASK_ENTITY_ID},
    embeddings::{EntityEmbeddings, WordEmbeddings},
    encoder::{Encoder, Pooler},
    error::ModelError,
    mask::extended_attention_mask,
    model::{check_inputs, EntityModelOutput, JointStack, WordInput},
    selector::EntitySelector,
};

/// Denoising label of a slot that keeps its mixed embedding.
const UNMASKED_LABEL: i64 = -1;

/// Mention-slot tensors for the end-to-end model.
#[derive(Clone, Debug)]
pub struct CandidateInput<B: Backend> {
    /// [batch, M, C], 0 = padding candidate
    pub candidate_ids:  Tensor<B, 3, Int>,
    /// [batch, M, P], padded with -1
    pub position_ids:   Tensor<B, 3, Int>,
    pub segment_ids:    Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    /// [batch, M]; -1 keeps the mixed embedding, anything else masks the slot
    pub masked_entity_labels: Option<Tensor<B, 2, Int>>,
}

#[derive(Module, Debug)]
pub struct EndToEndEntityModel<B: Backend> {
    pub embeddings:             WordEmbeddings<B>,
    pub entity_embeddings:      EntityEmbeddings<B>,
    pub encoder:                Encoder<B>,
    pub pooler:                 Pooler<B>,
    /// Two rows: 0 for padding slots, 1 for real slots
    pub mask_entity_embeddings: EntityEmbeddings<B>,
    pub el_encoder:             Encoder<B>,
    pub entity_selector:        EntitySelector<B>,
    pub softmax_temp:            f64,
    pub max_position_embeddings: usize,
    pub output_hidden_states:    bool,
    pub output_attentions:       bool,
}

impl EntityModelConfig {
    pub fn init_end_to_end_model<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<EndToEndEntityModel<B>, ModelError> {
        self.validate()?;
        if self.num_el_hidden_layers == 0 {
            return Err(ModelError::invalid_config("num_el_hidden_layers must be positive"));
        }
        Ok(EndToEndEntityModel {
            embeddings:             WordEmbeddings::new(self, device),
            entity_embeddings:      EntityEmbeddings::new(self, device),
            encoder:                Encoder::new(self.num_hidden_layers, self, device),
            pooler:                 Pooler::new(self, device),
            mask_entity_embeddings: EntityEmbeddings::with_vocab(self, 2, device),
            el_encoder:             Encoder::new(self.num_el_hidden_layers, self, device),
            entity_selector:        EntitySelector::new(self, device),
            softmax_temp:            self.entity_selector_softmax_temp,
            max_position_embeddings: self.max_position_embeddings,
            output_hidden_states:    self.output_hidden_states,
            output_attentions:       self.output_attentions,
        })
    }
}

impl<B: Backend> EndToEndEntityModel<B> {
    /// Run linking, mixing and the main pass. With `output_selector_scores`
    /// the temperature-scaled candidate scores are returned too.
    pub fn forward(
        &self,
        words:                  WordInput<B>,
        slots:                  CandidateInput<B>,
        output_selector_scores: bool,
    ) -> Result<EntityModelOutput<B>, ModelError> {
        check_inputs(&self.embeddings, &words, &slots.position_ids, self.max_position_embeddings)?;
        self.entity_embeddings.check_ids(&slots.candidate_ids, &slots.segment_ids)?;
        self.mask_entity_embeddings.check_ids(&slots.attention_mask, &slots.segment_ids)?;
        let word_embeddings = self.embeddings.forward(words.word_ids, words.segment_ids);

        // ── 1. linking pass ──
        let scores = self.selector_scores(
            word_embeddings.clone(),
            words.attention_mask.clone(),
            &slots,
        );
        let probs = softmax(scores.clone(), 2);

        // ── 2. soft mixing ──
        let candidates = self.entity_embeddings.forward_candidates(
            slots.candidate_ids,
            slots.position_ids.clone(),
            slots.segment_ids.clone(),
        ); // [b, M, C, H]
        let mixed = (candidates * probs.unsqueeze_dim::<4>(3))
            .sum_dim(2)
            .squeeze_dim::<3>(2);

        // ── 3. denoising ──
        let entity_embeddings = match slots.masked_entity_labels {
            Some(labels) => self.mask_labelled_slots(mixed, labels, slots.position_ids, slots.segment_ids),
            None => mixed,
        };

        // ── 4. main pass ──
        let stack = JointStack {
            encoder:            &self.encoder,
            pooler:             &self.pooler,
            keep_hidden_states: self.output_hidden_states,
            keep_attentions:    self.output_attentions,
        };
        let mut out = stack.run(
            word_embeddings,
            entity_embeddings,
            words.attention_mask,
            slots.attention_mask,
        );
        if output_selector_scores {
            out.selector_scores = Some(scores);
        }
        Ok(out)
    }

    /// Shallow-encoder pass scoring every candidate; already divided by
    /// the temperature. [batch, M, C]
    fn selector_scores(
        &self,
        word_embeddings:     Tensor<B, 3>,
        word_attention_mask: Tensor<B, 2, Int>,
        slots:               &CandidateInput<B>,
    ) -> Tensor<B, 3> {
        let [batch_size, num_words, hidden] = word_embeddings.dims();
        let num_slots = slots.candidate_ids.dims()[1];

        let slot_embeddings = self.mask_entity_embeddings.forward(
            slots.attention_mask.clone(),
            slots.position_ids.clone(),
            slots.segment_ids.clone(),
        );
        let joint = Tensor::cat(vec![word_embeddings, slot_embeddings], 1);
        let bias  = extended_attention_mask(word_attention_mask, slots.attention_mask.clone());
        let linked = self.el_encoder.forward(joint, bias, false, false).last_hidden_state;
        let slot_hidden = linked.slice([0..batch_size, num_words..num_words + num_slots, 0..hidden]);

        self.entity_selector
            .forward(
                slot_hidden,
                slots.candidate_ids.clone(),
                &self.entity_embeddings.entity_embeddings,
            )
            .div_scalar(self.softmax_temp)
    }

    /// Replace slots whose label is not -1 with the [MASK] entity embedding.
    fn mask_labelled_slots(
        &self,
        mixed:        Tensor<B, 3>,
        labels:       Tensor<B, 2, Int>,
        position_ids: Tensor<B, 3, Int>,
        segment_ids:  Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let mask_ids = labels.zeros_like().add_scalar(MASK_ENTITY_ID);
        let masked = self.entity_embeddings.forward(mask_ids, position_ids, segment_ids);

        let keep = labels.equal_elem(UNMASKED_LABEL).float().unsqueeze_dim::<3>(2); // [b, M, 1]
        mixed * keep.clone() + masked * keep.neg().add_scalar(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::{sample_inputs, tiny_config, TB};
    use burn::backend::{Autodiff, NdArray};

    fn values<const D: usize>(t: Tensor<TB, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    fn sample_slots(device: &<TB as Backend>::Device) -> CandidateInput<TB> {
        CandidateInput {
            candidate_ids:  Tensor::from_ints([[[57, 0, 0], [0, 0, 0]], [[7, 8, 0], [9, 0, 0]]], device),
            position_ids:   Tensor::from_ints([[[2, 3], [-1, -1]], [[1, -1], [2, 3]]], device),
            segment_ids:    Tensor::zeros([2, 2], device),
            attention_mask: Tensor::from_ints([[1, 0], [1, 1]], device),
            masked_entity_labels: None,
        }
    }

    #[test]
    fn test_single_real_candidate_takes_all_probability() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let (words, _) = sample_inputs(&device);

        let out = model.forward(words, sample_slots(&device), true).unwrap();
        let scores = out.selector_scores.unwrap();
        assert_eq!(scores.dims(), [2, 2, 3]);

        let p = values(softmax(scores, 2));
        assert!(p[0] > 0.99);
        assert!(p[1] < 1e-6 && p[2] < 1e-6);
        // example 1, slot 0: two real candidates share the mass
        assert!(p[8] < 1e-6);
        assert!((p[6] + p[7] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_unknown_candidate_id_is_rejected() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let (words, _) = sample_inputs(&device);
        let mut slots = sample_slots(&device);
        slots.candidate_ids = Tensor::from_ints([[[57, 0, 0], [0, 0, 0]], [[7, 8, 5000], [9, 0, 0]]], &device);

        assert!(matches!(
            model.forward(words, slots, false),
            Err(ModelError::InvalidId { kind: "entity id", value: 5000, limit: 100 })
        ));
    }

    #[test]
    fn test_slot_mask_outside_zero_one_is_rejected() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let (words, _) = sample_inputs(&device);
        let mut slots = sample_slots(&device);
        slots.attention_mask = Tensor::from_ints([[1, 0], [2, 1]], &device);

        assert!(matches!(
            model.forward(words, slots, false),
            Err(ModelError::InvalidId { value: 2, limit: 2, .. })
        ));
    }

    #[test]
    fn test_all_padding_slot_is_not_an_error() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let (words, _) = sample_inputs(&device);

        let out = model.forward(words, sample_slots(&device), true).unwrap();
        let p = values(softmax(out.selector_scores.unwrap(), 2));
        for v in &p[3..6] {
            assert!((v - 1.0 / 3.0).abs() < 1e-5);
        }
        assert!(values(out.entity_hidden).iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_scores_scale_with_temperature() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let mut hot = model.clone();
        hot.softmax_temp = 2.0;
        let (words, _) = sample_inputs(&device);

        let scores = |m: &EndToEndEntityModel<TB>, words: WordInput<TB>| {
            values(m.forward(words, sample_slots(&device), true).unwrap().selector_scores.unwrap())
        };
        let cold_scores = scores(&model, words.clone());
        let hot_scores  = scores(&hot, words);
        // example 1, slot 0, candidate 7
        assert!((cold_scores[6] - 2.0 * hot_scores[6]).abs() < 1e-4);
    }

    #[test]
    fn test_denoising_replaces_only_labelled_slots() {
        let device = Default::default();
        let model  = tiny_config().init_end_to_end_model::<TB>(&device).unwrap();
        let slots  = sample_slots(&device);
        let mixed  = Tensor::<TB, 3>::ones([2, 2, 8], &device);

        let labels = Tensor::<TB, 2, Int>::from_ints([[-1, 5], [-1, -1]], &device);
        let out = values(model.mask_labelled_slots(mixed, labels, slots.position_ids, slots.segment_ids));

        assert!(out[..8].iter().all(|&x| x == 1.0));
        assert!(out[8..16].iter().any(|&x| x != 1.0));
        assert!(out[16..].iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_shallow_encoder_depth_follows_config() {
        let device = Default::default();
        let model = tiny_config()
            .with_num_el_hidden_layers(1)
            .init_end_to_end_model::<TB>(&device)
            .unwrap();
        assert_eq!(model.el_encoder.layer.len(), 1);
        assert_eq!(model.encoder.layer.len(), 2);
    }

    #[test]
    fn test_tied_table_receives_gradient_from_selection() {
        type AB = Autodiff<NdArray<f32>>;
        let device = Default::default();
        let model = tiny_config()
            .with_hidden_dropout_prob(0.0)
            .with_attention_probs_dropout_prob(0.0)
            .init_end_to_end_model::<AB>(&device)
            .unwrap();

        let word_ids = Tensor::<AB, 2, Int>::from_ints([[1, 5, 6, 2]], &device);
        let words = WordInput {
            segment_ids:    word_ids.zeros_like(),
            attention_mask: word_ids.ones_like(),
            word_ids,
        };
        let slots = CandidateInput {
            candidate_ids:  Tensor::from_ints([[[7, 8, 0]]], &device),
            position_ids:   Tensor::from_ints([[[1, 2]]], &device),
            segment_ids:    Tensor::zeros([1, 1], &device),
            attention_mask: Tensor::ones([1, 1], &device),
            masked_entity_labels: None,
        };

        let out   = model.forward(words, slots, true).unwrap();
        let grads = out.selector_scores.unwrap().sum().backward();
        let table_grad = model
            .entity_embeddings
            .entity_embeddings
            .weight
            .grad(&grads)
            .unwrap();
        let g = table_grad.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        // rows 7 and 8 are scored against the selector query
        assert!(g[7 * 8..9 * 8].iter().any(|&x| x != 0.0));
    }
}
