// ============================================================
// Layer 4 — Reading Feature Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec of features
// into padded tensors for the reader.
//
// Features arrive unpadded, so every sequence is padded to the
// longest one in the batch:
//
//   word_ids               → pad_token_id      [N, W]
//   word masks / segments  → 0                 [N, W]
//   entity ids             → 0 (padding id)    [N, E]
//   entity masks / segs    → 0                 [N, E]
//   entity position ids    → -1                [N, E, P]
//
// E is cut to `max_entity_length`. E and P are at least 1 so a
// batch without any entity still has one masked padding slot.
// With `no_entity` every entity slot is masked out, turning the
// reader into a words-only model.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::IndexedFeature;
use crate::domain::feature::ReadingFeature;
use crate::ml::config::{NO_POSITION, PADDING_ENTITY_ID};
use crate::ml::model::{EntityInput, WordInput};

// ─── ReaderBatch ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ReaderBatch<B: Backend> {
    pub words:    WordInput<B>,
    pub entities: EntityInput<B>,

    /// Gold positions [N]; present only when every feature carries them
    pub start_positions: Option<Tensor<B, 1, Int>>,
    pub end_positions:   Option<Tensor<B, 1, Int>>,

    /// Index of each row's feature in the dataset
    pub example_indices: Vec<usize>,
}

// ─── FeatureBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct FeatureBatcher {
    pub pad_token_id:      i64,
    pub max_entity_length: usize,
    pub no_entity:         bool,
}

impl FeatureBatcher {
    pub fn new(pad_token_id: i64, max_entity_length: usize) -> Self {
        Self { pad_token_id, max_entity_length, no_entity: false }
    }

    pub fn with_no_entity(mut self, no_entity: bool) -> Self {
        self.no_entity = no_entity;
        self
    }
}

/// Row-major [rows, width] copy of `rows`, right-padded with `pad`.
fn pad_2d(rows: &[&[i64]], width: usize, pad: i64) -> Vec<i64> {
    let mut flat = Vec::with_capacity(rows.len() * width);
    for row in rows {
        flat.extend(row.iter().take(width));
        flat.extend(std::iter::repeat(pad).take(width.saturating_sub(row.len())));
    }
    flat
}

/// One borrowed sequence per feature.
fn column<'a>(
    features: &[&'a ReadingFeature],
    pick:     impl Fn(&'a ReadingFeature) -> &'a [i64],
) -> Vec<&'a [i64]> {
    features.iter().map(|&f| pick(f)).collect()
}

fn int_tensor<B: Backend, const D: usize>(
    values: Vec<i64>,
    shape:  [usize; D],
    device: &B::Device,
) -> Tensor<B, D, Int> {
    Tensor::from_data(TensorData::new(values, shape), device)
}

impl<B: Backend> Batcher<B, IndexedFeature, ReaderBatch<B>> for FeatureBatcher {
    fn batch(&self, items: Vec<IndexedFeature>, device: &B::Device) -> ReaderBatch<B> {
        let batch_size = items.len();
        let features: Vec<_> = items.iter().map(|item| &item.feature).collect();

        // ── Word side ─────────────────────────────────────────────────────────
        let num_words = features.iter().map(|f| f.num_words()).max().unwrap_or(0);
        let word_shape = [batch_size, num_words];
        let words = WordInput {
            word_ids: int_tensor::<B, 2>(
                pad_2d(&column(&features, |f| &f.word_ids[..]), num_words, self.pad_token_id),
                word_shape,
                device,
            ),
            segment_ids: int_tensor::<B, 2>(
                pad_2d(&column(&features, |f| &f.word_segment_ids[..]), num_words, 0),
                word_shape,
                device,
            ),
            attention_mask: int_tensor::<B, 2>(
                pad_2d(&column(&features, |f| &f.word_attention_mask[..]), num_words, 0),
                word_shape,
                device,
            ),
        };

        // ── Entity side ───────────────────────────────────────────────────────
        let num_entities = features
            .iter()
            .map(|f| f.num_entities())
            .max()
            .unwrap_or(0)
            .min(self.max_entity_length)
            .max(1);
        let max_span = features.iter().map(|f| f.max_span()).max().unwrap_or(0).max(1);
        let entity_shape = [batch_size, num_entities];

        let mut positions = Vec::with_capacity(batch_size * num_entities * max_span);
        for feature in &features {
            let spans: Vec<&[i64]> = feature
                .entity_position_ids
                .iter()
                .take(num_entities)
                .map(Vec::as_slice)
                .collect();
            positions.extend(pad_2d(&spans, max_span, NO_POSITION));
            let missing_slots = num_entities - spans.len();
            positions.extend(std::iter::repeat(NO_POSITION).take(missing_slots * max_span));
        }

        let mut attention_mask = int_tensor::<B, 2>(
            pad_2d(&column(&features, |f| &f.entity_attention_mask[..]), num_entities, 0),
            entity_shape,
            device,
        );
        if self.no_entity {
            attention_mask = attention_mask.zeros_like();
        }
        let entities = EntityInput {
            entity_ids: int_tensor::<B, 2>(
                pad_2d(&column(&features, |f| &f.entity_ids[..]), num_entities, PADDING_ENTITY_ID),
                entity_shape,
                device,
            ),
            position_ids: int_tensor::<B, 3>(positions, [batch_size, num_entities, max_span], device),
            segment_ids: int_tensor::<B, 2>(
                pad_2d(&column(&features, |f| &f.entity_segment_ids[..]), num_entities, 0),
                entity_shape,
                device,
            ),
            attention_mask,
        };

        // ── Gold positions ────────────────────────────────────────────────────
        let gold = |rows: Vec<&[i64]>| {
            let firsts: Option<Vec<i64>> = rows.iter().map(|r| r.first().copied()).collect();
            firsts.map(|v| int_tensor::<B, 1>(v, [batch_size], device))
        };

        ReaderBatch {
            words,
            entities,
            start_positions: gold(column(&features, |f| &f.start_positions[..])),
            end_positions:   gold(column(&features, |f| &f.end_positions[..])),
            example_indices: items.iter().map(|item| item.index).collect(),
        }
    }
}
