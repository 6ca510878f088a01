// ============================================================
// Layer 3 — ReadingFeature Domain Type
// ============================================================
// One window of a question + passage, already tokenised and
// entity-linked by the upstream feature generator:
//
//   word side    [CLS] question [SEP] passage window [SEP]
//   entity side  one slot per linked mention; each slot lists
//                the word positions the mention covers
//
// Sequences are NOT padded here; the batcher pads per batch.
// Gold start/end positions are only present on training features.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingFeature {
    /// Joins predictions back to the example this window came from
    pub unique_id: u64,

    pub word_ids:            Vec<i64>,
    pub word_segment_ids:    Vec<i64>,
    pub word_attention_mask: Vec<i64>,

    pub entity_ids:            Vec<i64>,
    /// Word positions covered by each entity slot
    pub entity_position_ids:   Vec<Vec<i64>>,
    pub entity_segment_ids:    Vec<i64>,
    pub entity_attention_mask: Vec<i64>,

    /// Candidate answer starts; the first one is the training target
    #[serde(default)]
    pub start_positions: Vec<i64>,
    #[serde(default)]
    pub end_positions:   Vec<i64>,
}

impl ReadingFeature {
    pub fn num_words(&self) -> usize {
        self.word_ids.len()
    }

    pub fn num_entities(&self) -> usize {
        self.entity_ids.len()
    }

    /// Longest entity span in this feature.
    pub fn max_span(&self) -> usize {
        self.entity_position_ids.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Check that the parallel sequences line up.
    pub fn consistency_error(&self) -> Option<String> {
        let w = self.word_ids.len();
        if w == 0 {
            return Some(format!("feature {}: word_ids is empty", self.unique_id));
        }
        if self.word_segment_ids.len() != w || self.word_attention_mask.len() != w {
            return Some(format!(
                "feature {}: word sequences differ in length ({}, {}, {})",
                self.unique_id, w, self.word_segment_ids.len(), self.word_attention_mask.len()
            ));
        }
        let e = self.entity_ids.len();
        if self.entity_position_ids.len() != e
            || self.entity_segment_ids.len() != e
            || self.entity_attention_mask.len() != e
        {
            return Some(format!(
                "feature {}: entity sequences differ in length ({}, {}, {}, {})",
                self.unique_id,
                e,
                self.entity_position_ids.len(),
                self.entity_segment_ids.len(),
                self.entity_attention_mask.len()
            ));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature() -> ReadingFeature {
        ReadingFeature {
            unique_id:             1000,
            word_ids:              vec![101, 7, 8, 102],
            word_segment_ids:      vec![0, 0, 1, 1],
            word_attention_mask:   vec![1, 1, 1, 1],
            entity_ids:            vec![42, 43],
            entity_position_ids:   vec![vec![1], vec![2, 3]],
            entity_segment_ids:    vec![0, 1],
            entity_attention_mask: vec![1, 1],
            start_positions:       vec![],
            end_positions:         vec![],
        }
    }

    #[test]
    fn test_max_span() {
        assert_eq!(feature().max_span(), 2);
    }

    #[test]
    fn test_consistent_feature_passes() {
        assert!(feature().consistency_error().is_none());
    }

    #[test]
    fn test_ragged_entity_lists_are_reported() {
        let mut f = feature();
        f.entity_segment_ids.pop();
        let msg = f.consistency_error().unwrap();
        assert!(msg.contains("feature 1000"));
    }

    #[test]
    fn test_empty_word_sequence_is_reported() {
        let mut f = feature();
        f.word_ids.clear();
        f.word_segment_ids.clear();
        f.word_attention_mask.clear();
        let msg = f.consistency_error().unwrap();
        assert!(msg.contains("feature 1000") && msg.contains("empty"));
    }

    #[test]
    fn test_positions_default_when_absent() {
        let json = r#"{"unique_id":5,"word_ids":[1],"word_segment_ids":[0],
            "word_attention_mask":[1],"entity_ids":[],"entity_position_ids":[],
            "entity_segment_ids":[],"entity_attention_mask":[]}"#;
        let f: ReadingFeature = serde_json::from_str(json).unwrap();
        assert!(f.start_positions.is_empty());
        assert_eq!(f.num_entities(), 0);
    }
}
