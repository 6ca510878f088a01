// ============================================================
// Layer 3 — RawSpanResult Domain Type
// ============================================================
// Per-feature start/end logits, trimmed to the feature's own
// word length. N-best span extraction and answer text
// reconstruction happen downstream from these.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpanResult {
    pub unique_id:    u64,
    pub start_logits: Vec<f32>,
    pub end_logits:   Vec<f32>,
}
