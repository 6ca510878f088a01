// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to feature storage and to the
// model through these traits, so a different feature format or
// backend only needs a new implementation.

use anyhow::Result;

use crate::domain::{feature::ReadingFeature, span_result::RawSpanResult};

// ─── FeatureSource ────────────────────────────────────────────────────────────
/// Anything that can produce model-ready reading features.
///
/// Implementations:
///   - JsonlFeatureLoader → one JSON feature per line
pub trait FeatureSource {
    fn load_all(&self) -> Result<Vec<ReadingFeature>>;
}

// ─── SpanScorer ───────────────────────────────────────────────────────────────
/// Anything that scores answer spans for a list of features.
///
/// Implementations:
///   - Predictor → the entity-aware reader
pub trait SpanScorer {
    /// One result per feature, in input order.
    fn score(&self, features: Vec<ReadingFeature>) -> Result<Vec<RawSpanResult>>;
}
