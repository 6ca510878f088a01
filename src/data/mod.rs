// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a feature file and model-ready tensors:
//
//   features.jsonl
//       │
//       ▼
//   JsonlFeatureLoader → parses and checks one feature per line
//       │
//       ▼
//   FeatureDataset     → implements Burn's Dataset trait
//       │
//       ▼
//   FeatureBatcher     → pads features into tensor batches
//       │
//       ▼
//   DataLoader         → feeds batches to the predictor
//
// Tokenization and feature conversion happen upstream.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads reading features from JSON Lines
pub mod loader;

/// Implements Burn's Dataset trait for features
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
