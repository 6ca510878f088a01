// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs — model weights as safetensors plus the model
//                   config as JSON, so `predict` and `inspect`
//                   can rebuild exactly the model `init` wrote.
//                   Also reads plain BERT checkpoints (f32, f16,
//                   bf16) for weight adaptation.
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Checkpoint saving and loading
pub mod checkpoint;
