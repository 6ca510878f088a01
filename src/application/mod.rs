// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal per command (init, predict, inspect).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Use cases are generic over the Burn backend; the CLI picks
// Wgpu, the tests pick NdArray.

// Build a fresh (optionally BERT-initialised) checkpoint
pub mod init_use_case;

// Score answer spans for a feature file
pub mod predict_use_case;

// List the parameters stored in a checkpoint
pub mod inspect_use_case;
