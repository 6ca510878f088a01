// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what flows through
// the system. No burn types and no I/O here.

// A tokenised, entity-linked question/passage window
pub mod feature;

// Start/end logits for one feature
pub mod span_result;

// Core abstractions (traits) that other layers implement
pub mod traits;
