// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model code lives here. Leaf-first:
//
//   config.rs     — EntityModelConfig (#[derive(Config)]) + constants
//   error.rs      — ModelError
//   init.rs       — N(0, σ) / zero / unit initialisers
//   mask.rs       — word+entity additive attention bias
//   embeddings.rs — word embeddings, entity embeddings with
//                   span-position averaging
//   encoder.rs    — BERT layers, encoder stack, pooler
//   selector.rs   — entity selector over candidate lists
//   model.rs      — standard entity model (single joint pass)
//   e2e.rs        — end-to-end model (selection → soft mix → joint pass)
//   reader.rs     — span-prediction head + loss
//   weights.rs    — parameter registry, state dicts, BERT adaptation
//   predictor.rs  — batched span scoring from a checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Devlin et al. (2019) BERT
//            Yamada et al. (2020) LUKE

pub mod config;
pub mod error;
pub mod init;
pub mod mask;
pub mod embeddings;
pub mod encoder;
pub mod selector;
pub mod model;
pub mod e2e;
pub mod reader;
pub mod weights;
pub mod predictor;
