// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights as safetensors.
//
// What gets saved per checkpoint directory:
//   model.safetensors  — every float parameter, f32, keyed by its
//                        dotted registry path
//   config.json        — the EntityModelConfig needed to rebuild
//                        the module tree before loading weights
//
// Files written here are always f32, so a save → load cycle is
// bit-exact. Plain BERT checkpoints read through
// `read_safetensors` may also hold f16 or bf16 tensors; those
// are widened to f32 on the way in.
//
//   checkpoints/
//     model.safetensors
//     config.json

use anyhow::{bail, Context, Result};
use burn::config::Config;
use half::{bf16, f16};
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::{
    config::EntityModelConfig,
    weights::{ParamTensor, StateDict},
};

pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const CONFIG_FILE: &str = "config.json";

/// Manages the weights and config stored in one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Open `dir`, creating it (like `mkdir -p`) when absent.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!(
                "Checkpoint directory '{}' does not exist. Have you run 'init' first?",
                dir.display()
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn save_state(&self, state: &StateDict) -> Result<()> {
        let path = self.weights_path();
        write_safetensors(&path, state)?;
        tracing::debug!("Saved {} tensor(s) to '{}'", state.len(), path.display());
        Ok(())
    }

    pub fn load_state(&self) -> Result<StateDict> {
        let path = self.weights_path();
        let state = read_safetensors(&path).with_context(|| {
            format!("Cannot load weights from '{}'", path.display())
        })?;
        tracing::info!("Loaded {} tensor(s) from '{}'", state.len(), path.display());
        Ok(state)
    }

    pub fn save_config(&self, cfg: &EntityModelConfig) -> Result<()> {
        let path = self.config_path();
        cfg.save(&path)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<EntityModelConfig> {
        let path = self.config_path();
        EntityModelConfig::load(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure 'init' wrote this checkpoint.",
                path.display()
            )
        })
    }
}

// ─── safetensors IO ───────────────────────────────────────────────────────────
/// Write every tensor of `state` as little-endian f32.
pub fn write_safetensors(path: &Path, state: &StateDict) -> Result<()> {
    let stored: Vec<(&str, &[usize], Vec<u8>)> = state
        .tensors
        .iter()
        .map(|(name, tensor)| {
            let bytes = tensor.values.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.as_str(), tensor.shape.as_slice(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(stored.len());
    for (name, shape, bytes) in &stored {
        let view = TensorView::new(Dtype::F32, shape.to_vec(), bytes)
            .with_context(|| format!("Invalid tensor '{name}'"))?;
        views.push((name.to_string(), view));
    }

    safetensors::serialize_to_file(views, &None, path)
        .with_context(|| format!("Failed to write checkpoint to '{}'", path.display()))
}

/// Read a safetensors file into a host state dict. F32, F16 and BF16
/// tensors are accepted; anything else is an error naming the tensor.
pub fn read_safetensors(path: &Path) -> Result<StateDict> {
    let buffer = fs::read(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let file = SafeTensors::deserialize(&buffer)
        .with_context(|| format!("failed to parse safetensors: '{}'", path.display()))?;

    let mut state = StateDict::default();
    for (name, view) in file.tensors() {
        let values = decode_f32(&name, view.dtype(), view.data())?;
        state.insert(name.clone(), ParamTensor::new(&name, view.shape().to_vec(), values)?);
    }
    Ok(state)
}

fn decode_f32(name: &str, dtype: Dtype, bytes: &[u8]) -> Result<Vec<f32>> {
    let values = match dtype {
        Dtype::F32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F16 => bytes
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        Dtype::BF16 => bytes
            .chunks_exact(2)
            .map(|b| bf16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        other => bail!("tensor '{name}' has unsupported dtype {other:?}"),
    };
    Ok(values)
}
