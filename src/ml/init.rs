// ============================================================
// Layer 5 — Weight Initialisation
// ============================================================
// Every learnable layer of the encoder is built through these
// helpers so the whole model follows one scheme:
//
//   Linear weight           ~ N(0, initializer_range)
//   Linear bias             = 0
//   Embedding (d > 1)       ~ N(0, initializer_range)
//   Embedding (d == 1)      = 0   (scalar bias tables)
//   LayerNorm               weight = 1, bias = 0
//
// Draws come from the backend RNG, so `B::seed` before building
// a model makes the weights reproducible.

use burn::{
    module::Param,
    nn::{Embedding, LayerNorm, LayerNormConfig, Linear},
    prelude::*,
    tensor::Distribution,
};

/// Dense layer with normal weights and a zero bias.
pub fn linear<B: Backend>(
    d_input:  usize,
    d_output: usize,
    std:      f64,
    device:   &B::Device,
) -> Linear<B> {
    let weight = Tensor::<B, 2>::random([d_input, d_output], Distribution::Normal(0.0, std), device);
    let bias   = Tensor::<B, 1>::zeros([d_output], device);
    Linear {
        weight: Param::from_tensor(weight),
        bias:   Some(Param::from_tensor(bias)),
    }
}

/// Lookup table with normal rows, or zero rows when it stores scalar biases.
pub fn embedding<B: Backend>(
    n_embedding: usize,
    d_model:     usize,
    std:         f64,
    device:      &B::Device,
) -> Embedding<B> {
    let weight = if d_model == 1 {
        Tensor::<B, 2>::zeros([n_embedding, 1], device)
    } else {
        Tensor::<B, 2>::random([n_embedding, d_model], Distribution::Normal(0.0, std), device)
    };
    Embedding { weight: Param::from_tensor(weight) }
}

/// Lookup table whose row 0 is the zero vector (padding id).
pub fn padded_embedding<B: Backend>(
    n_embedding: usize,
    d_model:     usize,
    std:         f64,
    device:      &B::Device,
) -> Embedding<B> {
    let weight = if d_model == 1 {
        Tensor::<B, 2>::zeros([n_embedding, 1], device)
    } else {
        Tensor::<B, 2>::random([n_embedding, d_model], Distribution::Normal(0.0, std), device)
            .slice_assign([0..1, 0..d_model], Tensor::zeros([1, d_model], device))
    };
    Embedding { weight: Param::from_tensor(weight) }
}

pub fn layer_norm<B: Backend>(d_model: usize, epsilon: f64, device: &B::Device) -> LayerNorm<B> {
    LayerNormConfig::new(d_model).with_epsilon(epsilon).init(device)
}
