// ============================================================
// Layer 5 — Transformer Encoder
// ============================================================
// Post-norm BERT encoder. Module and field names follow the
// published BERT checkpoint layout so the weight loader can map
// `encoder.layer.{i}.attention.self.query.weight` and friends
// straight onto these structs:
//
//   BertLayer
//     attention.self     query / key / value
//     attention.output   dense → dropout → LayerNorm(x + ·)
//     intermediate       dense → gelu
//     output             dense → dropout → LayerNorm(x + ·)
//
// Attention is written out by hand instead of using
// nn::attention::MultiHeadAttention: the checkpoint layout keeps
// q/k/v as separate dense layers and the encoder needs the
// additive [batch, 1, 1, S] bias from the mask builder.

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, Linear},
    prelude::*,
    tensor::activation::{gelu, softmax, tanh},
};

use crate::ml::{config::EntityModelConfig, init};

// ─── Self-Attention ───────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    pub query:   Linear<B>,
    pub key:     Linear<B>,
    pub value:   Linear<B>,
    pub dropout: Dropout,
    pub num_heads: usize,
}

impl<B: Backend> SelfAttention<B> {
    fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        let (h, std) = (cfg.hidden_size, cfg.initializer_range);
        Self {
            query:     init::linear(h, h, std, device),
            key:       init::linear(h, h, std, device),
            value:     init::linear(h, h, std, device),
            dropout:   DropoutConfig::new(cfg.attention_probs_dropout_prob).init(),
            num_heads: cfg.num_attention_heads,
        }
    }

    /// x: [batch, S, hidden], bias: [batch, 1, 1, S]
    /// → context [batch, S, hidden], probabilities [batch, heads, S, S]
    pub fn forward(&self, x: Tensor<B, 3>, bias: Tensor<B, 4>) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let [batch_size, seq_len, hidden] = x.dims();
        let head_dim = hidden / self.num_heads;

        let split = |t: Tensor<B, 3>| {
            t.reshape([batch_size, seq_len, self.num_heads, head_dim])
                .swap_dims(1, 2)
        };
        let q = split(self.query.forward(x.clone()));
        let k = split(self.key.forward(x.clone()));
        let v = split(self.value.forward(x));

        let scores = q.matmul(k.transpose()).div_scalar((head_dim as f64).sqrt()) + bias;
        let probs  = softmax(scores, 3);

        let context = self
            .dropout
            .forward(probs.clone())
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch_size, seq_len, hidden]);
        (context, probs)
    }
}

// ─── Residual Projections ─────────────────────────────────────────────────────
/// dense → dropout → LayerNorm(residual + ·)
#[derive(Module, Debug)]
pub struct ResidualOutput<B: Backend> {
    pub dense:      Linear<B>,
    pub layer_norm: LayerNorm<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> ResidualOutput<B> {
    fn new(d_input: usize, cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            dense:      init::linear(d_input, cfg.hidden_size, cfg.initializer_range, device),
            layer_norm: init::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, device),
            dropout:    DropoutConfig::new(cfg.hidden_dropout_prob).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>, residual: Tensor<B, 3>) -> Tensor<B, 3> {
        let projected = self.dropout.forward(self.dense.forward(x));
        self.layer_norm.forward(residual + projected)
    }
}

#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    pub self_attn: SelfAttention<B>,
    pub output:    ResidualOutput<B>,
}

#[derive(Module, Debug)]
pub struct Intermediate<B: Backend> {
    pub dense: Linear<B>,
}

// ─── BertLayer ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertLayer<B: Backend> {
    pub attention:    Attention<B>,
    pub intermediate: Intermediate<B>,
    pub output:       ResidualOutput<B>,
}

impl<B: Backend> BertLayer<B> {
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            attention: Attention {
                self_attn: SelfAttention::new(cfg, device),
                output:    ResidualOutput::new(cfg.hidden_size, cfg, device),
            },
            intermediate: Intermediate {
                dense: init::linear(cfg.hidden_size, cfg.intermediate_size, cfg.initializer_range, device),
            },
            output: ResidualOutput::new(cfg.intermediate_size, cfg, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>, bias: Tensor<B, 4>) -> (Tensor<B, 3>, Tensor<B, 4>) {
        let (context, probs) = self.attention.self_attn.forward(x.clone(), bias);
        let attended = self.attention.output.forward(context, x);
        let expanded = gelu(self.intermediate.dense.forward(attended.clone()));
        (self.output.forward(expanded, attended), probs)
    }
}

// ─── Encoder Stack ────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub layer: Vec<BertLayer<B>>,
}

/// Result of one pass through the stack.
pub struct EncoderOutput<B: Backend> {
    pub last_hidden_state: Tensor<B, 3>,
    /// Input to the first layer followed by every layer's output.
    pub hidden_states: Option<Vec<Tensor<B, 3>>>,
    pub attentions:    Option<Vec<Tensor<B, 4>>>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(depth: usize, cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            layer: (0..depth).map(|_| BertLayer::new(cfg, device)).collect(),
        }
    }

    pub fn forward(
        &self,
        x:                  Tensor<B, 3>,
        bias:               Tensor<B, 4>,
        keep_hidden_states: bool,
        keep_attentions:    bool,
    ) -> EncoderOutput<B> {
        let mut hidden_states = keep_hidden_states.then(|| vec![x.clone()]);
        let mut attentions    = keep_attentions.then(Vec::new);

        let mut x = x;
        for layer in &self.layer {
            let (out, probs) = layer.forward(x, bias.clone());
            if let Some(states) = hidden_states.as_mut() {
                states.push(out.clone());
            }
            if let Some(all) = attentions.as_mut() {
                all.push(probs);
            }
            x = out;
        }

        EncoderOutput { last_hidden_state: x, hidden_states, attentions }
    }
}

// ─── Pooler ───────────────────────────────────────────────────────────────────
/// tanh(dense(hidden[:, 0]))
#[derive(Module, Debug)]
pub struct Pooler<B: Backend> {
    pub dense: Linear<B>,
}

impl<B: Backend> Pooler<B> {
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            dense: init::linear(cfg.hidden_size, cfg.hidden_size, cfg.initializer_range, device),
        }
    }

    /// [batch, S, hidden] → [batch, hidden]
    pub fn forward(&self, hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _, hidden_size] = hidden.dims();
        let first = hidden
            .slice([0..batch_size, 0..1, 0..hidden_size])
            .reshape([batch_size, hidden_size]);
        tanh(self.dense.forward(first))
    }
}

// ─── Prediction Head Transform ────────────────────────────────────────────────
/// dense → gelu → LayerNorm, shared by the selector head.
#[derive(Module, Debug)]
pub struct HeadTransform<B: Backend> {
    pub dense:      Linear<B>,
    pub layer_norm: LayerNorm<B>,
}

impl<B: Backend> HeadTransform<B> {
    pub fn new(cfg: &EntityModelConfig, device: &B::Device) -> Self {
        Self {
            dense:      init::linear(cfg.hidden_size, cfg.hidden_size, cfg.initializer_range, device),
            layer_norm: init::layer_norm(cfg.hidden_size, cfg.layer_norm_eps, device),
        }
    }

    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        self.layer_norm.forward(gelu(self.dense.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::ml::mask::extended_attention_mask;

    type TB = NdArray<f32>;

    fn tiny_config() -> EntityModelConfig {
        EntityModelConfig::new(30, 10)
            .with_hidden_size(8)
            .with_num_attention_heads(2)
            .with_intermediate_size(16)
            .with_hidden_dropout_prob(0.0)
            .with_attention_probs_dropout_prob(0.0)
    }

    fn values<const D: usize>(t: Tensor<TB, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_encoder_keeps_shape_and_collects_diagnostics() {
        let device  = Default::default();
        let encoder = Encoder::<TB>::new(3, &tiny_config(), &device);
        let x    = Tensor::<TB, 3>::random([2, 5, 8], burn::tensor::Distribution::Default, &device);
        let bias = Tensor::<TB, 4>::zeros([2, 1, 1, 5], &device);

        let out = encoder.forward(x, bias, true, true);
        assert_eq!(out.last_hidden_state.dims(), [2, 5, 8]);
        assert_eq!(out.hidden_states.unwrap().len(), 4);

        let attentions = out.attentions.unwrap();
        assert_eq!(attentions.len(), 3);
        assert_eq!(attentions[0].dims(), [2, 2, 5, 5]);
    }

    #[test]
    fn test_diagnostics_absent_unless_requested() {
        let device  = Default::default();
        let encoder = Encoder::<TB>::new(1, &tiny_config(), &device);
        let out = encoder.forward(
            Tensor::zeros([1, 3, 8], &device),
            Tensor::zeros([1, 1, 1, 3], &device),
            false,
            false,
        );
        assert!(out.hidden_states.is_none());
        assert!(out.attentions.is_none());
    }

    #[test]
    fn test_masked_slot_receives_no_attention() {
        let device = Default::default();
        let layer  = BertLayer::<TB>::new(&tiny_config(), &device);
        let x = Tensor::<TB, 3>::random([1, 4, 8], burn::tensor::Distribution::Default, &device);
        let bias = extended_attention_mask(
            Tensor::<TB, 2, Int>::from_ints([[1, 1, 1]], &device),
            Tensor::<TB, 2, Int>::from_ints([[0]], &device),
        );

        let (_, probs) = layer.forward(x, bias);
        let p = values(probs); // [1, 2, 4, 4]
        for query in 0..8 {
            assert!(p[query * 4 + 3] < 1e-6);
        }
    }

    #[test]
    fn test_pooler_output_is_bounded() {
        let device = Default::default();
        let pooler = Pooler::<TB>::new(&tiny_config(), &device);
        let pooled = pooler.forward(Tensor::<TB, 3>::ones([2, 3, 8], &device).mul_scalar(50.0));
        assert_eq!(pooled.dims(), [2, 8]);
        assert!(values(pooled).iter().all(|x| x.abs() <= 1.0));
    }
}
