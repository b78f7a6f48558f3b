//! Shared multilayer perceptron used by both heads.

use burn::module::Module;
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{activation, Tensor};

use crate::config::MlpConfig;

/// Linear layer with optional BatchNorm and ReLU.
#[derive(Module, Debug)]
pub struct MlpBlock<B: Backend> {
    linear: Linear<B>,
    norm: Option<BatchNorm<B>>,
    relu: bool,
}

impl<B: Backend> MlpBlock<B> {
    pub fn new(
        c1: usize,
        c2: usize,
        bias: bool,
        batch_norm: bool,
        relu: bool,
        device: &B::Device,
    ) -> Self {
        let linear = LinearConfig::new(c1, c2).with_bias(bias).init(device);
        let norm = batch_norm.then(|| BatchNormConfig::new(c2).with_epsilon(1e-2).init(device));

        Self { linear, norm, relu }
    }

    pub fn linear(&self) -> &Linear<B> {
        &self.linear
    }

    /// `[batch, points, c1]` -> `[batch, points, c2]`
    pub fn forward(&self, xs: Tensor<B, 3>) -> Tensor<B, 3> {
        let xs = self.linear.forward(xs);
        let xs = match &self.norm {
            // BatchNorm normalizes axis 1, so channels go there and back
            Some(norm) => norm.forward(xs.swap_dims(1, 2)).swap_dims(1, 2),
            None => xs,
        };
        if self.relu {
            activation::relu(xs)
        } else {
            xs
        }
    }
}

/// Stack of [`MlpBlock`]s applied point-wise over the last axis.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<MlpBlock<B>>,
    input_channels: usize,
    output_channels: usize,
}

impl<B: Backend> Mlp<B> {
    /// Builds the stack. The config is expected to have passed
    /// [`MlpConfig::validate`].
    pub fn new(config: &MlpConfig, device: &B::Device) -> Self {
        let layers = config
            .channels
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                MlpBlock::new(
                    pair[0],
                    pair[1],
                    config.bias,
                    config.batch_norm,
                    config.relu_at(i),
                    device,
                )
            })
            .collect();

        Self {
            layers,
            input_channels: config.channels.first().copied().unwrap_or_default(),
            output_channels: config.channels.last().copied().unwrap_or_default(),
        }
    }

    pub fn forward(&self, xs: Tensor<B, 3>) -> Tensor<B, 3> {
        self.layers.iter().fold(xs, |xs, layer| layer.forward(xs))
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[MlpBlock<B>] {
        &self.layers
    }
}
