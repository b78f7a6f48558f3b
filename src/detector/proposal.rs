//! Keypoint features to 3D box proposals.

use burn::module::{Ignored, Module};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tracing::debug;

use super::mlp::Mlp;
use super::select::{reorganize_proposals, select_topk, Proposals};
use super::{channels_last, check_features};
use crate::config::{FeatureLayout, HeadConfig};
use crate::error::Result;

/// Regresses a box and a score logit per class for every keypoint.
#[derive(Module, Debug)]
pub struct ProposalLayer<B: Backend> {
    mlp: Mlp<B>,
    num_classes: usize,
    box_dof: usize,
    topk: usize,
    layout: Ignored<FeatureLayout>,
}

impl<B: Backend> ProposalLayer<B> {
    /// Builds the layer. The config is expected to be validated.
    pub fn new(config: &HeadConfig, device: &B::Device) -> Self {
        let mlp = Mlp::new(&config.proposal_mlp(), device);

        Self {
            mlp,
            num_classes: config.num_classes,
            box_dof: config.box_dof,
            topk: config.proposal.topk,
            layout: Ignored(config.layout.clone()),
        }
    }

    /// Raw per-keypoint predictions.
    ///
    /// Input: keypoint features in the configured layout.
    /// Output: boxes `[batch, points, classes, dof]` and score logits
    /// `[batch, points, classes]`.
    pub fn forward(&self, features: Tensor<B, 3>) -> (Tensor<B, 4>, Tensor<B, 3>) {
        let features = channels_last(features, &self.layout);
        let proposals = self.mlp.forward(features);
        reorganize_proposals(proposals, self.num_classes, self.box_dof)
    }

    /// Top-k proposals by foreground probability.
    ///
    /// `points` are the keypoint coordinates `[batch, points, 3]`; the ones
    /// behind the selected proposals are returned with them.
    pub fn inference(&self, points: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<Proposals<B>> {
        check_features(&features, &self.layout, self.mlp.input_channels(), "keypoint features")?;
        let keypoints = features.dims()[self.layout.points_dim()];

        let (boxes, logits) = self.forward(features);
        let proposals = select_topk(points, boxes, logits, self.topk)?;
        debug!(
            "ProposalLayer: kept {} of {} keypoints per batch",
            proposals.topk(),
            keypoints
        );
        Ok(proposals)
    }

    pub fn topk(&self) -> usize {
        self.topk
    }

    pub fn input_channels(&self) -> usize {
        self.mlp.input_channels()
    }

    pub fn mlp(&self) -> &Mlp<B> {
        &self.mlp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProposalConfig;
    use crate::error::HeadError;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn small_config() -> HeadConfig {
        HeadConfig::new()
            .with_num_classes(3)
            .with_class_names(vec!["Car".to_string()])
            .with_proposal(ProposalConfig::new().with_mlps(vec![16, 32]).with_topk(5))
    }

    #[test]
    fn forward_shapes() {
        let device = Default::default();
        let config = small_config();
        let layer = ProposalLayer::<TestBackend>::new(&config, &device);

        let features = Tensor::<TestBackend, 3>::random([2, 16, 40], Distribution::Default, &device);
        let (boxes, scores) = layer.forward(features);

        assert_eq!(boxes.dims(), [2, 40, 3, 7]);
        assert_eq!(scores.dims(), [2, 40, 3]);
    }

    #[test]
    fn inference_keeps_topk() {
        let device = Default::default();
        let config = small_config();
        let layer = ProposalLayer::<TestBackend>::new(&config, &device);

        let points = Tensor::<TestBackend, 3>::random([2, 40, 3], Distribution::Default, &device);
        let features = Tensor::<TestBackend, 3>::random([2, 16, 40], Distribution::Default, &device);
        let proposals = layer.inference(points, features).unwrap();

        assert_eq!(proposals.boxes.dims(), [2, 5, 3, 7]);
        assert_eq!(proposals.scores.dims(), [2, 5, 3]);
        assert_eq!(proposals.indices.dims(), [2, 5]);
        assert_eq!(proposals.points.dims(), [2, 5, 3]);

        // probabilities over classes sum to one
        let sums: Vec<f32> = proposals.scores.sum_dim(2).into_data().to_vec().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5), "{:?}", sums);
    }

    #[test]
    fn channels_last_layout_matches_channels_first() {
        let device = Default::default();
        let config = small_config();
        let first = ProposalLayer::<TestBackend>::new(&config, &device);
        let last = ProposalLayer::<TestBackend> {
            layout: Ignored(FeatureLayout::ChannelsLast),
            ..first.clone()
        };

        let features = Tensor::<TestBackend, 3>::random([1, 16, 12], Distribution::Default, &device);
        let (a, _) = first.forward(features.clone());
        let (b, _) = last.forward(features.swap_dims(1, 2));

        let diff: f32 = (a - b).abs().max().into_data().to_vec().unwrap()[0];
        assert!(diff < 1e-6, "Max diff: {}", diff);
    }

    #[test]
    fn inference_rejects_bad_inputs() {
        let device = Default::default();
        let layer = ProposalLayer::<TestBackend>::new(&small_config(), &device);

        let points = Tensor::<TestBackend, 3>::zeros([1, 4, 3], &device);
        let features = Tensor::<TestBackend, 3>::zeros([1, 16, 4], &device);
        assert!(matches!(
            layer.inference(points, features),
            Err(HeadError::TopK { k: 5, available: 4 })
        ));

        let points = Tensor::<TestBackend, 3>::zeros([1, 8, 3], &device);
        let features = Tensor::<TestBackend, 3>::zeros([1, 15, 8], &device);
        assert!(matches!(
            layer.inference(points, features),
            Err(HeadError::Shape { .. })
        ));
    }
}
