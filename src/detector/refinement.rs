//! Refinement of proposals from pooled features.

use burn::module::{Ignored, Module};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tracing::debug;

use super::coding::apply_refinements;
use super::mlp::Mlp;
use super::select::{reorganize_proposals, select_topk, Proposals};
use super::{channels_last, check_features};
use crate::config::{BoxCoding, FeatureLayout, HeadConfig};
use crate::error::{HeadError, Result};

/// Regresses per-class box deltas and score logits for every proposal and
/// decodes the deltas against the proposal boxes.
#[derive(Module, Debug)]
pub struct RefinementLayer<B: Backend> {
    mlp: Mlp<B>,
    num_classes: usize,
    box_dof: usize,
    topk: usize,
    layout: Ignored<FeatureLayout>,
    coding: Ignored<BoxCoding>,
}

impl<B: Backend> RefinementLayer<B> {
    /// Builds the layer. The config is expected to be validated.
    pub fn new(config: &HeadConfig, device: &B::Device) -> Self {
        let mlp = Mlp::new(&config.refinement_mlp(), device);

        Self {
            mlp,
            num_classes: config.num_classes,
            box_dof: config.box_dof,
            topk: config.refinement.topk,
            layout: Ignored(config.layout.clone()),
            coding: Ignored(config.refinement.coding.clone()),
        }
    }

    /// Refined boxes `[batch, k, classes, dof]` and score logits `[batch, k, classes]`.
    ///
    /// `features` carries one pooled vector per proposal in the configured
    /// layout; `proposals` are the boxes `[batch, k, classes, dof]` they were
    /// pooled for.
    pub fn forward(&self, features: Tensor<B, 3>, proposals: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 3>) {
        let features = channels_last(features, &self.layout);
        let refinements = self.mlp.forward(features);
        let (deltas, scores) = reorganize_proposals(refinements, self.num_classes, self.box_dof);
        let boxes = apply_refinements(&self.coding, deltas, proposals);
        (boxes, scores)
    }

    /// Refines `proposals` and keeps the best `topk` of them.
    ///
    /// The returned indices point at the keypoints the proposals originally
    /// came from, not at positions in `proposals`.
    pub fn inference(&self, features: Tensor<B, 3>, proposals: &Proposals<B>) -> Result<Proposals<B>> {
        check_features(&features, &self.layout, self.mlp.input_channels(), "pooled features")?;

        let [batch, count, classes, dof] = proposals.boxes.dims();
        let expected = [batch, count, self.num_classes, self.box_dof];
        if [batch, count, classes, dof] != expected {
            return Err(HeadError::shape(
                "proposal boxes",
                format!("{:?}", expected),
                format!("{:?}", proposals.boxes.dims()),
            ));
        }
        let dims = features.dims();
        if dims[0] != batch || dims[self.layout.points_dim()] != count {
            return Err(HeadError::shape(
                "pooled features",
                format!("one vector per proposal ({batch} x {count})"),
                format!("{:?}", features.dims()),
            ));
        }

        let (boxes, logits) = self.forward(features, proposals.boxes.clone());
        let k = self.topk.min(count);
        let refined = select_topk(proposals.points.clone(), boxes, logits, k)?;
        debug!("RefinementLayer: kept {} of {} proposals per batch", k, count);

        let indices = proposals
            .indices
            .clone()
            .gather(1, refined.indices.clone());
        Ok(Proposals { indices, ..refined })
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
