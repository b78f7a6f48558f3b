//! Proposal and refinement heads wired into one pipeline.

use std::path::Path;

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use tracing::info;

use crate::config::HeadConfig;
use crate::detector::{Detection, KeypointPooler, ProposalLayer, Proposals, RefinementLayer, RoiPooler};
use crate::error::{HeadError, Result};
use crate::weights::{load_weights, WeightsReport};

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(feature = "wgpu", not(feature = "cuda")))]
pub type DefaultBackend = burn::backend::wgpu::Wgpu;

#[cfg(all(feature = "cpu", not(any(feature = "wgpu", feature = "cuda"))))]
pub type DefaultBackend = burn::backend::ndarray::NdArray;

/// Both heads as one module, so a single checkpoint covers them.
#[derive(Module, Debug)]
pub struct HeadModel<B: Backend> {
    pub proposal: ProposalLayer<B>,
    pub refinement: RefinementLayer<B>,
}

impl<B: Backend> HeadModel<B> {
    pub fn new(config: &HeadConfig, device: &B::Device) -> Self {
        Self {
            proposal: ProposalLayer::new(config, device),
            refinement: RefinementLayer::new(config, device),
        }
    }
}

/// Runs keypoints through proposal, pooling and refinement and hands back
/// host-side detections.
pub struct HeadPipeline<B: Backend, P = KeypointPooler> {
    model: HeadModel<B>,
    device: B::Device,
    config: HeadConfig,
    pooler: P,
}

impl<B: Backend> HeadPipeline<B, KeypointPooler> {
    /// Validates `config` and builds freshly initialized heads on `device`.
    ///
    /// [`KeypointPooler`] hands keypoint features to the refinement head
    /// unchanged, so both heads must take the same input width.
    pub fn new(config: HeadConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        let (keypoint, pooled) = (config.proposal.mlps[0], config.refinement.mlps[0]);
        if keypoint != pooled {
            return Err(HeadError::Config(format!(
                "keypoint pooling feeds {keypoint} channels to a refinement head expecting {pooled}"
            )));
        }
        let pooler = KeypointPooler::new(config.layout.clone());
        HeadPipeline::new_with_pooler(config, device, pooler)
    }
}

impl<B: Backend, P: RoiPooler<B>> HeadPipeline<B, P> {
    /// Validates `config` and builds heads fed by `pooler`, which decides the
    /// width of the refinement input.
    pub fn new_with_pooler(config: HeadConfig, device: B::Device, pooler: P) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing PV-RCNN heads: {} classes, {}-DOF boxes, proposal topk {}, refinement topk {}",
            config.num_classes, config.box_dof, config.proposal.topk, config.refinement.topk
        );

        let model = HeadModel::new(&config, &device);

        Ok(Self {
            model,
            device,
            config,
            pooler,
        })
    }

    /// Replaces the pooler that feeds the refinement head.
    pub fn with_pooler<Q: RoiPooler<B>>(self, pooler: Q) -> HeadPipeline<B, Q> {
        HeadPipeline {
            model: self.model,
            device: self.device,
            config: self.config,
            pooler,
        }
    }

    /// Loads trained weights into both heads.
    pub fn with_weights(mut self, path: impl AsRef<Path>, allow_partial: bool) -> Result<Self> {
        self.load_weights(path, allow_partial)?;
        Ok(self)
    }

    pub fn load_weights(&mut self, path: impl AsRef<Path>, allow_partial: bool) -> Result<WeightsReport> {
        load_weights(&mut self.model, path, allow_partial)
    }

    /// Proposal and refinement stages, leaving results on the device.
    ///
    /// `points` are keypoint coordinates `[batch, n, 3]`, `features` their
    /// embeddings in the configured layout.
    pub fn infer(&self, points: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<Proposals<B>> {
        let proposals = self.model.proposal.inference(points, features.clone())?;
        let pooled = self.pooler.pool(features, &proposals)?;
        self.model.refinement.inference(pooled, &proposals)
    }

    /// [`infer`](Self::infer) followed by thresholding and labeling on the host.
    pub fn process(&self, points: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<Vec<Detection>> {
        let refined = self.infer(points, features)?;
        let detections = refined.detections(self.config.score_threshold, &self.config.class_names)?;

        info!(
            "HeadPipeline: {} detections above {:.2}",
            detections.len(),
            self.config.score_threshold
        );
        Ok(detections)
    }

    pub fn model(&self) -> &HeadModel<B> {
        &self.model
    }

    pub fn config(&self) -> &HeadConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}
