//! Per-proposal feature pooling between the two heads.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::select::Proposals;
use crate::config::FeatureLayout;
use crate::error::{HeadError, Result};

/// Produces one feature vector per proposal for the refinement head.
///
/// Output keeps the layout of the input features, with the point axis
/// replaced by the proposal axis.
pub trait RoiPooler<B: Backend> {
    fn pool(&self, features: Tensor<B, 3>, proposals: &Proposals<B>) -> Result<Tensor<B, 3>>;
}

/// Reuses the feature of the keypoint each proposal was regressed from.
#[derive(Debug, Clone)]
pub struct KeypointPooler {
    layout: FeatureLayout,
}

impl KeypointPooler {
    pub fn new(layout: FeatureLayout) -> Self {
        Self { layout }
    }
}

impl<B: Backend> RoiPooler<B> for KeypointPooler {
    fn pool(&self, features: Tensor<B, 3>, proposals: &Proposals<B>) -> Result<Tensor<B, 3>> {
        let [batch, k] = proposals.indices.dims();
        let dims = features.dims();
        if dims[0] != batch {
            return Err(HeadError::shape(
                "keypoint features",
                format!("batch of {batch}"),
                format!("{:?}", dims),
            ));
        }

        let channels = dims[self.layout.channels_dim()];
        let indices = proposals.indices.clone();
        let pooled = match self.layout {
            FeatureLayout::ChannelsFirst => {
                let indices = indices.reshape([batch, 1, k]).repeat_dim(1, channels);
                features.gather(2, indices)
            }
            FeatureLayout::ChannelsLast => {
                let indices = indices.reshape([batch, k, 1]).repeat_dim(2, channels);
                features.gather(1, indices)
            }
        };
        Ok(pooled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::{Int, TensorData};

    type TestBackend = NdArray;

    fn proposals(device: &<TestBackend as Backend>::Device) -> Proposals<TestBackend> {
        Proposals {
            boxes: Tensor::zeros([1, 2, 2, 1], device),
            scores: Tensor::zeros([1, 2, 2], device),
            indices: Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(vec![2i64, 0], [1, 2]), device),
            points: Tensor::zeros([1, 2, 3], device),
        }
    }

    #[test]
    fn gathers_channels_first() {
        let device = Default::default();
        // 2 channels, 3 keypoints
        let features = Tensor::<TestBackend, 3>::from_floats([[[1.0, 2.0, 3.0], [10.0, 20.0, 30.0]]], &device);
        let pooled = KeypointPooler::new(FeatureLayout::ChannelsFirst)
            .pool(features, &proposals(&device))
            .unwrap();

        assert_eq!(pooled.dims(), [1, 2, 2]);
        let values: Vec<f32> = pooled.into_data().to_vec().unwrap();
        assert_eq!(values, vec![3.0, 1.0, 30.0, 10.0]);
    }

    #[test]
    fn gathers_channels_last() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 3>::from_floats([[[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]], &device);
        let pooled = KeypointPooler::new(FeatureLayout::ChannelsLast)
            .pool(features, &proposals(&device))
            .unwrap();

        assert_eq!(pooled.dims(), [1, 2, 2]);
        let values: Vec<f32> = pooled.into_data().to_vec().unwrap();
        assert_eq!(values, vec![3.0, 30.0, 1.0, 10.0]);
    }

    #[test]
    fn rejects_batch_mismatch() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 3>::zeros([2, 4, 3], &device);
        let result = KeypointPooler::new(FeatureLayout::ChannelsFirst).pool(features, &proposals(&device));
        assert!(matches!(result, Err(HeadError::Shape { .. })));
    }
}
