pub mod coding;
pub mod mlp;
pub mod pooling;
pub mod proposal;
pub mod refinement;
pub mod select;

pub use coding::apply_refinements;
pub use mlp::{Mlp, MlpBlock};
pub use pooling::{KeypointPooler, RoiPooler};
pub use proposal::ProposalLayer;
pub use refinement::RefinementLayer;
pub use select::{reorganize_proposals, select_topk, Detection, Proposals};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::FeatureLayout;
use crate::error::{HeadError, Result};

/// Brings features to `[batch, points, channels]`.
pub(crate) fn channels_last<B: Backend>(features: Tensor<B, 3>, layout: &FeatureLayout) -> Tensor<B, 3> {
    match layout {
        FeatureLayout::ChannelsFirst => features.swap_dims(1, 2),
        FeatureLayout::ChannelsLast => features,
    }
}

pub(crate) fn check_features<B: Backend>(
    features: &Tensor<B, 3>,
    layout: &FeatureLayout,
    channels: usize,
    what: &'static str,
) -> Result<()> {
    let dims = features.dims();
    if dims[layout.channels_dim()] != channels {
        return Err(HeadError::shape(
            what,
            format!("{channels} channels on axis {}", layout.channels_dim()),
            format!("{:?}", dims),
        ));
    }
    Ok(())
}
