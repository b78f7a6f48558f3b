//! PV-RCNN proposal and refinement heads on the Burn framework.
//!
//! The [`ProposalLayer`] turns keypoint features into per-class 3D boxes and
//! scores and keeps the top-k candidates; the [`RefinementLayer`] refines those
//! candidates from pooled features. [`HeadPipeline`] chains the two.
//!
//! Supports WGPU, CPU (NdArray), and CUDA backends.

pub mod config;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod weights;

pub use config::{BoxCoding, FeatureLayout, HeadConfig, MlpConfig, ProposalConfig, RefinementConfig};
pub use detector::{Detection, KeypointPooler, Mlp, ProposalLayer, Proposals, RefinementLayer, RoiPooler};
pub use error::{HeadError, Result};
pub use pipeline::{HeadModel, HeadPipeline};
