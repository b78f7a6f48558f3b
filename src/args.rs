use std::path::PathBuf;

use clap::Parser;

/// Runs the PV-RCNN proposal and refinement heads on synthetic keypoints.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON head config (as written by --save-config)
    #[arg(long, value_name = "FILE", conflicts_with = "variant")]
    pub config: Option<PathBuf>,

    /// Built-in preset: kitti, kitti-residual
    #[arg(long, default_value = "kitti", value_name = "NAME")]
    pub variant: String,

    /// Safetensors checkpoint with PyTorch-named head weights
    #[arg(long, value_name = "FILE")]
    pub weights: Option<PathBuf>,

    /// Accept checkpoints that lack some head parameters
    #[arg(long)]
    pub allow_partial: bool,

    /// Point clouds per batch
    #[arg(long, default_value = "1", value_name = "COUNT")]
    pub batch: usize,

    /// Keypoints per point cloud
    #[arg(long, default_value = "2048", value_name = "COUNT")]
    pub points: usize,

    /// Override the proposal top-k
    #[arg(long, value_name = "K")]
    pub proposal_topk: Option<usize>,

    /// Override the refinement top-k
    #[arg(long, value_name = "K")]
    pub refinement_topk: Option<usize>,

    /// Override the detection score threshold (0.0 - 1.0)
    #[arg(long, value_name = "THRESHOLD")]
    pub score_threshold: Option<f32>,

    /// Write the effective config to this file
    #[arg(long, value_name = "FILE")]
    pub save_config: Option<PathBuf>,
}
