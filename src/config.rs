//! Head configuration.
//!
//! Everything derives Burn's [`Config`], so a config round-trips through JSON
//! with `save`/`load` and builds fluently with the generated `with_*` setters.

use std::path::Path;

use burn::config::Config;

use crate::error::{HeadError, Result as HeadResult};

/// Physical layout of keypoint feature tensors.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum FeatureLayout {
    /// `[batch, channels, points]`, as emitted by set abstraction.
    ChannelsFirst,
    /// `[batch, points, channels]`.
    ChannelsLast,
}

impl FeatureLayout {
    /// Axis holding the points (or proposals).
    pub fn points_dim(&self) -> usize {
        match self {
            Self::ChannelsFirst => 2,
            Self::ChannelsLast => 1,
        }
    }

    /// Axis holding the feature channels.
    pub fn channels_dim(&self) -> usize {
        match self {
            Self::ChannelsFirst => 1,
            Self::ChannelsLast => 2,
        }
    }
}

/// How refinement deltas combine with proposal boxes.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum BoxCoding {
    /// Deltas are added to every box parameter.
    Additive,
    /// 7-DOF residual coding: centers scale with the box diagonal (x, y) or
    /// height (z), sizes scale by `exp(delta)`, heading adds.
    Residual,
}

/// Multilayer perceptron made of `channels.len() - 1` linear layers.
#[derive(Config, Debug)]
pub struct MlpConfig {
    /// Input width followed by the width of every layer.
    pub channels: Vec<usize>,
    #[config(default = true)]
    pub bias: bool,
    #[config(default = false)]
    pub batch_norm: bool,
    /// One flag per layer, or a single flag applied to all of them.
    #[config(default = "vec![true]")]
    pub relu: Vec<bool>,
}

impl MlpConfig {
    /// Number of linear layers.
    pub fn num_layers(&self) -> usize {
        self.channels.len().saturating_sub(1)
    }

    /// Whether layer `i` ends with a ReLU.
    pub fn relu_at(&self, i: usize) -> bool {
        match self.relu.as_slice() {
            [single] => *single,
            flags => flags.get(i).copied().unwrap_or(false),
        }
    }

    pub fn validate(&self) -> HeadResult<()> {
        if self.channels.len() < 2 {
            return Err(HeadError::Config(format!(
                "mlp needs an input and at least one layer width, got {:?}",
                self.channels
            )));
        }
        if self.channels.contains(&0) {
            return Err(HeadError::Config(format!(
                "mlp widths must be positive, got {:?}",
                self.channels
            )));
        }
        if self.relu.len() != 1 && self.relu.len() != self.num_layers() {
            return Err(HeadError::Config(format!(
                "mlp relu flags must have 1 or {} entries, got {}",
                self.num_layers(),
                self.relu.len()
            )));
        }
        Ok(())
    }
}

/// Proposal head settings.
#[derive(Config, Debug)]
pub struct ProposalConfig {
    /// Input width followed by the hidden widths.
    #[config(default = "vec![128, 128]")]
    pub mlps: Vec<usize>,
    #[config(default = 100)]
    pub topk: usize,
}

/// Refinement head settings.
#[derive(Config, Debug)]
pub struct RefinementConfig {
    /// Input width (pooled feature channels) followed by the hidden widths.
    #[config(default = "vec![128, 256, 256]")]
    pub mlps: Vec<usize>,
    #[config(default = 100)]
    pub topk: usize,
    #[config(default = "BoxCoding::Additive")]
    pub coding: BoxCoding,
}

/// Configuration shared by both heads.
#[derive(Config, Debug)]
pub struct HeadConfig {
    /// Class count including the trailing background class.
    #[config(default = 4)]
    pub num_classes: usize,
    #[config(default = 7)]
    pub box_dof: usize,
    #[config(default = "FeatureLayout::ChannelsFirst")]
    pub layout: FeatureLayout,
    /// Minimum class probability for a detection to be reported.
    #[config(default = 0.0)]
    pub score_threshold: f32,
    /// Names of the foreground classes, in channel order.
    #[config(default = "vec![\"Car\".to_string(), \"Pedestrian\".to_string(), \"Cyclist\".to_string()]")]
    pub class_names: Vec<String>,
    #[config(default = "ProposalConfig::new()")]
    pub proposal: ProposalConfig,
    #[config(default = "RefinementConfig::new()")]
    pub refinement: RefinementConfig,
}

impl HeadConfig {
    /// KITTI setup: car, pedestrian, cyclist plus background, 7-DOF boxes.
    pub fn kitti() -> Self {
        Self::new()
    }

    /// KITTI classes with residual box coding in the refinement stage.
    pub fn kitti_residual() -> Self {
        Self::new().with_refinement(RefinementConfig::new().with_coding(BoxCoding::Residual))
    }

    /// Builds a preset by name.
    pub fn from_variant(variant: &str) -> HeadResult<Self> {
        match variant {
            "kitti" => Ok(Self::kitti()),
            "kitti-residual" => Ok(Self::kitti_residual()),
            _ => Err(HeadError::Config(format!(
                "unknown variant: {variant}. Use kitti or kitti-residual"
            ))),
        }
    }

    /// Loads a JSON config and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> HeadResult<Self> {
        let path = path.as_ref();
        let config = <Self as Config>::load(path)
            .map_err(|e| HeadError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Width of the raw head output: `num_classes * (box_dof + 1)`.
    pub fn head_channels(&self) -> usize {
        self.num_classes * (self.box_dof + 1)
    }

    /// MLP of a head: the given widths followed by the raw output layer.
    /// Every hidden layer gets a ReLU, the output layer stays linear.
    pub fn head_mlp(&self, mlps: &[usize]) -> MlpConfig {
        let mut channels = mlps.to_vec();
        channels.push(self.head_channels());
        let layers = channels.len().saturating_sub(1);
        let relu = (0..layers).map(|i| i + 1 < layers).collect();
        MlpConfig::new(channels)
            .with_bias(true)
            .with_batch_norm(false)
            .with_relu(relu)
    }

    pub fn proposal_mlp(&self) -> MlpConfig {
        self.head_mlp(&self.proposal.mlps)
    }

    pub fn refinement_mlp(&self) -> MlpConfig {
        self.head_mlp(&self.refinement.mlps)
    }

    /// Name of a foreground class, if one is configured.
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names.get(class_id).map(String::as_str)
    }

    pub fn validate(&self) -> HeadResult<()> {
        if self.num_classes < 2 {
            return Err(HeadError::Config(format!(
                "num_classes must count at least one foreground class plus background, got {}",
                self.num_classes
            )));
        }
        if self.box_dof == 0 {
            return Err(HeadError::Config("box_dof must be positive".to_string()));
        }
        if self.class_names.len() >= self.num_classes {
            return Err(HeadError::Config(format!(
                "{} class names for {} foreground classes",
                self.class_names.len(),
                self.num_classes - 1
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(HeadError::Config(format!(
                "score_threshold must lie in [0, 1], got {}",
                self.score_threshold
            )));
        }
        for (name, topk) in [
            ("proposal", self.proposal.topk),
            ("refinement", self.refinement.topk),
        ] {
            if topk == 0 {
                return Err(HeadError::Config(format!("{name} topk must be positive")));
            }
        }
        if self.refinement.coding == BoxCoding::Residual && self.box_dof != 7 {
            return Err(HeadError::Config(format!(
                "residual coding needs 7-DOF boxes, got {}",
                self.box_dof
            )));
        }
        self.proposal_mlp().validate()?;
        self.refinement_mlp().validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kitti_preset_is_valid() {
        let config = HeadConfig::kitti();
        config.validate().unwrap();
        assert_eq!(config.head_channels(), 4 * 8);
        assert_eq!(config.class_name(2), Some("Cyclist"));
        assert_eq!(config.class_name(3), None);
    }

    #[test]
    fn head_mlp_appends_output_layer_without_relu() {
        let config = HeadConfig::kitti();
        let mlp = config.proposal_mlp();
        assert_eq!(mlp.channels, vec![128, 128, 32]);
        assert_eq!(mlp.relu, vec![true, false]);
        assert!(mlp.bias);
        assert!(!mlp.batch_norm);

        let mlp = config.refinement_mlp();
        assert_eq!(mlp.channels, vec![128, 256, 256, 32]);
        assert_eq!(mlp.relu, vec![true, true, false]);
    }

    #[test]
    fn single_relu_flag_broadcasts() {
        let mlp = MlpConfig::new(vec![4, 8, 8]).with_relu(vec![false]);
        mlp.validate().unwrap();
        assert!(!mlp.relu_at(0));
        assert!(!mlp.relu_at(1));
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(HeadConfig::new().with_num_classes(1).validate().is_err());
        assert!(HeadConfig::new().with_box_dof(0).validate().is_err());
        assert!(HeadConfig::new()
            .with_proposal(ProposalConfig::new().with_topk(0))
            .validate()
            .is_err());
        assert!(HeadConfig::new()
            .with_proposal(ProposalConfig::new().with_mlps(vec![]))
            .validate()
            .is_err());
        assert!(HeadConfig::kitti_residual()
            .with_box_dof(9)
            .validate()
            .is_err());
        assert!(HeadConfig::new()
            .with_num_classes(3)
            .validate()
            .is_err());
        assert!(MlpConfig::new(vec![4, 8, 8])
            .with_relu(vec![true, false, true])
            .validate()
            .is_err());
    }

    #[test]
    fn variants() {
        assert_eq!(
            HeadConfig::from_variant("kitti-residual").unwrap().refinement.coding,
            BoxCoding::Residual
        );
        assert!(matches!(
            HeadConfig::from_variant("nuscenes"),
            Err(HeadError::Config(_))
        ));
    }

    #[test]
    fn layout_axes() {
        assert_eq!(FeatureLayout::ChannelsFirst.points_dim(), 2);
        assert_eq!(FeatureLayout::ChannelsFirst.channels_dim(), 1);
        assert_eq!(FeatureLayout::ChannelsLast.points_dim(), 1);
        assert_eq!(FeatureLayout::ChannelsLast.channels_dim(), 2);
    }
}
