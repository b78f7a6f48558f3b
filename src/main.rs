mod args;

use anyhow::{Context, Result};
use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use clap::Parser;
use tracing::info;

use pvrcnn_burn::config::{FeatureLayout, HeadConfig};
use pvrcnn_burn::pipeline::{DefaultBackend, HeadPipeline};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = args::Args::parse();

    let mut config = match &args.config {
        Some(path) => HeadConfig::from_file(path)?,
        None => HeadConfig::from_variant(&args.variant)?,
    };
    if let Some(k) = args.proposal_topk {
        config.proposal.topk = k;
    }
    if let Some(k) = args.refinement_topk {
        config.refinement.topk = k;
    }
    if let Some(threshold) = args.score_threshold {
        config.score_threshold = threshold;
    }
    config.validate()?;

    if let Some(path) = &args.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Config written to {}", path.display());
    }

    let device = <DefaultBackend as Backend>::Device::default();
    let channels = config.proposal.mlps[0];
    let layout = config.layout.clone();

    let mut pipeline = HeadPipeline::<DefaultBackend>::new(config, device.clone())?;
    if let Some(path) = &args.weights {
        let report = pipeline.load_weights(path, args.allow_partial)?;
        println!(
            "Weights loaded: applied={} missing={} unused={}",
            report.applied, report.missing, report.unused
        );
    } else {
        println!("No weights given, running with randomly initialized heads");
    }

    // Stand-ins for the keypoints and features of the set-abstraction stage
    let points = Tensor::<DefaultBackend, 3>::random(
        [args.batch, args.points, 3],
        Distribution::Uniform(-40.0, 40.0),
        &device,
    );
    let shape = match layout {
        FeatureLayout::ChannelsFirst => [args.batch, channels, args.points],
        FeatureLayout::ChannelsLast => [args.batch, args.points, channels],
    };
    let features = Tensor::<DefaultBackend, 3>::random(shape, Distribution::Normal(0.0, 1.0), &device);

    let detections = pipeline.process(points, features)?;

    println!("{} detections", detections.len());
    for det in &detections {
        let box_str = det
            .bbox
            .iter()
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  [{}] keypoint {:>5} {:<10} {:.3} box=[{}]",
            det.batch,
            det.point_index,
            det.class_name.as_deref().unwrap_or("?"),
            det.score,
            box_str
        );
    }

    Ok(())
}
