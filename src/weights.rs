//! Loading PyTorch-trained head weights from safetensors.

use std::path::Path;
use std::rc::Rc;

use burn::tensor::backend::Backend;
use burn::tensor::DType;
use burn_store::{ModuleAdapter, ModuleSnapshot, PyTorchToBurnAdapter, SafetensorsStore, TensorSnapshot};
use tracing::{info, warn};

use crate::error::{HeadError, Result};
use crate::pipeline::HeadModel;

/// Checkpoint key -> module path rewrites, applied in order.
///
/// The PyTorch heads live under `proposal_layer` / `refinement_layer` and name
/// their MLP children `linear{i}` / `batchnorm{i}`.
pub const KEY_REMAPPINGS: [(&str, &str); 4] = [
    (r"^proposal_layer\.", "proposal."),
    (r"^refinement_layer\.", "refinement."),
    (r"\.mlp\.linear(\d+)\.", ".mlp.layers.${1}.linear."),
    (r"\.mlp\.batchnorm(\d+)\.", ".mlp.layers.${1}.norm."),
];

/// PyTorch-to-Burn conversion (Linear transpose, BatchNorm gamma/beta names)
/// followed by an upcast of F16/BF16 tensors to F32.
#[derive(Debug, Clone, Default)]
pub struct PytorchF32Adapter {
    inner: PyTorchToBurnAdapter,
}

impl ModuleAdapter for PytorchF32Adapter {
    fn adapt(&self, snapshot: &TensorSnapshot) -> TensorSnapshot {
        upcast_f32(self.inner.adapt(snapshot))
    }

    fn get_alternative_param_name(&self, param_name: &str, container_type: &str) -> Option<String> {
        self.inner.get_alternative_param_name(param_name, container_type)
    }

    fn clone_box(&self) -> Box<dyn ModuleAdapter> {
        Box::new(self.clone())
    }
}

fn upcast_f32(snapshot: TensorSnapshot) -> TensorSnapshot {
    if snapshot.dtype == DType::F32 {
        return snapshot;
    }

    let data_fn = snapshot.clone_data_fn();
    TensorSnapshot::from_closure(
        Rc::new(move || Ok(data_fn()?.convert_dtype(DType::F32))),
        DType::F32,
        snapshot.shape.clone(),
        snapshot.path_stack.clone().unwrap_or_default(),
        snapshot.container_stack.clone().unwrap_or_default(),
        snapshot.tensor_id.unwrap_or_default(),
    )
}

/// Tensor counts of a weight load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightsReport {
    pub applied: usize,
    pub missing: usize,
    pub unused: usize,
}

/// Loads `path` into `model`.
///
/// With `allow_partial` unset, any head parameter missing from the file is an
/// error.
pub fn load_weights<B: Backend>(
    model: &mut HeadModel<B>,
    path: impl AsRef<Path>,
    allow_partial: bool,
) -> Result<WeightsReport> {
    let path = path.as_ref();
    info!("Loading head weights from: {}", path.display());

    let mut store = SafetensorsStore::from_file(path).with_from_adapter(PytorchF32Adapter::default());
    for (from, to) in KEY_REMAPPINGS {
        store = store.with_key_remapping(from, to);
    }
    let mut store = store.allow_partial(allow_partial).validate(true);

    let result = model
        .load_from(&mut store)
        .map_err(|e| HeadError::Weights(format!("{}: {}", path.display(), e)))?;

    let report = WeightsReport {
        applied: result.applied.len(),
        missing: result.missing.len(),
        unused: result.unused.len(),
    };
    if report.missing > 0 {
        warn!("Missing {} tensors: {:?}", report.missing, result.missing);
    }
    if report.unused > 0 {
        warn!("Unused {} tensors from file", report.unused);
    }
    info!(
        "WEIGHTS_SUMMARY applied={} missing={} unused={} partial_load={} validate=true",
        report.applied, report.missing, report.unused, allow_partial
    );

    Ok(report)
}
