//! Applying regressed deltas to proposal boxes.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::BoxCoding;

/// Decodes refinement `deltas` against `proposals`, both `[batch, k, classes, dof]`.
pub fn apply_refinements<B: Backend>(
    coding: &BoxCoding,
    deltas: Tensor<B, 4>,
    proposals: Tensor<B, 4>,
) -> Tensor<B, 4> {
    match coding {
        BoxCoding::Additive => proposals + deltas,
        BoxCoding::Residual => decode_residual(deltas, proposals),
    }
}

/// `[x, y, z, dx, dy, dz, heading]` residual decoding.
fn decode_residual<B: Backend>(deltas: Tensor<B, 4>, proposals: Tensor<B, 4>) -> Tensor<B, 4> {
    let part = |t: &Tensor<B, 4>, i: usize| t.clone().narrow(3, i, 1);

    let (xa, ya, za) = (part(&proposals, 0), part(&proposals, 1), part(&proposals, 2));
    let (dxa, dya, dza) = (part(&proposals, 3), part(&proposals, 4), part(&proposals, 5));
    let ra = part(&proposals, 6);

    let diagonal = (dxa.clone().powf_scalar(2.0) + dya.clone().powf_scalar(2.0)).sqrt();

    let x = xa + part(&deltas, 0) * diagonal.clone();
    let y = ya + part(&deltas, 1) * diagonal;
    let z = za + part(&deltas, 2) * dza.clone();
    let dx = dxa * part(&deltas, 3).exp();
    let dy = dya * part(&deltas, 4).exp();
    let dz = dza * part(&deltas, 5).exp();
    let r = ra + part(&deltas, 6);

    Tensor::cat(vec![x, y, z, dx, dy, dz, r], 3)
}
