//! Head output reshaping and top-k proposal selection.

use burn::tensor::backend::Backend;
use burn::tensor::{activation, Element, Int, Tensor, TensorData};

use crate::error::{HeadError, Result};

/// Candidates kept after top-k selection.
///
/// Scores are soft-maxed class probabilities; the last class is background.
#[derive(Debug, Clone)]
pub struct Proposals<B: Backend> {
    /// `[batch, k, classes, dof]`
    pub boxes: Tensor<B, 4>,
    /// `[batch, k, classes]`
    pub scores: Tensor<B, 3>,
    /// Index of the source point (or proposal) of each candidate, `[batch, k]`.
    pub indices: Tensor<B, 2, Int>,
    /// Coordinates of the source points, `[batch, k, 3]`.
    pub points: Tensor<B, 3>,
}

/// A single candidate read back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub batch: usize,
    /// Index of the keypoint (or proposal) the box was regressed from.
    pub point_index: usize,
    /// Best foreground class.
    pub class_id: usize,
    pub class_name: Option<String>,
    /// Probability of `class_id`.
    pub score: f32,
    /// Box parameters of `class_id`.
    pub bbox: Vec<f32>,
}

impl<B: Backend> Proposals<B> {
    /// Candidates per batch element.
    pub fn topk(&self) -> usize {
        self.boxes.dims()[1]
    }

    pub fn num_classes(&self) -> usize {
        self.boxes.dims()[2]
    }

    pub fn box_dof(&self) -> usize {
        self.boxes.dims()[3]
    }

    /// Moves the candidates to the host.
    ///
    /// Each candidate is labeled with its most probable foreground class and
    /// kept when that probability reaches `score_threshold`. The order follows
    /// the selection: batch by batch, strongest foreground first.
    pub fn detections(&self, score_threshold: f32, class_names: &[String]) -> Result<Vec<Detection>> {
        let [batch, k, classes, dof] = self.boxes.dims();
        let boxes: Vec<f32> = host_vec(self.boxes.clone().into_data())?;
        let scores: Vec<f32> = host_vec(self.scores.clone().into_data())?;
        let indices: Vec<i64> = host_vec(self.indices.clone().into_data())?;

        let mut detections = Vec::new();
        for b in 0..batch {
            for i in 0..k {
                let row = (b * k + i) * classes;
                let foreground = &scores[row..row + classes - 1];
                let Some((class_id, &score)) = foreground
                    .iter()
                    .enumerate()
                    .max_by(|a, c| a.1.total_cmp(c.1))
                else {
                    continue;
                };
                if score < score_threshold {
                    continue;
                }

                let start = (row + class_id) * dof;
                detections.push(Detection {
                    batch: b,
                    point_index: indices[b * k + i] as usize,
                    class_id,
                    class_name: class_names.get(class_id).cloned(),
                    score,
                    bbox: boxes[start..start + dof].to_vec(),
                });
            }
        }

        Ok(detections)
    }
}

fn host_vec<E: Element>(data: TensorData) -> Result<Vec<E>> {
    data.convert::<E>()
        .to_vec::<E>()
        .map_err(|e| HeadError::Data(format!("{:?}", e)))
}

/// Splits raw head output `[batch, n, classes * (dof + 1)]` into boxes
/// `[batch, n, classes, dof]` and score logits `[batch, n, classes]`.
pub fn reorganize_proposals<B: Backend>(
    raw: Tensor<B, 3>,
    num_classes: usize,
    box_dof: usize,
) -> (Tensor<B, 4>, Tensor<B, 3>) {
    let [b, n, _] = raw.dims();
    let raw: Tensor<B, 4> = raw.reshape([b, n, num_classes, box_dof + 1]);
    let boxes = raw.clone().narrow(3, 0, box_dof);
    let scores = raw.narrow(3, box_dof, 1).reshape([b, n, num_classes]);
    (boxes, scores)
}

/// Keeps the `k` candidates per batch with the highest foreground probability
/// `1 - p(background)` and gathers their class-conditional boxes, scores and
/// points.
pub fn select_topk<B: Backend>(
    points: Tensor<B, 3>,
    boxes: Tensor<B, 4>,
    logits: Tensor<B, 3>,
    k: usize,
) -> Result<Proposals<B>> {
    let [batch, n, classes, dof] = boxes.dims();
    if logits.dims() != [batch, n, classes] {
        return Err(HeadError::shape(
            "score logits",
            format!("{:?}", [batch, n, classes]),
            format!("{:?}", logits.dims()),
        ));
    }
    let [pb, pn, coords] = points.dims();
    if pb != batch || pn != n {
        return Err(HeadError::shape(
            "points",
            format!("[{batch}, {n}, _]"),
            format!("{:?}", points.dims()),
        ));
    }
    if k == 0 || k > n {
        return Err(HeadError::TopK { k, available: n });
    }

    let scores = activation::softmax(logits, 2);
    let positive = scores.clone().narrow(2, classes - 1, 1).neg().add_scalar(1.0); // [b, n, 1]
    let (_, indices) = positive.topk_with_indices(k, 1); // [b, k, 1]

    let class_indices = indices.clone().repeat_dim(2, classes);
    let box_indices = class_indices
        .clone()
        .unsqueeze_dim::<4>(3)
        .repeat_dim(3, dof);
    let point_indices = indices.clone().repeat_dim(2, coords);

    Ok(Proposals {
        boxes: boxes.gather(1, box_indices),
        scores: scores.gather(1, class_indices),
        indices: indices.reshape([batch, k]),
        points: points.gather(1, point_indices),
    })
}
