//! Classification scores used as fitness.

use super::FitnessMeasure;

use ndarray::{ArrayView1, ArrayView2, Axis};
use thiserror::Error;
use tracing::warn;

/// Reasons a ROC curve cannot be computed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("labels and scores differ in length ({labels} vs {scores})")]
    LengthMismatch { labels: usize, scores: usize },
    #[error("labels must be 0 or 1")]
    NonBinaryLabels,
    #[error("scores must be finite")]
    NonFiniteScore,
    #[error("no positive samples")]
    NoPositives,
    #[error("no negative samples")]
    NoNegatives,
}

/// A receiver operating characteristic curve.
#[derive(Clone, Debug, PartialEq)]
pub struct RocCurve {
    /// False positive rates, non-decreasing.
    pub fpr: Vec<f64>,
    /// True positive rates, non-decreasing.
    pub tpr: Vec<f64>,
    /// Decision thresholds, decreasing. The first one is
    /// infinite and yields the (0, 0) point.
    pub thresholds: Vec<f64>,
}

/// Computes the ROC curve of binary `labels` against `scores`,
/// one point per distinct score.
///
/// # Examples
/// ```
/// use ndarray::arr1;
/// use neuvol::evaluation::metrics::{auc, roc_curve};
///
/// let curve = roc_curve(arr1(&[0.0, 0.0, 1.0, 1.0]).view(), arr1(&[0.1, 0.4, 0.35, 0.8]).view())
///     .unwrap();
/// assert_eq!(curve.fpr, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
/// assert_eq!(curve.tpr, vec![0.0, 0.5, 0.5, 1.0, 1.0]);
/// assert_eq!(auc(&curve.fpr, &curve.tpr), 0.75);
/// ```
pub fn roc_curve(
    labels: ArrayView1<'_, f32>,
    scores: ArrayView1<'_, f32>,
) -> Result<RocCurve, CurveError> {
    if labels.len() != scores.len() {
        return Err(CurveError::LengthMismatch {
            labels: labels.len(),
            scores: scores.len(),
        });
    }
    if labels.iter().any(|&l| l != 0.0 && l != 1.0) {
        return Err(CurveError::NonBinaryLabels);
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(CurveError::NonFiniteScore);
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fps = vec![0.0f64];
    let mut tps = vec![0.0f64];
    let mut thresholds = vec![f64::INFINITY];
    let (mut tp, mut fp) = (0.0, 0.0);
    for (rank, &i) in order.iter().enumerate() {
        if labels[i] == 1.0 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_score = order
            .get(rank + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_score {
            tps.push(tp);
            fps.push(fp);
            thresholds.push(f64::from(scores[i]));
        }
    }

    if tp == 0.0 {
        return Err(CurveError::NoPositives);
    }
    if fp == 0.0 {
        return Err(CurveError::NoNegatives);
    }
    Ok(RocCurve {
        fpr: fps.into_iter().map(|f| f / fp).collect(),
        tpr: tps.into_iter().map(|t| t / tp).collect(),
        thresholds,
    })
}

/// Area under a curve, by the trapezoidal rule.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum()
}

/// Index of the largest value of every row. Ties go
/// to the first index, and a NaN counts as the largest
/// value, so the first NaN of a row wins.
pub fn argmax_rows(matrix: ArrayView2<'_, f32>) -> Vec<usize> {
    matrix
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = (0, f32::NEG_INFINITY);
            for (i, &v) in row.iter().enumerate() {
                if v.is_nan() {
                    return i;
                }
                if v > best.1 {
                    best = (i, v);
                }
            }
            best.0
        })
        .collect()
}

/// Per-class F1 scores over the sorted union of the
/// labels in `real` and `predicted`.
///
/// A class whose score is undefined counts as 0.
pub fn f1_per_class(real: &[usize], predicted: &[usize]) -> Vec<f64> {
    let mut classes: Vec<usize> = real.iter().chain(predicted).copied().collect();
    classes.sort_unstable();
    classes.dedup();

    classes
        .into_iter()
        .map(|class| {
            let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
            for (&r, &p) in real.iter().zip(predicted) {
                match (r == class, p == class) {
                    (true, true) => tp += 1,
                    (false, true) => fp += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => {}
                }
            }
            if tp == 0 {
                0.0
            } else {
                (2 * tp) as f64 / (2 * tp + fp + fn_) as f64
            }
        })
        .collect()
}

/// Reduces predictions on labelled data to a single fitness
/// value, summing per-class scores.
///
/// For [`FitnessMeasure::Auc`], one-vs-rest curves are
/// computed for the columns `0..classes`; a class whose curve
/// cannot be computed contributes an area of 0.
///
/// # Examples
/// ```
/// use ndarray::arr2;
/// use neuvol::evaluation::{metrics::score_classification, FitnessMeasure};
///
/// let real = arr2(&[[1.0, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
/// let predicted = arr2(&[[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]]);
///
/// let f1 = score_classification(FitnessMeasure::F1, predicted.view(), real.view(), 2);
/// assert_eq!(f1, 2.0);
/// let auc = score_classification(FitnessMeasure::Auc, predicted.view(), real.view(), 2);
/// assert_eq!(auc, 2.0);
/// ```
pub fn score_classification(
    measure: FitnessMeasure,
    predicted: ArrayView2<'_, f32>,
    real: ArrayView2<'_, f32>,
    classes: usize,
) -> f32 {
    let total: f64 = match measure {
        FitnessMeasure::F1 => f1_per_class(&argmax_rows(real), &argmax_rows(predicted))
            .into_iter()
            .sum(),
        FitnessMeasure::Auc => (0..classes)
            .map(|class| {
                if class >= real.ncols() || class >= predicted.ncols() {
                    warn!("class {} has no prediction column, scoring it 0", class);
                    return 0.0;
                }
                match roc_curve(real.column(class), predicted.column(class)) {
                    Ok(curve) => auc(&curve.fpr, &curve.tpr),
                    Err(e) => {
                        warn!("ROC curve of class {} undefined ({}), scoring it 0", class, e);
                        0.0
                    }
                }
            })
            .sum(),
    };
    total as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn perfect_separation() {
        let curve = roc_curve(arr1(&[1.0, 0.0, 1.0, 0.0]).view(), arr1(&[1.0, 0.0, 1.0, 0.0]).view())
            .unwrap();
        assert_eq!(curve.fpr, vec![0.0, 0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0, 1.0]);
        assert_eq!(auc(&curve.fpr, &curve.tpr), 1.0);
    }

    #[test]
    fn inverted_scores() {
        let curve = roc_curve(arr1(&[1.0, 0.0]).view(), arr1(&[0.2, 0.9]).view()).unwrap();
        assert_eq!(auc(&curve.fpr, &curve.tpr), 0.0);
    }

    #[test]
    fn tied_scores_form_one_point() {
        let curve = roc_curve(arr1(&[1.0, 0.0, 1.0, 0.0]).view(), arr1(&[0.5; 4]).view()).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0]);
        assert_eq!(auc(&curve.fpr, &curve.tpr), 0.5);
    }

    #[test]
    fn undefined_curves() {
        let scores = arr1(&[0.1, 0.9]);
        assert_eq!(
            roc_curve(arr1(&[0.0, 0.0]).view(), scores.view()),
            Err(CurveError::NoPositives)
        );
        assert_eq!(
            roc_curve(arr1(&[1.0, 1.0]).view(), scores.view()),
            Err(CurveError::NoNegatives)
        );
        assert_eq!(
            roc_curve(arr1(&[1.0, 0.0]).view(), arr1(&[f32::NAN, 0.3]).view()),
            Err(CurveError::NonFiniteScore)
        );
        assert_eq!(
            roc_curve(arr1(&[0.5, 0.0]).view(), scores.view()),
            Err(CurveError::NonBinaryLabels)
        );
    }

    #[test]
    fn argmax_prefers_first_tie() {
        let m = arr2(&[[0.2, 0.5, 0.5], [0.9, 0.0, 0.1], [0.0, 0.0, 0.0]]);
        assert_eq!(argmax_rows(m.view()), vec![1, 0, 0]);
    }

    #[test]
    fn argmax_stops_at_first_nan() {
        let m = arr2(&[
            [0.2, f32::NAN, 0.9, f32::NAN],
            [f32::NAN, 1.0, 0.0, 0.0],
            [0.1, 0.3, f32::INFINITY, 0.2],
        ]);
        assert_eq!(argmax_rows(m.view()), vec![1, 0, 2]);
    }

    #[test]
    fn f1_over_label_union() {
        // Class 2 is only ever predicted, never real.
        let scores = f1_per_class(&[0, 0, 1, 1], &[0, 2, 1, 1]);
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(scores[1], 1.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn perfect_f1_counts_present_classes() {
        let labels = arr2(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let score = score_classification(FitnessMeasure::F1, labels.view(), labels.view(), 3);
        assert_eq!(score, 2.0);
    }

    #[test]
    fn absent_class_scores_zero_auc() {
        let real = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let predicted = arr2(&[[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.7, 0.2, 0.1], [0.3, 0.6, 0.1]]);
        let score = score_classification(FitnessMeasure::Auc, predicted.view(), real.view(), 3);
        assert_eq!(score, 2.0);

        // Asking for more classes than there are columns.
        let score = score_classification(FitnessMeasure::Auc, predicted.view(), real.view(), 4);
        assert_eq!(score, 2.0);
    }
}
