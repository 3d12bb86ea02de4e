//! Cross-validation splits.

use super::FoldError;

use ahash::RandomState;

use std::collections::HashMap;

use tracing::warn;

/// Sample indices of one cross-validation round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits the samples into `k` folds that preserve the class
/// proportions of `labels`.
///
/// Samples are not shuffled. Each fold is tested once while
/// the remaining folds are trained on.
///
/// # Errors
/// Returns an error if `k < 2`, if there are fewer samples than
/// folds, or if no class has at least `k` members.
///
/// # Examples
/// ```
/// use neuvol::evaluation::folds::stratified_k_fold;
///
/// let labels = [0, 0, 1, 1, 0, 1];
/// let folds = stratified_k_fold(&labels, 3).unwrap();
/// assert_eq!(folds.len(), 3);
/// for fold in &folds {
///     let classes: Vec<_> = fold.test.iter().map(|&i| labels[i]).collect();
///     assert_eq!(classes.iter().filter(|&&c| c == 1).count(), 1);
/// }
/// ```
pub fn stratified_k_fold(labels: &[usize], k: usize) -> Result<Vec<Fold>, FoldError> {
    if k < 2 {
        return Err(FoldError::InvalidFoldCount(k));
    }
    if k > labels.len() {
        return Err(FoldError::TooFewSamples {
            folds: k,
            samples: labels.len(),
        });
    }

    // Classes are numbered in order of first appearance.
    let mut codes: HashMap<usize, usize, RandomState> = HashMap::default();
    let encoded: Vec<usize> = labels
        .iter()
        .map(|label| {
            let next = codes.len();
            *codes.entry(*label).or_insert(next)
        })
        .collect();
    let n_classes = codes.len();

    let mut counts = vec![0; n_classes];
    for &class in &encoded {
        counts[class] += 1;
    }
    if counts.iter().all(|&count| count < k) {
        return Err(FoldError::TooFewClassMembers(k));
    }
    if let Some(&least) = counts.iter().min().filter(|&&least| least < k) {
        warn!(
            "the least populated class has only {} members, fewer than {} folds",
            least, k
        );
    }

    // Deal the class-sorted samples round-robin to find how many
    // members of each class every fold receives.
    let mut sorted = encoded.clone();
    sorted.sort_unstable();
    let mut allocation = vec![vec![0usize; n_classes]; k];
    for (i, &class) in sorted.iter().enumerate() {
        allocation[i % k][class] += 1;
    }

    let mut test_folds = vec![0; labels.len()];
    for class in 0..n_classes {
        let assignments =
            (0..k).flat_map(|fold| std::iter::repeat(fold).take(allocation[fold][class]));
        let members = encoded
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c == class)
            .map(|(i, _)| i);
        for (sample, fold) in members.zip(assignments) {
            test_folds[sample] = fold;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| test_folds[i] == fold);
            Fold { train, test }
        })
        .collect())
}

/// Returns a single fold training and testing on all `n` samples.
pub fn single_fold(n: usize) -> Vec<Fold> {
    vec![Fold {
        train: (0..n).collect(),
        test: (0..n).collect(),
    }]
}

/// Returns the folds used for `k`-fold cross-validation of `labels`.
///
/// A single fold trains and tests on the whole dataset.
///
/// # Errors
/// Returns an error if `k` is 0, or if stratification fails.
pub fn fold_splits(labels: &[usize], k: usize) -> Result<Vec<Fold>, FoldError> {
    match k {
        0 => Err(FoldError::InvalidFoldCount(0)),
        1 => Ok(single_fold(labels.len())),
        _ => stratified_k_fold(labels, k),
    }
}
