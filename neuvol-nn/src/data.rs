use neuvol::backend::{BackendError, BatchGenerator, DataPreparer, PreparationRequest};

use ndarray::{s, Array2};
use tracing::trace;

/// Prepares numeric sequences: text already turned into numbers,
/// or flattened images.
///
/// Every sample is padded with zeros or truncated to the request's
/// `sentences_length`, and labels are one-hot encoded over its
/// `classes`. Samples are numeric already, so `create_tokens` has
/// no effect on them.
///
/// # Examples
/// ```
/// use neuvol::architecture::{cradle, IndividualOptions};
/// use neuvol::backend::{DataPreparer, PreparationRequest};
/// use neuvol_nn::SequencePreparer;
///
/// let individ = cradle(0, "text", "classification", None, false, IndividualOptions { classes: 3 })
///     .unwrap();
/// let request = PreparationRequest::for_network(&individ, true);
///
/// let (x, y) = SequencePreparer
///     .process_data(&[vec![1.0, 2.0], vec![3.0]], &[2, 0], &request)
///     .unwrap();
/// assert_eq!(x.dim(), (2, individ.data_processing().sentences_length));
/// assert_eq!(y.row(0).to_vec(), vec![0.0, 0.0, 1.0]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SequencePreparer;

impl SequencePreparer {
    fn tensors(
        x: &[Vec<f32>],
        y: &[usize],
        width: usize,
        classes: usize,
    ) -> Result<(Array2<f32>, Array2<f32>), BackendError> {
        if x.len() != y.len() {
            return Err(BackendError::Data(format!(
                "{} samples but {} labels",
                x.len(),
                y.len()
            )));
        }

        let mut inputs = Array2::zeros((x.len(), width));
        for (mut row, sample) in inputs.rows_mut().into_iter().zip(x) {
            let kept = sample.len().min(width);
            for (cell, &value) in row.iter_mut().zip(&sample[..kept]) {
                *cell = value;
            }
        }

        let mut targets = Array2::zeros((y.len(), classes));
        for (row, &label) in y.iter().enumerate() {
            if label >= classes {
                return Err(BackendError::Data(format!(
                    "label {} out of range for {} classes",
                    label, classes
                )));
            }
            targets[[row, label]] = 1.0;
        }
        Ok((inputs, targets))
    }
}

impl DataPreparer<Vec<f32>> for SequencePreparer {
    type Generator = SequenceGenerator;

    fn process_data(
        &self,
        x: &[Vec<f32>],
        y: &[usize],
        request: &PreparationRequest<'_>,
    ) -> Result<(Array2<f32>, Array2<f32>), BackendError> {
        trace!(
            "preparing {} {} samples of length {}",
            x.len(),
            request.data_type,
            request.data_processing.sentences_length
        );
        Self::tensors(
            x,
            y,
            request.data_processing.sentences_length,
            request.classes,
        )
    }

    fn generator(
        &self,
        x: Vec<Vec<f32>>,
        y: Vec<usize>,
        request: &PreparationRequest<'_>,
    ) -> Result<SequenceGenerator, BackendError> {
        let (inputs, targets) = self.process_data(&x, &y, request)?;
        SequenceGenerator::new(inputs, targets, request.batch_size)
    }
}

/// Serves prepared rows in consecutive batches of fixed size.
/// The last batch may be smaller.
#[derive(Clone, Debug)]
pub struct SequenceGenerator {
    x: Array2<f32>,
    y: Array2<f32>,
    batch_size: usize,
}

impl SequenceGenerator {
    /// # Errors
    /// Returns an error if `x` and `y` differ in row count, or if
    /// `batch_size` is 0.
    pub fn new(
        x: Array2<f32>,
        y: Array2<f32>,
        batch_size: usize,
    ) -> Result<SequenceGenerator, BackendError> {
        if x.nrows() != y.nrows() {
            return Err(BackendError::Shape(format!(
                "{} samples but {} targets",
                x.nrows(),
                y.nrows()
            )));
        }
        if batch_size == 0 {
            return Err(BackendError::Data("batch size must be positive".into()));
        }
        Ok(SequenceGenerator { x, y, batch_size })
    }

    pub fn samples(&self) -> usize {
        self.x.nrows()
    }
}

impl BatchGenerator for SequenceGenerator {
    fn len(&self) -> usize {
        (self.x.nrows() + self.batch_size - 1) / self.batch_size
    }

    fn batch(&self, index: usize) -> Result<(Array2<f32>, Array2<f32>), BackendError> {
        if index >= self.len() {
            return Err(BackendError::Data(format!(
                "batch {} out of range, {} batches",
                index,
                self.len()
            )));
        }
        let start = index * self.batch_size;
        let end = (start + self.batch_size).min(self.x.nrows());
        Ok((
            self.x.slice(s![start..end, ..]).to_owned(),
            self.y.slice(s![start..end, ..]).to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn pads_and_truncates() {
        let (x, y) =
            SequencePreparer::tensors(&[vec![1.0, 2.0, 3.0, 4.0], vec![5.0], vec![]], &[1, 0, 1], 3, 2)
                .unwrap();
        assert_eq!(
            x,
            arr2(&[[1.0, 2.0, 3.0], [5.0, 0.0, 0.0], [0.0, 0.0, 0.0]])
        );
        assert_eq!(y, arr2(&[[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]));
    }

    #[test]
    fn rejects_bad_labels() {
        let result = SequencePreparer::tensors(&[vec![1.0]], &[2], 1, 2);
        assert!(matches!(result, Err(BackendError::Data(_))));
        let result = SequencePreparer::tensors(&[vec![1.0]], &[], 1, 2);
        assert!(matches!(result, Err(BackendError::Data(_))));
    }

    #[test]
    fn batches_cover_every_row() {
        let x = Array2::from_shape_fn((7, 2), |(i, j)| (i * 2 + j) as f32);
        let y = Array2::zeros((7, 1));
        let generator = SequenceGenerator::new(x, y, 3).unwrap();

        assert_eq!(generator.len(), 3);
        assert_eq!(generator.batch(0).unwrap().0.nrows(), 3);
        let (last, _) = generator.batch(2).unwrap();
        assert_eq!(last, arr2(&[[12.0, 13.0]]));
        assert!(generator.batch(3).is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let result = SequenceGenerator::new(Array2::zeros((2, 1)), Array2::zeros((2, 1)), 0);
        assert!(result.is_err());
    }
}
