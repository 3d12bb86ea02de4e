//! Cross-validated fitness evaluation.
//!
//! An [`Evaluator`] owns a labelled dataset and scores networks on
//! it: every network is trained once per fold in a fresh backend
//! session, the held-out predictions of all folds are pooled, and
//! the pool is reduced to a single fitness value by the configured
//! [`FitnessMeasure`].

mod config;
mod errors;
pub mod folds;
pub mod metrics;

pub use config::{Device, EvaluatorConfig, FitnessMeasure};
pub use errors::{EvaluationError, FoldError};

use crate::architecture::TaskType;
use crate::backend::{
    Backend, BackendError, DataPreparer, FitOptions, GeneratorOptions, Graph, Model, Network,
    PreparationRequest, Session,
};
use folds::{fold_splits, Fold};
use metrics::{argmax_rows, score_classification};

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::{debug, info, warn};

use std::time::Instant;

type ModelOf<B> = <<B as Backend>::Session as Session>::Model;

/// Scores networks by k-fold cross-validation on a fixed dataset.
///
/// `X` is the raw sample type, turned into tensors by the
/// preparer `P`. Training runs on the backend `B`.
pub struct Evaluator<X, P, B> {
    x: Vec<X>,
    y: Vec<usize>,
    config: EvaluatorConfig,
    preparer: P,
    backend: B,
}

impl<X, P, B> Evaluator<X, P, B>
where
    X: Clone,
    P: DataPreparer<X>,
    B: Backend,
{
    /// Creates an evaluator for samples `x` labelled with the
    /// class indices `y`. Other settings take their defaults.
    ///
    /// # Errors
    /// Returns an error if `device` is neither `"cpu"` nor `"gpu"`,
    /// or if `x` and `y` differ in length.
    pub fn new(
        x: Vec<X>,
        y: Vec<usize>,
        kfold_number: usize,
        device: &str,
        generator: bool,
        preparer: P,
        backend: B,
    ) -> Result<Self, EvaluationError> {
        let config = EvaluatorConfig {
            kfold_number,
            device: device.parse()?,
            generator,
            ..EvaluatorConfig::default()
        };
        Self::from_config(x, y, config, preparer, backend)
    }

    /// Creates an evaluator with the full set of settings.
    ///
    /// # Errors
    /// Returns an error if `x` and `y` differ in length.
    pub fn from_config(
        x: Vec<X>,
        y: Vec<usize>,
        config: EvaluatorConfig,
        preparer: P,
        backend: B,
    ) -> Result<Self, EvaluationError> {
        if x.len() != y.len() {
            return Err(EvaluationError::DatasetMismatch {
                samples: x.len(),
                labels: y.len(),
            });
        }
        Ok(Evaluator {
            x,
            y,
            config,
            preparer,
            backend,
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn kfold_number(&self) -> usize {
        self.config.kfold_number
    }

    pub fn device(&self) -> Device {
        self.config.device
    }

    /// Selects the training device by name.
    ///
    /// # Errors
    /// Returns an error, leaving the device unchanged, if `device`
    /// is neither `"cpu"` nor `"gpu"`.
    pub fn set_device(&mut self, device: &str) -> Result<(), EvaluationError> {
        self.config.device = device.parse()?;
        Ok(())
    }

    pub fn generator(&self) -> bool {
        self.config.generator
    }

    pub fn set_generator(&mut self, generator: bool) {
        self.config.generator = generator;
    }

    pub fn fitness_measure(&self) -> FitnessMeasure {
        self.config.fitness_measure
    }

    /// Selects the fitness measure by name, `"AUC"` or `"f1"`.
    ///
    /// # Errors
    /// Returns an error, leaving the measure unchanged, on any
    /// other name.
    pub fn set_fitness_measure(&mut self, measure: &str) -> Result<(), EvaluationError> {
        self.config.fitness_measure = measure.parse()?;
        Ok(())
    }

    pub fn early_stopping_min_delta(&self) -> f32 {
        self.config.early_stopping.min_delta
    }

    pub fn set_early_stopping_min_delta(&mut self, min_delta: f32) {
        self.config.early_stopping.min_delta = min_delta;
    }

    pub fn early_stopping_patience(&self) -> usize {
        self.config.early_stopping.patience
    }

    pub fn set_early_stopping_patience(&mut self, patience: usize) {
        self.config.early_stopping.patience = patience;
    }

    pub fn verbose(&self) -> u8 {
        self.config.verbose
    }

    pub fn set_verbose(&mut self, verbose: u8) {
        self.config.verbose = verbose;
    }

    pub fn create_tokens(&self) -> bool {
        self.config.create_tokens
    }

    pub fn set_create_tokens(&mut self, create_tokens: bool) {
        self.config.create_tokens = create_tokens;
    }

    /// Returns `(use_multiprocessing, workers)`.
    pub fn generator_concurrency(&self) -> (bool, usize) {
        (self.config.use_multiprocessing, self.config.workers)
    }

    pub fn set_generator_concurrency(&mut self, use_multiprocessing: bool, workers: usize) {
        self.config.use_multiprocessing = use_multiprocessing;
        self.config.workers = workers;
    }

    /// Scores `network` with the mode selected by the
    /// `generator` setting.
    ///
    /// # Errors
    /// See [`fit`](Self::fit) and [`fit_generator`](Self::fit_generator).
    pub fn evaluate<N: Network + ?Sized>(&self, network: &N) -> Result<f32, EvaluationError> {
        if self.config.generator {
            self.fit_generator(network)
        } else {
            self.fit(network)
        }
    }

    /// Scores `network` on the whole dataset prepared in memory.
    ///
    /// Folds are stratified on the prepared labels.
    ///
    /// # Errors
    /// Returns an error if the task is not a classification, if the
    /// data cannot be prepared or split, or if any fold fails to
    /// train or predict. A failing fold abandons the evaluation.
    pub fn fit<N: Network + ?Sized>(&self, network: &N) -> Result<f32, EvaluationError> {
        check_task(network)?;
        let started = Instant::now();
        let request = PreparationRequest::for_network(network, self.config.create_tokens);
        let (x, y) = self
            .preparer
            .process_data(&self.x, &self.y, &request)
            .map_err(EvaluationError::DataPreparation)?;

        let folds = fold_splits(&argmax_rows(y.view()), self.config.kfold_number)?;
        let options = self.fit_options(network);

        let mut predicted = Vec::with_capacity(folds.len());
        let mut real = Vec::with_capacity(folds.len());
        for (i, Fold { train, test }) in folds.iter().enumerate() {
            let (x_train, y_train) = (x.select(Axis(0), train), y.select(Axis(0), train));
            let (x_test, y_test) = (x.select(Axis(0), test), y.select(Axis(0), test));

            let fold_predictions = self.run_fold(i, network, |model| {
                model.fit(
                    x_train.view(),
                    y_train.view(),
                    (x_test.view(), y_test.view()),
                    &options,
                )?;
                model.predict(x_test.view())
            })?;
            predicted.push(fold_predictions);
            real.push(y_test);
        }
        debug!("trained {} folds in {:?}", folds.len(), started.elapsed());

        self.reduce(network, &predicted, &real)
    }

    /// Scores `network` with data streamed by batch generators.
    ///
    /// Folds are stratified on the raw labels, and every fold gets
    /// its own training and test generators.
    ///
    /// # Errors
    /// As for [`fit`](Self::fit); additionally fails if a label
    /// does not fit the network's class count.
    pub fn fit_generator<N: Network + ?Sized>(
        &self,
        network: &N,
    ) -> Result<f32, EvaluationError> {
        check_task(network)?;
        let started = Instant::now();
        let request = PreparationRequest::for_network(network, self.config.create_tokens);
        let folds = fold_splits(&self.y, self.config.kfold_number)?;
        let options = self.fit_options(network);

        let mut predicted = Vec::with_capacity(folds.len());
        let mut real = Vec::with_capacity(folds.len());
        for (i, Fold { train, test }) in folds.iter().enumerate() {
            let train_generator = self
                .preparer
                .generator(self.subset_x(train), self.subset_y(train), &request)
                .map_err(EvaluationError::DataPreparation)?;
            let test_generator = self
                .preparer
                .generator(self.subset_x(test), self.subset_y(test), &request)
                .map_err(EvaluationError::DataPreparation)?;

            let fold_predictions = self.run_fold(i, network, |model| {
                model.fit_generator(&train_generator, &test_generator, &options)?;
                model.predict_generator(&test_generator, &options.generator)
            })?;
            predicted.push(fold_predictions);
            real.push(one_hot(&self.subset_y(test), network.classes())?);
        }
        debug!("trained {} folds in {:?}", folds.len(), started.elapsed());

        self.reduce(network, &predicted, &real)
    }

    /// Reduces predictions to a fitness value with the configured
    /// measure. Both matrices hold one row per sample.
    pub fn test_classification(
        &self,
        predicted: ArrayView2<'_, f32>,
        real: ArrayView2<'_, f32>,
        classes: usize,
    ) -> f32 {
        score_classification(self.config.fitness_measure, predicted, real, classes)
    }

    fn fit_options<N: Network + ?Sized>(&self, network: &N) -> FitOptions {
        let training = network.training_parameters();
        FitOptions {
            batch_size: training.batchs,
            epochs: training.epochs,
            early_stopping: self.config.early_stopping.clone(),
            shuffle: true,
            verbose: self.config.verbose,
            generator: GeneratorOptions {
                workers: self.config.workers,
                use_multiprocessing: self.config.use_multiprocessing,
            },
        }
    }

    /// Trains and predicts one fold inside its own session.
    fn run_fold<N, F>(
        &self,
        fold: usize,
        network: &N,
        train_and_predict: F,
    ) -> Result<Array2<f32>, EvaluationError>
    where
        N: Network + ?Sized,
        F: FnOnce(&mut ModelOf<B>) -> Result<Array2<f32>, BackendError>,
    {
        debug!("fold {}: opening session on {}", fold, self.config.device);
        self.train_in_session(network, train_and_predict)
            .map_err(|e| {
                warn!("fold {} failed: {}", fold, e);
                EvaluationError::TrainingFailure(e)
            })
    }

    fn train_in_session<N, F>(
        &self,
        network: &N,
        train_and_predict: F,
    ) -> Result<Array2<f32>, BackendError>
    where
        N: Network + ?Sized,
        F: FnOnce(&mut ModelOf<B>) -> Result<Array2<f32>, BackendError>,
    {
        let mut session = self.backend.open_session(self.config.device)?;
        let Graph {
            mut model,
            optimizer,
            loss,
        } = session.init_graph(network)?;
        model.compile(optimizer, loss)?;
        train_and_predict(&mut model)
        // The model, then the session, are dropped here on every path.
    }

    fn reduce<N: Network + ?Sized>(
        &self,
        network: &N,
        predicted: &[Array2<f32>],
        real: &[Array2<f32>],
    ) -> Result<f32, EvaluationError> {
        let predicted = stack_rows(predicted)?;
        let real = stack_rows(real)?;
        if predicted.nrows() != real.nrows() {
            return Err(EvaluationError::PredictionShape(format!(
                "{} predictions for {} samples",
                predicted.nrows(),
                real.nrows()
            )));
        }
        let fitness = self.test_classification(predicted.view(), real.view(), network.classes());
        info!(
            "{} fitness over {} samples: {:.4}",
            match self.config.fitness_measure {
                FitnessMeasure::Auc => "AUC",
                FitnessMeasure::F1 => "f1",
            },
            real.nrows(),
            fitness
        );
        Ok(fitness)
    }

    fn subset_x(&self, indices: &[usize]) -> Vec<X> {
        indices.iter().map(|&i| self.x[i].clone()).collect()
    }

    fn subset_y(&self, indices: &[usize]) -> Vec<usize> {
        indices.iter().map(|&i| self.y[i]).collect()
    }
}

fn check_task<N: Network + ?Sized>(network: &N) -> Result<(), EvaluationError> {
    match network.task_type() {
        TaskType::Classification => Ok(()),
        other => Err(EvaluationError::UnsupportedTask(other)),
    }
}

fn stack_rows(parts: &[Array2<f32>]) -> Result<Array2<f32>, EvaluationError> {
    let views: Vec<ArrayView2<'_, f32>> = parts.iter().map(|part| part.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| EvaluationError::PredictionShape(e.to_string()))
}

fn one_hot(labels: &[usize], classes: usize) -> Result<Array2<f32>, EvaluationError> {
    let mut encoded = Array2::zeros((labels.len(), classes));
    for (row, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(EvaluationError::LabelOutOfRange { label, classes });
        }
        encoded[[row, label]] = 1.0;
    }
    Ok(encoded)
}
