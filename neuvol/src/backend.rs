//! Interfaces between the fitness evaluator and the runtime that
//! actually builds, trains and runs networks.
//!
//! A [`Backend`] hands out one [`Session`] per fold. The session owns
//! the device and graph state of that fold and releases it when
//! dropped. Inside it, [`Session::init_graph`] turns a [`Network`] into
//! a [`Model`] plus the optimizer and loss it is compiled with. Raw data
//! is turned into tensors by a [`DataPreparer`], either all at once or
//! as a [`BatchGenerator`].

mod early_stopping;
mod errors;

pub use early_stopping::{EarlyStopping, EarlyStoppingTracker, Monitor};
pub use errors::BackendError;

use crate::architecture::{
    DataProcessing, DataType, Genotype, Individual, LayerGene, TaskType, TrainingParameters,
};
use crate::evaluation::Device;

use ndarray::{Array2, ArrayView2};

/// A genotype-bearing object the evaluator can train.
pub trait Network {
    fn data_type(&self) -> DataType;

    fn task_type(&self) -> TaskType;

    fn genotype(&self) -> &Genotype;

    /// Number of target classes.
    fn classes(&self) -> usize;

    fn architecture(&self) -> &[LayerGene] {
        self.genotype().architecture()
    }

    fn training_parameters(&self) -> &TrainingParameters {
        self.genotype().training_parameters()
    }

    fn data_processing(&self) -> &DataProcessing {
        self.genotype().data_processing()
    }
}

impl Network for Individual {
    fn data_type(&self) -> DataType {
        Individual::data_type(self)
    }

    fn task_type(&self) -> TaskType {
        Individual::task_type(self)
    }

    fn genotype(&self) -> &Genotype {
        Individual::genotype(self)
    }

    fn classes(&self) -> usize {
        self.options().classes
    }
}

/// A source of per-fold training sessions.
pub trait Backend {
    type Session: Session;

    /// Acquires a fresh training context on `device`.
    ///
    /// All resources of the context must be released
    /// when the returned session is dropped.
    fn open_session(&self, device: Device) -> Result<Self::Session, BackendError>;
}

/// A model together with what it must be compiled with.
pub struct Graph<M: Model> {
    pub model: M,
    pub optimizer: M::Optimizer,
    pub loss: M::Loss,
}

/// A scoped training context.
pub trait Session {
    type Model: Model;

    /// Builds the model described by `network`'s genotype.
    fn init_graph<N: Network + ?Sized>(
        &mut self,
        network: &N,
    ) -> Result<Graph<Self::Model>, BackendError>;
}

/// Concurrency settings for generator-fed training and prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Number of concurrent batch producers.
    pub workers: usize,
    /// Whether producers run concurrently at all.
    pub use_multiprocessing: bool,
}

/// Settings of a single `fit` call.
#[derive(Clone, Debug, PartialEq)]
pub struct FitOptions {
    pub batch_size: usize,
    pub epochs: usize,
    pub early_stopping: EarlyStopping,
    /// Shuffle training samples every epoch.
    pub shuffle: bool,
    pub verbose: u8,
    pub generator: GeneratorOptions,
}

/// Per-epoch losses recorded during training.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    pub loss: Vec<f32>,
    pub val_loss: Vec<f32>,
    /// Epoch at which early stopping ended training, if it did.
    pub stopped_epoch: Option<usize>,
}

/// A trainable model.
pub trait Model {
    type Optimizer;
    type Loss;

    fn compile(&mut self, optimizer: Self::Optimizer, loss: Self::Loss)
        -> Result<(), BackendError>;

    /// Trains on in-memory tensors, validating on `validation`
    /// after every epoch.
    fn fit(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
        validation: (ArrayView2<'_, f32>, ArrayView2<'_, f32>),
        options: &FitOptions,
    ) -> Result<TrainingHistory, BackendError>;

    /// Trains on batches produced by `train`, validating on
    /// the batches of `validation` after every epoch.
    fn fit_generator<G: BatchGenerator>(
        &mut self,
        train: &G,
        validation: &G,
        options: &FitOptions,
    ) -> Result<TrainingHistory, BackendError>;

    /// Returns one row of outputs per row of `x`.
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, BackendError>;

    /// Returns the outputs for every batch of `generator`,
    /// stacked in batch order.
    fn predict_generator<G: BatchGenerator>(
        &self,
        generator: &G,
        options: &GeneratorOptions,
    ) -> Result<Array2<f32>, BackendError>;
}

/// What a data preparer needs to know about the network it feeds.
#[derive(Clone, Debug)]
pub struct PreparationRequest<'a> {
    pub data_type: DataType,
    pub task_type: TaskType,
    pub data_processing: &'a DataProcessing,
    /// Prepare token ids rather than numeric sequences.
    pub create_tokens: bool,
    pub classes: usize,
    pub batch_size: usize,
}

impl<'a> PreparationRequest<'a> {
    /// Collects the preparation settings of `network`.
    pub fn for_network<N: Network + ?Sized>(network: &'a N, create_tokens: bool) -> Self {
        PreparationRequest {
            data_type: network.data_type(),
            task_type: network.task_type(),
            data_processing: network.data_processing(),
            create_tokens,
            classes: network.classes(),
            batch_size: network.training_parameters().batchs,
        }
    }
}

/// Turns raw samples of type `X` and their class labels
/// into training tensors.
pub trait DataPreparer<X> {
    type Generator: BatchGenerator;

    /// Prepares the whole dataset at once. Labels
    /// are returned one-hot encoded.
    fn process_data(
        &self,
        x: &[X],
        y: &[usize],
        request: &PreparationRequest<'_>,
    ) -> Result<(Array2<f32>, Array2<f32>), BackendError>;

    /// Returns a generator producing the dataset in batches.
    fn generator(
        &self,
        x: Vec<X>,
        y: Vec<usize>,
        request: &PreparationRequest<'_>,
    ) -> Result<Self::Generator, BackendError>;
}

/// An indexable sequence of `(x, y)` batches.
///
/// Batches can be requested in any order and from
/// several threads at once.
pub trait BatchGenerator: Sync {
    /// Number of batches.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn batch(&self, index: usize) -> Result<(Array2<f32>, Array2<f32>), BackendError>;
}
