use super::{Activation, Loss, Optimizer};

use neuvol::backend::{
    BackendError, BatchGenerator, EarlyStoppingTracker, FitOptions, GeneratorOptions, Model,
    Monitor, TrainingHistory,
};

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, trace};

/// Lower bound on predicted probabilities inside logarithms.
const EPSILON: f32 = 1e-7;

type Batch = (Array2<f32>, Array2<f32>);

struct DenseLayer {
    /// One row per input, one column per unit.
    weights: Array2<f32>,
    biases: Array1<f32>,
    activation: Activation,
    weight_velocity: Array2<f32>,
    bias_velocity: Array1<f32>,
}

impl DenseLayer {
    fn new(inputs: usize, units: usize, activation: Activation, rng: &mut StdRng) -> DenseLayer {
        let limit = (6.0 / (inputs + units) as f32).sqrt();
        DenseLayer {
            weights: Array2::from_shape_fn((inputs, units), |_| rng.gen_range(-limit..limit)),
            biases: Array1::zeros(units),
            activation,
            weight_velocity: Array2::zeros((inputs, units)),
            bias_velocity: Array1::zeros(units),
        }
    }

    fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut z = input.dot(&self.weights) + &self.biases;
        self.activation.apply(&mut z);
        z
    }

    fn step(
        &mut self,
        weight_gradient: &Array2<f32>,
        bias_gradient: &Array1<f32>,
        optimizer: Optimizer,
    ) {
        match optimizer {
            Optimizer::Sgd { learning_rate } => {
                self.weights.scaled_add(-learning_rate, weight_gradient);
                self.biases.scaled_add(-learning_rate, bias_gradient);
            }
            Optimizer::Momentum {
                learning_rate,
                momentum,
            } => {
                self.weight_velocity *= momentum;
                self.weight_velocity.scaled_add(-learning_rate, weight_gradient);
                self.weights += &self.weight_velocity;
                self.bias_velocity *= momentum;
                self.bias_velocity.scaled_add(-learning_rate, bias_gradient);
                self.biases += &self.bias_velocity;
            }
        }
    }
}

/// A fully connected feed-forward classifier: ReLU hidden
/// layers followed by a softmax output layer.
///
/// The network must be compiled with an optimizer before it
/// can be trained.
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
    compiled: Option<(Optimizer, Loss)>,
    rng: StdRng,
}

impl DenseNetwork {
    /// Creates a network with randomly initialized weights.
    ///
    /// `hidden` lists the unit counts of the hidden layers, in order.
    ///
    /// # Examples
    /// ```
    /// use neuvol_nn::networks::DenseNetwork;
    /// use rand::{rngs::StdRng, SeedableRng};
    ///
    /// let network = DenseNetwork::new(10, &[32, 16], 3, StdRng::seed_from_u64(0));
    /// assert_eq!(network.input_width(), 10);
    /// assert_eq!(network.output_width(), 3);
    /// assert_eq!(network.depth(), 3);
    /// ```
    pub fn new(inputs: usize, hidden: &[usize], outputs: usize, mut rng: StdRng) -> DenseNetwork {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = inputs;
        for &units in hidden {
            layers.push(DenseLayer::new(width, units, Activation::Relu, &mut rng));
            width = units;
        }
        layers.push(DenseLayer::new(width, outputs, Activation::Softmax, &mut rng));
        DenseNetwork {
            layers,
            compiled: None,
            rng,
        }
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.weights.nrows())
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.weights.ncols())
    }

    /// Number of weight layers, the output layer included.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Returns the optimizer and loss the network was compiled with.
    pub fn compiled(&self) -> Option<(Optimizer, Loss)> {
        self.compiled
    }

    /// Returns the input followed by the output of every layer.
    fn forward(&self, x: ArrayView2<'_, f32>) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(x.to_owned());
        for layer in &self.layers {
            let next = layer.forward(activations[activations.len() - 1].view());
            activations.push(next);
        }
        activations
    }

    fn output(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        self.layers
            .iter()
            .fold(x.to_owned(), |input, layer| layer.forward(input.view()))
    }

    /// Runs one gradient step and returns the batch's loss
    /// before the update.
    fn train_batch(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
        optimizer: Optimizer,
    ) -> Result<f32, BackendError> {
        let activations = self.forward(x);
        let output = &activations[activations.len() - 1];
        let loss = cross_entropy(output.view(), y);
        if !loss.is_finite() {
            return Err(BackendError::Diverged(format!("loss is {}", loss)));
        }

        // Softmax with cross-entropy: the output gradient is p - y.
        let mut delta = (output - &y) / x.nrows() as f32;
        for (l, layer) in self.layers.iter_mut().enumerate().rev() {
            let input = &activations[l];
            let weight_gradient = input.t().dot(&delta);
            let bias_gradient = delta.sum_axis(Axis(0));
            if l > 0 {
                let mut previous = delta.dot(&layer.weights.t());
                previous.zip_mut_with(input, |d, &a| {
                    if a <= 0.0 {
                        *d = 0.0;
                    }
                });
                delta = previous;
            }
            layer.step(&weight_gradient, &bias_gradient, optimizer);
        }
        Ok(loss)
    }

    fn check_pair(
        &self,
        x: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
    ) -> Result<(), BackendError> {
        self.check_input(x)?;
        if y.ncols() != self.output_width() {
            return Err(BackendError::Shape(format!(
                "expected {} target columns, found {}",
                self.output_width(),
                y.ncols()
            )));
        }
        if x.nrows() != y.nrows() {
            return Err(BackendError::Shape(format!(
                "{} samples but {} targets",
                x.nrows(),
                y.nrows()
            )));
        }
        Ok(())
    }

    fn check_input(&self, x: ArrayView2<'_, f32>) -> Result<(), BackendError> {
        if x.ncols() != self.input_width() {
            return Err(BackendError::Shape(format!(
                "expected {} input columns, found {}",
                self.input_width(),
                x.ncols()
            )));
        }
        Ok(())
    }

    fn optimizer(&self) -> Result<Optimizer, BackendError> {
        self.compiled
            .map(|(optimizer, _)| optimizer)
            .ok_or(BackendError::NotCompiled)
    }

    /// Mean loss over every batch of `generator`, or
    /// `None` if it holds no samples.
    fn generator_loss<G: BatchGenerator>(
        &self,
        generator: &G,
        pool: Option<&ThreadPool>,
    ) -> Result<Option<f32>, BackendError> {
        let (mut total, mut seen) = (0.0, 0);
        for (x, y) in fetch_batches(generator, pool)? {
            self.check_pair(x.view(), y.view())?;
            total += cross_entropy(self.output(x.view()).view(), y.view()) * x.nrows() as f32;
            seen += x.nrows();
        }
        Ok((seen > 0).then(|| total / seen as f32))
    }
}

impl Model for DenseNetwork {
    type Optimizer = Optimizer;
    type Loss = Loss;

    fn compile(&mut self, optimizer: Optimizer, loss: Loss) -> Result<(), BackendError> {
        let learning_rate = optimizer.learning_rate();
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(BackendError::Build(format!(
                "invalid learning rate {}",
                learning_rate
            )));
        }
        self.compiled = Some((optimizer, loss));
        Ok(())
    }

    fn fit(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: ArrayView2<'_, f32>,
        validation: (ArrayView2<'_, f32>, ArrayView2<'_, f32>),
        options: &FitOptions,
    ) -> Result<TrainingHistory, BackendError> {
        let optimizer = self.optimizer()?;
        self.check_pair(x, y)?;
        self.check_pair(validation.0, validation.1)?;
        if x.nrows() == 0 {
            return Err(BackendError::Data("no training samples".into()));
        }

        let mut history = TrainingHistory::default();
        let mut tracker = options.early_stopping.tracker();
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        for epoch in 0..options.epochs {
            if options.shuffle {
                order.shuffle(&mut self.rng);
            }
            let mut total = 0.0;
            for chunk in order.chunks(options.batch_size.max(1)) {
                let loss = self.train_batch(
                    x.select(Axis(0), chunk).view(),
                    y.select(Axis(0), chunk).view(),
                    optimizer,
                )?;
                total += loss * chunk.len() as f32;
            }
            let loss = total / x.nrows() as f32;
            let val_loss = if validation.0.nrows() == 0 {
                loss
            } else {
                cross_entropy(self.output(validation.0).view(), validation.1)
            };
            if record_epoch(epoch, loss, val_loss, options, &mut history, &mut tracker) {
                break;
            }
        }
        Ok(history)
    }

    fn fit_generator<G: BatchGenerator>(
        &mut self,
        train: &G,
        validation: &G,
        options: &FitOptions,
    ) -> Result<TrainingHistory, BackendError> {
        let optimizer = self.optimizer()?;
        let pool = worker_pool(&options.generator)?;

        let mut history = TrainingHistory::default();
        let mut tracker = options.early_stopping.tracker();
        for epoch in 0..options.epochs {
            let mut batches = fetch_batches(train, pool.as_ref())?;
            if options.shuffle {
                batches.shuffle(&mut self.rng);
            }
            let (mut total, mut seen) = (0.0, 0);
            for (x, y) in &batches {
                self.check_pair(x.view(), y.view())?;
                total += self.train_batch(x.view(), y.view(), optimizer)? * x.nrows() as f32;
                seen += x.nrows();
            }
            if seen == 0 {
                return Err(BackendError::Data("no training samples".into()));
            }
            let loss = total / seen as f32;
            let val_loss = self
                .generator_loss(validation, pool.as_ref())?
                .unwrap_or(loss);
            if record_epoch(epoch, loss, val_loss, options, &mut history, &mut tracker) {
                break;
            }
        }
        Ok(history)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, BackendError> {
        self.check_input(x)?;
        Ok(self.output(x))
    }

    fn predict_generator<G: BatchGenerator>(
        &self,
        generator: &G,
        options: &GeneratorOptions,
    ) -> Result<Array2<f32>, BackendError> {
        let pool = worker_pool(options)?;
        let outputs = fetch_batches(generator, pool.as_ref())?
            .into_iter()
            .map(|(x, _)| self.predict(x.view()))
            .collect::<Result<Vec<_>, _>>()?;
        if outputs.is_empty() {
            return Ok(Array2::zeros((0, self.output_width())));
        }
        let views: Vec<_> = outputs.iter().map(|output| output.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| BackendError::Shape(e.to_string()))
    }
}

fn cross_entropy(predicted: ArrayView2<'_, f32>, y: ArrayView2<'_, f32>) -> f32 {
    let logs = predicted.mapv(|p| p.clamp(EPSILON, 1.0).ln());
    -(&logs * &y).sum() / predicted.nrows() as f32
}

/// Logs and records a finished epoch. Returns `true`
/// if early stopping ends training.
fn record_epoch(
    epoch: usize,
    loss: f32,
    val_loss: f32,
    options: &FitOptions,
    history: &mut TrainingHistory,
    tracker: &mut EarlyStoppingTracker,
) -> bool {
    history.loss.push(loss);
    history.val_loss.push(val_loss);
    if options.verbose > 0 {
        info!(
            "epoch {}/{}: loss {:.4}, val_loss {:.4}",
            epoch + 1,
            options.epochs,
            loss,
            val_loss
        );
    } else {
        trace!("epoch {}: loss {}, val_loss {}", epoch + 1, loss, val_loss);
    }

    let monitored = match options.early_stopping.monitor {
        Monitor::ValLoss => val_loss,
        Monitor::Loss => loss,
    };
    if tracker.update(monitored) {
        debug!("early stopping after epoch {}", epoch + 1);
        history.stopped_epoch = Some(epoch);
        return true;
    }
    false
}

fn worker_pool(options: &GeneratorOptions) -> Result<Option<ThreadPool>, BackendError> {
    if !options.use_multiprocessing || options.workers < 2 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .map(Some)
        .map_err(|e| BackendError::Other(Box::new(e)))
}

/// Produces every batch of `generator` in order, concurrently
/// when a worker pool is given.
fn fetch_batches<G: BatchGenerator>(
    generator: &G,
    pool: Option<&ThreadPool>,
) -> Result<Vec<Batch>, BackendError> {
    match pool {
        Some(pool) => pool.install(|| {
            (0..generator.len())
                .into_par_iter()
                .map(|i| generator.batch(i))
                .collect()
        }),
        None => (0..generator.len()).map(|i| generator.batch(i)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuvol::backend::EarlyStopping;

    use ndarray::{arr2, s};
    use rand::SeedableRng;

    fn options(epochs: usize, early_stopping: EarlyStopping) -> FitOptions {
        FitOptions {
            batch_size: 4,
            epochs,
            early_stopping,
            shuffle: true,
            verbose: 0,
            generator: GeneratorOptions {
                workers: 2,
                use_multiprocessing: true,
            },
        }
    }

    fn patient() -> EarlyStopping {
        EarlyStopping {
            monitor: Monitor::Loss,
            min_delta: 0.0,
            patience: 10_000,
        }
    }

    /// Two classes, told apart by which input is set.
    fn separable() -> (Array2<f32>, Array2<f32>) {
        let x = Array2::from_shape_fn((16, 2), |(i, j)| if i % 2 == j { 1.0 } else { 0.0 });
        let y = x.clone();
        (x, y)
    }

    fn compiled(hidden: &[usize], optimizer: Optimizer) -> DenseNetwork {
        let mut network = DenseNetwork::new(2, hidden, 2, StdRng::seed_from_u64(3));
        network
            .compile(optimizer, Loss::CategoricalCrossEntropy)
            .unwrap();
        network
    }

    struct Slices {
        x: Array2<f32>,
        y: Array2<f32>,
    }

    impl BatchGenerator for Slices {
        fn len(&self) -> usize {
            self.x.nrows() / 4
        }

        fn batch(&self, index: usize) -> Result<Batch, BackendError> {
            let (start, end) = (index * 4, (index + 1) * 4);
            Ok((
                self.x.slice(s![start..end, ..]).to_owned(),
                self.y.slice(s![start..end, ..]).to_owned(),
            ))
        }
    }

    #[test]
    fn fit_requires_compile() {
        let (x, y) = separable();
        let mut network = DenseNetwork::new(2, &[], 2, StdRng::seed_from_u64(0));
        let result = network.fit(x.view(), y.view(), (x.view(), y.view()), &options(1, patient()));
        assert!(matches!(result, Err(BackendError::NotCompiled)));
    }

    #[test]
    fn rejects_invalid_learning_rate() {
        let mut network = DenseNetwork::new(2, &[], 2, StdRng::seed_from_u64(0));
        let result = network.compile(
            Optimizer::Sgd { learning_rate: 0.0 },
            Loss::CategoricalCrossEntropy,
        );
        assert!(matches!(result, Err(BackendError::Build(_))));
    }

    #[test]
    fn learns_separable_data() {
        let (x, y) = separable();
        let mut network = compiled(&[16], Optimizer::Sgd { learning_rate: 0.5 });
        let history = network
            .fit(x.view(), y.view(), (x.view(), y.view()), &options(200, patient()))
            .unwrap();

        assert_eq!(history.loss.len(), 200);
        assert!(history.loss[199] < history.loss[0]);
        let predicted = network.predict(x.view()).unwrap();
        for (row, target) in predicted.rows().into_iter().zip(y.rows()) {
            assert_eq!(row[0] > row[1], target[0] > target[1]);
        }
    }

    #[test]
    fn momentum_reduces_loss() {
        let (x, y) = separable();
        let mut network = compiled(
            &[4, 4],
            Optimizer::Momentum {
                learning_rate: 0.05,
                momentum: 0.9,
            },
        );
        let history = network
            .fit(x.view(), y.view(), (x.view(), y.view()), &options(50, patient()))
            .unwrap();
        assert!(history.loss[49] < history.loss[0]);
    }

    #[test]
    fn early_stopping_ends_training() {
        let (x, y) = separable();
        let mut network = compiled(&[], Optimizer::Sgd { learning_rate: 0.1 });
        // No second epoch can improve by a million.
        let stopping = EarlyStopping {
            min_delta: 1e6,
            patience: 1,
            ..EarlyStopping::default()
        };
        let history = network
            .fit(x.view(), y.view(), (x.view(), y.view()), &options(20, stopping))
            .unwrap();
        assert_eq!(history.loss.len(), 2);
        assert_eq!(history.val_loss.len(), 2);
        assert_eq!(history.stopped_epoch, Some(1));
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let (x, y) = separable();
        let mut network = compiled(&[], Optimizer::Sgd { learning_rate: 0.1 });
        let wide = arr2(&[[1.0, 0.0, 0.0]]);
        assert!(matches!(network.predict(wide.view()), Err(BackendError::Shape(_))));

        let short_y = y.slice(s![..3, ..]);
        let result = network.fit(x.view(), short_y, (x.view(), y.view()), &options(1, patient()));
        assert!(matches!(result, Err(BackendError::Shape(_))));
    }

    #[test]
    fn generator_training_and_prediction() {
        let (x, y) = separable();
        let generator = Slices { x, y };
        let mut network = compiled(&[8], Optimizer::Sgd { learning_rate: 0.5 });
        let options = options(30, patient());

        let history = network
            .fit_generator(&generator, &generator, &options)
            .unwrap();
        assert_eq!(history.loss.len(), 30);

        let predicted = network
            .predict_generator(&generator, &options.generator)
            .unwrap();
        assert_eq!(predicted.dim(), (16, 2));
        let sequential = network.predict(generator.x.view()).unwrap();
        assert!(predicted
            .iter()
            .zip(sequential.iter())
            .all(|(a, b)| (a - b).abs() < 1e-6));
    }
}
