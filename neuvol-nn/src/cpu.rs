use crate::networks::{DenseNetwork, Loss, Optimizer};

use neuvol::architecture::{LayerGene, LayerType, OptimizerType};
use neuvol::backend::{Backend, BackendError, Graph, Network, Session};
use neuvol::evaluation::Device;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use std::sync::atomic::{AtomicUsize, Ordering};

/// Units of a `Dense` gene without a `units` parameter.
pub const DEFAULT_UNITS: usize = 16;
/// Momentum coefficient of the momentum optimizer.
pub const MOMENTUM: f32 = 0.9;

/// A backend training [`DenseNetwork`]s on the CPU.
///
/// Every session draws its weight initialization from its own
/// generator. A seeded backend gives every session the same seed,
/// so that each fold starts from the same state.
#[derive(Debug, Default)]
pub struct CpuBackend {
    seed: Option<u64>,
    sessions: AtomicUsize,
}

impl CpuBackend {
    /// Creates a backend with entropy-seeded sessions.
    pub fn new() -> CpuBackend {
        CpuBackend::default()
    }

    /// Creates a backend whose sessions are all seeded with `seed`.
    pub fn seeded(seed: u64) -> CpuBackend {
        CpuBackend {
            seed: Some(seed),
            sessions: AtomicUsize::new(0),
        }
    }

    /// Returns the number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::Relaxed)
    }
}

impl Backend for CpuBackend {
    type Session = DenseSession;

    /// Opens a session, if `device` is the CPU.
    ///
    /// # Examples
    /// ```
    /// use neuvol::backend::Backend;
    /// use neuvol::evaluation::Device;
    /// use neuvol_nn::CpuBackend;
    ///
    /// let backend = CpuBackend::new();
    /// assert!(backend.open_session(Device::Cpu).is_ok());
    /// assert!(backend.open_session(Device::Gpu).is_err());
    /// ```
    fn open_session(&self, device: Device) -> Result<DenseSession, BackendError> {
        if device != Device::Cpu {
            return Err(BackendError::DeviceUnavailable(device.resource().to_string()));
        }
        let id = self.sessions.fetch_add(1, Ordering::Relaxed);
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        debug!("session {} opened on {}", id, device);
        Ok(DenseSession { id, rng })
    }
}

/// A training context holding the state of one fold.
pub struct DenseSession {
    id: usize,
    rng: StdRng,
}

impl DenseSession {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Session for DenseSession {
    type Model = DenseNetwork;

    /// Builds a dense classifier from `network`'s genotype.
    ///
    /// The input width is the genotype's `sentences_length`. Every
    /// `Dense` body gene becomes a ReLU layer of `units` units; other
    /// body genes are passed through. The output layer has one
    /// softmax unit per class.
    fn init_graph<N: Network + ?Sized>(
        &mut self,
        network: &N,
    ) -> Result<Graph<DenseNetwork>, BackendError> {
        let inputs = network.data_processing().sentences_length;
        if inputs == 0 {
            return Err(BackendError::Build("input length must be positive".into()));
        }
        let classes = network.classes();
        if classes == 0 {
            return Err(BackendError::Build("no output classes".into()));
        }
        let hidden = network
            .genotype()
            .body()
            .iter()
            .filter(|gene| gene.layer_type() == LayerType::Dense)
            .map(dense_units)
            .collect::<Result<Vec<_>, _>>()?;

        let training = network.training_parameters();
        let optimizer = match training.optimizer {
            OptimizerType::Sgd => Optimizer::Sgd {
                learning_rate: training.learning_rate,
            },
            OptimizerType::Momentum => Optimizer::Momentum {
                learning_rate: training.learning_rate,
                momentum: MOMENTUM,
            },
        };

        debug!(
            "session {}: {} -> {:?} -> {}",
            self.id, inputs, hidden, classes
        );
        let model = DenseNetwork::new(
            inputs,
            &hidden,
            classes,
            StdRng::seed_from_u64(self.rng.gen()),
        );
        Ok(Graph {
            model,
            optimizer,
            loss: Loss::CategoricalCrossEntropy,
        })
    }
}

impl Drop for DenseSession {
    fn drop(&mut self) {
        debug!("session {} released", self.id);
    }
}

fn dense_units(gene: &LayerGene) -> Result<usize, BackendError> {
    match gene.get("units") {
        None => Ok(DEFAULT_UNITS),
        Some(units) => units
            .as_int()
            .filter(|&units| units > 0)
            .map(|units| units as usize)
            .ok_or_else(|| BackendError::Build(format!("invalid units in {}", gene))),
    }
}
