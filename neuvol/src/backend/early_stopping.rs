use serde::{Deserialize, Serialize};

/// The quantity watched by early stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Loss on the validation data.
    ValLoss,
    /// Loss on the training data.
    Loss,
}

/// Early stopping parameters.
///
/// Training stops once the monitored loss has gone `patience`
/// epochs without decreasing by more than `min_delta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopping {
    pub monitor: Monitor,
    pub min_delta: f32,
    pub patience: usize,
}

impl Default for EarlyStopping {
    fn default() -> EarlyStopping {
        EarlyStopping {
            monitor: Monitor::ValLoss,
            min_delta: 0.005,
            patience: 5,
        }
    }
}

impl EarlyStopping {
    /// Returns a fresh tracker for one training run.
    pub fn tracker(&self) -> EarlyStoppingTracker {
        EarlyStoppingTracker {
            min_delta: self.min_delta.abs(),
            patience: self.patience,
            best: f32::INFINITY,
            wait: 0,
        }
    }
}

/// Per-run early stopping state.
#[derive(Clone, Debug)]
pub struct EarlyStoppingTracker {
    min_delta: f32,
    patience: usize,
    best: f32,
    wait: usize,
}

impl EarlyStoppingTracker {
    /// Records the monitored loss of the epoch just finished.
    /// Returns `true` if training should stop.
    ///
    /// # Examples
    /// ```
    /// use neuvol::backend::EarlyStopping;
    ///
    /// let mut tracker = EarlyStopping { patience: 2, ..EarlyStopping::default() }.tracker();
    ///
    /// assert!(!tracker.update(1.0));
    /// assert!(!tracker.update(0.5));
    /// // Improvements smaller than `min_delta` do not count.
    /// assert!(!tracker.update(0.499));
    /// assert!(tracker.update(0.498));
    /// ```
    pub fn update(&mut self, loss: f32) -> bool {
        if loss < self.best - self.min_delta {
            self.best = loss;
            self.wait = 0;
            return false;
        }
        self.wait += 1;
        self.wait >= self.patience
    }

    /// Returns the lowest loss seen so far.
    pub fn best(&self) -> f32 {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_patience_stops_at_first_stall() {
        let mut tracker = EarlyStopping {
            patience: 0,
            ..EarlyStopping::default()
        }
        .tracker();
        assert!(!tracker.update(1.0));
        assert!(!tracker.update(0.5));
        assert!(tracker.update(0.5));
    }

    #[test]
    fn improving_epochs_never_stop() {
        let mut tracker = EarlyStopping {
            min_delta: 0.0,
            patience: 0,
            ..EarlyStopping::default()
        }
        .tracker();
        for epoch in 0..10 {
            assert!(!tracker.update(1.0 / (epoch + 1) as f32));
        }
    }

    #[test]
    fn improvement_resets_wait() {
        let mut tracker = EarlyStopping {
            monitor: Monitor::ValLoss,
            min_delta: 0.1,
            patience: 2,
        }
        .tracker();
        assert!(!tracker.update(1.0));
        assert!(!tracker.update(0.95));
        assert!(!tracker.update(0.7));
        assert!(!tracker.update(0.65));
        assert!(tracker.update(0.66));
        assert_eq!(tracker.best(), 0.7);
    }

    #[test]
    fn nan_never_improves() {
        let mut tracker = EarlyStopping {
            patience: 1,
            ..EarlyStopping::default()
        }
        .tracker();
        assert!(tracker.update(f32::NAN));
    }
}
