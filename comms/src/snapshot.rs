//! The externally observable attributes of an optimizer.

use serde::{Deserialize, Serialize};

/// The update rule an optimizer runs, along with its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    GradientDescent,
    GradientDescentWithMomentum { momentum: f32 },
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

/// A point-in-time, read-only copy of an optimizer's attributes.
///
/// It carries no weights and no per-key accumulators, only what a worker
/// may want to look at without a round trip to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSnapshot {
    algorithm: Algorithm,
    base_learning_rate: f32,
    learning_rate: f32,
    schedule_step: u64,
    grad_clip: Option<f32>,
    l2: f32,
    tracked_keys: usize,
    total_updates: u64,
}

impl OptimizerSnapshot {
    /// Creates a new `OptimizerSnapshot` for an optimizer that hasn't stepped its schedule yet.
    ///
    /// # Arguments
    /// * `algorithm` - The update rule and its hyperparameters.
    /// * `base_learning_rate` - The learning rate before any schedule is applied.
    ///
    /// # Returns
    /// A new `OptimizerSnapshot` instance.
    pub fn new(algorithm: Algorithm, base_learning_rate: f32) -> Self {
        Self {
            algorithm,
            base_learning_rate,
            learning_rate: base_learning_rate,
            schedule_step: 0,
            grad_clip: None,
            l2: 0.,
            tracked_keys: 0,
            total_updates: 0,
        }
    }

    /// Sets the schedule cursor and the learning rate it yields.
    pub fn with_schedule(mut self, schedule_step: u64, learning_rate: f32) -> Self {
        self.schedule_step = schedule_step;
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the gradient transformations applied before the update rule.
    pub fn with_regularization(mut self, grad_clip: Option<f32>, l2: f32) -> Self {
        self.grad_clip = grad_clip;
        self.l2 = l2;
        self
    }

    /// Sets the usage counters.
    pub fn with_usage(mut self, tracked_keys: usize, total_updates: u64) -> Self {
        self.tracked_keys = tracked_keys;
        self.total_updates = total_updates;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn base_learning_rate(&self) -> f32 {
        self.base_learning_rate
    }

    /// The schedule-derived learning rate at `schedule_step`, before any per-call scaling.
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn schedule_step(&self) -> u64 {
        self.schedule_step
    }

    pub fn grad_clip(&self) -> Option<f32> {
        self.grad_clip
    }

    pub fn l2(&self) -> f32 {
        self.l2
    }

    /// The amount of keys the optimizer holds auxiliary state for.
    pub fn tracked_keys(&self) -> usize {
        self.tracked_keys
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }
}
