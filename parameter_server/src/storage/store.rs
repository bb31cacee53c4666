use std::collections::{HashMap, hash_map::Entry};

use comms::{Rank, WeightKey, snapshot::OptimizerSnapshot};
use log::{debug, warn};

use crate::{
    error::{Result, StoreErr},
    optimization::Optimizer,
};

/// The authoritative weights of every key plus the optimizer that updates them.
///
/// Every method takes the store by reference, callers are expected to serialize access
/// to it, see `StoreHandle`.
#[derive(Debug)]
pub struct ParameterStore<O: Optimizer> {
    weights: HashMap<WeightKey, Box<[f32]>>,
    optimizer: O,
    updates_by_rank: Vec<u64>,
}

impl<O: Optimizer> ParameterStore<O> {
    /// Creates a new empty `ParameterStore`.
    ///
    /// # Arguments
    /// * `optimizer` - The optimizer owning the auxiliary state and the schedule.
    /// * `world_size` - The amount of workers expected to send updates.
    ///
    /// # Returns
    /// A new `ParameterStore` instance.
    pub fn new(optimizer: O, world_size: usize) -> Self {
        Self {
            weights: HashMap::new(),
            optimizer,
            updates_by_rank: vec![0; world_size],
        }
    }

    /// Applies a gradient to the weights stored under `key`.
    ///
    /// The first call for a key seeds the store with a copy of `weights`, every later call
    /// ignores `weights` and updates the store's own value instead.
    ///
    /// # Arguments
    /// * `rank` - The worker this update comes from.
    /// * `key` - The name of the tensor.
    /// * `weights` - The caller's belief of the current weights under `key`.
    /// * `gradient` - The gradient to apply.
    /// * `lr_scale` - A factor applied on top of the scheduled learning rate.
    ///
    /// # Returns
    /// Copies of the new weights and of the gradient as the optimizer transformed it, or a
    /// `SizeMismatch` if the tensors don't match the stored length, in which case nothing changes.
    pub fn apply(
        &mut self,
        rank: Rank,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        let current = match self.weights.entry(key.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if weights.len() != gradient.len() {
                    return Err(size_mismatch(key, weights.len(), gradient.len()));
                }

                debug!(rank = rank, key = key, len = weights.len(); "seeding new key");
                entry.insert(Box::from(weights))
            }
        };

        if current.len() != gradient.len() {
            warn!(rank = rank, key = key; "rejected gradient of {} elements", gradient.len());
            return Err(size_mismatch(key, current.len(), gradient.len()));
        }

        let mut new_grad = gradient.to_vec();
        self.optimizer
            .update(rank, key, current, &mut new_grad, lr_scale);

        let new_weights = current.to_vec();
        self.record(rank);

        Ok((new_weights, new_grad))
    }

    /// Copies out the optimizer's observable attributes.
    pub fn fetch(&self) -> OptimizerSnapshot {
        self.optimizer.snapshot()
    }

    /// Advances the optimizer's global schedule by one step.
    ///
    /// # Returns
    /// The new schedule step.
    pub fn step_schedule(&mut self) -> u64 {
        let step = self.optimizer.advance_schedule();
        debug!(step = step; "schedule advanced");
        step
    }

    /// Copies out the authoritative weights under `key`, if it was ever seeded.
    pub fn pull_weights(&self, key: &str) -> Option<Vec<f32>> {
        self.weights.get(key).map(|weights| weights.to_vec())
    }

    /// The amount of updates applied on behalf of `rank`.
    pub fn updates_for(&self, rank: Rank) -> u64 {
        self.updates_by_rank
            .get(rank as usize)
            .copied()
            .unwrap_or_default()
    }

    /// The amount of keys holding weights.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn record(&mut self, rank: Rank) {
        let idx = rank as usize;

        if idx >= self.updates_by_rank.len() {
            let world_size = self.updates_by_rank.len();
            warn!(rank = rank, world_size = world_size; "update from a rank outside of the world");
            self.updates_by_rank.resize(idx + 1, 0);
        }

        self.updates_by_rank[idx] += 1;
    }
}

fn size_mismatch(key: &str, expected: usize, got: usize) -> StoreErr {
    StoreErr::SizeMismatch {
        key: key.to_owned(),
        expected,
        got,
    }
}

#[cfg(test)]
mod tests {
    use comms::snapshot::Algorithm;

    use super::*;

    /// `new = old - 0.1 * grad`, the gradient is handed back untouched.
    struct FixedStep;

    impl Optimizer for FixedStep {
        fn update(&mut self, _: Rank, _: &str, weights: &mut [f32], grad: &mut [f32], _: f32) {
            weights.iter_mut().zip(grad.iter()).for_each(|(w, g)| *w -= 0.1 * g);
        }

        fn snapshot(&self) -> OptimizerSnapshot {
            OptimizerSnapshot::new(Algorithm::GradientDescent, 0.1)
        }

        fn advance_schedule(&mut self) -> u64 {
            0
        }
    }

    fn create_test_store() -> ParameterStore<FixedStep> {
        ParameterStore::new(FixedStep, 2)
    }

    #[test]
    fn test_first_apply_seeds_the_key() {
        let mut store = create_test_store();

        let (weights, grad) = store.apply(0, "w1", &[0.0; 4], &[1.0; 4], 1.0).unwrap();
        assert_eq!(weights, [-0.1; 4]);
        assert_eq!(grad, [1.0; 4]);
        assert_eq!(store.pull_weights("w1").unwrap(), [-0.1; 4]);
    }

    #[test]
    fn test_later_applies_ignore_the_callers_weights() {
        let mut store = create_test_store();
        store.apply(0, "w1", &[0.0; 4], &[1.0; 4], 1.0).unwrap();

        let garbage = [42.0; 4];
        let (weights, _) = store.apply(1, "w1", &garbage, &[1.0; 4], 1.0).unwrap();

        assert_eq!(weights, [-0.2; 4]);
        assert_eq!(store.pull_weights("w1").unwrap(), [-0.2; 4]);
    }

    #[test]
    fn test_returned_tensors_are_copies() {
        let mut store = create_test_store();

        let (mut weights, mut grad) = store.apply(0, "w1", &[0.0; 2], &[1.0; 2], 1.0).unwrap();
        weights.fill(7.0);
        grad.fill(7.0);

        assert_eq!(store.pull_weights("w1").unwrap(), [-0.1; 2]);

        let mut pulled = store.pull_weights("w1").unwrap();
        pulled.fill(9.0);
        assert_eq!(store.pull_weights("w1").unwrap(), [-0.1; 2]);
    }

    #[test]
    fn test_size_mismatch_on_unseen_key_seeds_nothing() {
        let mut store = create_test_store();

        let err = store.apply(0, "w1", &[0.0; 3], &[1.0; 4], 1.0).unwrap_err();
        assert_eq!(
            err,
            StoreErr::SizeMismatch {
                key: "w1".to_string(),
                expected: 3,
                got: 4
            }
        );
        assert!(store.pull_weights("w1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_size_mismatch_on_seen_key_changes_nothing() {
        let mut store = create_test_store();
        store.apply(0, "w1", &[0.0; 4], &[1.0; 4], 1.0).unwrap();

        assert!(store.apply(0, "w1", &[0.0; 2], &[1.0; 2], 1.0).is_err());
        assert_eq!(store.pull_weights("w1").unwrap(), [-0.1; 4]);
        assert_eq!(store.updates_for(0), 1);
    }

    #[test]
    fn test_updates_are_counted_per_rank() {
        let mut store = create_test_store();

        store.apply(0, "a", &[0.0], &[1.0], 1.0).unwrap();
        store.apply(1, "a", &[0.0], &[1.0], 1.0).unwrap();
        store.apply(1, "b", &[0.0], &[1.0], 1.0).unwrap();
        store.apply(5, "b", &[0.0], &[1.0], 1.0).unwrap();

        assert_eq!(store.updates_for(0), 1);
        assert_eq!(store.updates_for(1), 2);
        assert_eq!(store.updates_for(5), 1);
        assert_eq!(store.updates_for(3), 0);
        assert_eq!(store.len(), 2);
    }
}
