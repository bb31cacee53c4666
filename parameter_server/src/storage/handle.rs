use std::sync::Arc;

use comms::{Rank, WeightKey, snapshot::OptimizerSnapshot, specs::store::ResourceHints};
use log::{debug, info};
use tokio::sync::{mpsc, oneshot};

use super::ParameterStore;
use crate::{
    error::{Result, StoreErr},
    optimization::Optimizer,
};

/// The amount of calls that can wait in a store's mailbox before callers start to block.
const MAILBOX_SIZE: usize = 128;

type Reply<T> = oneshot::Sender<T>;

/// A call into a store, along with where to send its result.
enum Request {
    Apply {
        rank: Rank,
        key: WeightKey,
        weights: Vec<f32>,
        gradient: Vec<f32>,
        lr_scale: f32,
        reply: Reply<Result<(Vec<f32>, Vec<f32>)>>,
    },
    Fetch {
        reply: Reply<OptimizerSnapshot>,
    },
    StepSchedule {
        reply: Reply<u64>,
    },
    PullWeights {
        key: WeightKey,
        reply: Reply<Option<Vec<f32>>>,
    },
}

/// The actual interface to interact with a running `ParameterStore`.
///
/// The store itself lives inside a single task that drains its mailbox one request at
/// a time, so every call is applied in a strict serial order. Handles are cheap to clone
/// and all of them address the same store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    name: Arc<str>,
    hints: ResourceHints,
    tx: mpsc::Sender<Request>,
}

impl StoreHandle {
    /// Moves `store` into its own task and returns a handle to it.
    ///
    /// The task ends once every handle has been dropped.
    ///
    /// # Arguments
    /// * `name` - The logical name of the store.
    /// * `store` - The store to run.
    /// * `hints` - The placement hints the store was requested with.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn spawn<O>(name: &str, store: ParameterStore<O>, hints: ResourceHints) -> Self
    where
        O: Optimizer + 'static,
    {
        let (tx, rx) = mpsc::channel(MAILBOX_SIZE);
        let name: Arc<str> = Arc::from(name);

        info!(store = &*name, accelerator:? = hints.accelerator; "starting parameter store");
        tokio::spawn(run(Arc::clone(&name), store, rx));

        Self { name, hints, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hints(&self) -> ResourceHints {
        self.hints
    }

    /// Whether the store behind this handle stopped running.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Async call to `ParameterStore::apply`.
    ///
    /// # Arguments
    /// * `rank` - The worker this update comes from.
    /// * `key` - The name of the tensor.
    /// * `weights` - The caller's belief of the current weights under `key`.
    /// * `gradient` - The gradient to apply.
    /// * `lr_scale` - A factor applied on top of the scheduled learning rate.
    ///
    /// # Returns
    /// The new weights and gradient, a `SizeMismatch` if the store refused the call or
    /// `Closed` if the store isn't running.
    pub async fn apply(
        &self,
        rank: Rank,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        self.call(|reply| Request::Apply {
            rank,
            key: key.to_owned(),
            weights: weights.to_vec(),
            gradient: gradient.to_vec(),
            lr_scale,
            reply,
        })
        .await?
    }

    /// Async call to `ParameterStore::fetch`.
    pub async fn fetch(&self) -> Result<OptimizerSnapshot> {
        self.call(|reply| Request::Fetch { reply }).await
    }

    /// Async call to `ParameterStore::step_schedule`.
    ///
    /// # Returns
    /// The new schedule step once the store applied it.
    pub async fn step_schedule(&self) -> Result<u64> {
        self.call(|reply| Request::StepSchedule { reply }).await
    }

    /// Async call to `ParameterStore::pull_weights`.
    pub async fn pull_weights(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let key = key.to_owned();
        self.call(|reply| Request::PullWeights { key, reply }).await
    }

    /// Sends a request into the mailbox and waits for its reply.
    async fn call<T, F>(&self, request: F) -> Result<T>
    where
        F: FnOnce(Reply<T>) -> Request,
    {
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(request(reply))
            .await
            .map_err(|_| StoreErr::Closed)?;

        rx.await.map_err(|_| StoreErr::Closed)
    }
}

/// The store's event loop, it owns the store and handles one request at a time.
async fn run<O: Optimizer>(name: Arc<str>, mut store: ParameterStore<O>, mut rx: mpsc::Receiver<Request>) {
    while let Some(request) = rx.recv().await {
        // A dropped reply means the caller gave up waiting, the call was applied regardless.
        match request {
            Request::Apply {
                rank,
                key,
                weights,
                gradient,
                lr_scale,
                reply,
            } => {
                let res = store.apply(rank, &key, &weights, &gradient, lr_scale);
                let _ = reply.send(res);
            }
            Request::Fetch { reply } => {
                let _ = reply.send(store.fetch());
            }
            Request::StepSchedule { reply } => {
                let _ = reply.send(store.step_schedule());
            }
            Request::PullWeights { key, reply } => {
                let _ = reply.send(store.pull_weights(&key));
            }
        }
    }

    debug!(store = &*name, keys = store.len(); "every handle dropped");
    info!(store = &*name; "parameter store stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use comms::snapshot::Algorithm;
    use tokio::task::JoinSet;

    use super::*;

    /// Adds one to every weight, so the returned weights tell how many updates came before.
    struct AddOne {
        step: u64,
    }

    impl Optimizer for AddOne {
        fn update(&mut self, _: Rank, _: &str, weights: &mut [f32], _: &mut [f32], _: f32) {
            weights.iter_mut().for_each(|w| *w += 1.0);
        }

        fn snapshot(&self) -> OptimizerSnapshot {
            OptimizerSnapshot::new(Algorithm::GradientDescent, 1.0).with_schedule(self.step, 1.0)
        }

        fn advance_schedule(&mut self) -> u64 {
            self.step += 1;
            self.step
        }
    }

    fn spawn_test_store(world_size: usize) -> StoreHandle {
        let store = ParameterStore::new(AddOne { step: 0 }, world_size);
        StoreHandle::spawn("test", store, ResourceHints::default())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_applies_are_serialized() {
        const WORKERS: u32 = 16;
        const STEPS: usize = 25;

        let handle = spawn_test_store(WORKERS as usize);
        let mut tasks = JoinSet::new();

        for rank in 0..WORKERS {
            let handle = handle.clone();

            tasks.spawn(async move {
                let mut seen = Vec::with_capacity(STEPS);

                for _ in 0..STEPS {
                    let (weights, _) = handle.apply(rank, "w", &[0.0; 8], &[0.0; 8], 1.0).await?;
                    seen.push(weights);
                }

                Ok::<_, StoreErr>(seen)
            });
        }

        let mut counters = HashSet::new();
        while let Some(res) = tasks.join_next().await {
            for weights in res.unwrap().unwrap() {
                // No torn writes, every element went through the same update.
                assert!(weights.iter().all(|&w| w == weights[0]));
                assert!(counters.insert(weights[0] as u64), "duplicated update");
            }
        }

        let total = WORKERS as u64 * STEPS as u64;
        let expected: HashSet<u64> = (1..=total).collect();
        assert_eq!(counters, expected);

        let last = handle.pull_weights("w").await.unwrap().unwrap();
        assert_eq!(last, [total as f32; 8]);
    }

    #[tokio::test]
    async fn test_step_schedule_is_acknowledged_before_fetch() {
        let handle = spawn_test_store(1);

        assert_eq!(handle.fetch().await.unwrap().schedule_step(), 0);
        assert_eq!(handle.step_schedule().await.unwrap(), 1);
        assert_eq!(handle.step_schedule().await.unwrap(), 2);
        assert_eq!(handle.fetch().await.unwrap().schedule_step(), 2);
    }

    #[tokio::test]
    async fn test_clones_address_the_same_store() {
        let handle = spawn_test_store(2);
        let other = handle.clone();

        handle.apply(0, "w", &[0.0], &[0.0], 1.0).await.unwrap();
        let (weights, _) = other.apply(1, "w", &[100.0], &[0.0], 1.0).await.unwrap();

        assert_eq!(weights, [2.0]);
        assert_eq!(other.name(), "test");
        assert!(!other.is_closed());
    }

    #[tokio::test]
    async fn test_size_mismatch_is_returned_to_the_caller() {
        let handle = spawn_test_store(1);
        handle.apply(0, "w", &[0.0; 2], &[0.0; 2], 1.0).await.unwrap();

        let err = handle.apply(0, "w", &[0.0; 3], &[0.0; 3], 1.0).await.unwrap_err();
        assert!(matches!(err, StoreErr::SizeMismatch { expected: 2, got: 3, .. }));
        assert_eq!(handle.pull_weights("w").await.unwrap().unwrap(), [1.0; 2]);
    }
}
