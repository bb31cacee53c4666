use comms::{
    Rank,
    snapshot::{Algorithm, OptimizerSnapshot},
    specs::store::{ResourceHints, StoreSpec},
};
use log::debug;
use parameter_server::{Registry, StoreHandle};

use crate::{error::Result, remote::RemoteStore};

/// The share of an accelerator requested for a store when a worker asks for one.
pub const ACCELERATOR_FRACTION: f32 = 0.1;

/// A worker's view of the shared parameter store.
///
/// Every update is forwarded to the store tagged with this worker's rank. Optimizer
/// attributes are read from a local mirror instead, refreshed on construction, on
/// `sync` and after every `step_schedule`. Reads from the mirror never leave the
/// process and may lag behind the store until the next refresh.
pub struct WorkerProxy<S: RemoteStore> {
    store: S,
    rank: Rank,
    mirror: OptimizerSnapshot,
}

impl WorkerProxy<StoreHandle> {
    /// Binds a new proxy to the store named `spec.name`, starting that store if it
    /// isn't running yet.
    ///
    /// # Arguments
    /// * `registry` - Where running stores are looked up by name.
    /// * `spec` - The specification to build the store with, if it has to be built.
    /// * `use_accelerated_device` - Whether to request an accelerator share for the store.
    /// * `rank` - This worker's rank.
    ///
    /// # Returns
    /// A new synced `WorkerProxy` or a `Construction` error if the store had to be built
    /// and its configuration is invalid.
    pub async fn connect(
        registry: &Registry,
        spec: &StoreSpec,
        use_accelerated_device: bool,
        rank: Rank,
    ) -> Result<Self> {
        let hints = ResourceHints {
            accelerator: use_accelerated_device.then_some(ACCELERATOR_FRACTION),
        };

        let handle = registry.get_or_create(spec, hints)?;
        Self::new(handle, rank).await
    }
}

impl<S: RemoteStore> WorkerProxy<S> {
    /// Creates a new `WorkerProxy` and fills its mirror with a first `fetch`.
    ///
    /// # Arguments
    /// * `store` - The store to forward calls to.
    /// * `rank` - This worker's rank.
    ///
    /// # Returns
    /// A new `WorkerProxy` or a `Transport` error if the store can't be reached.
    pub async fn new(mut store: S, rank: Rank) -> Result<Self> {
        let mirror = store.fetch().await?;
        debug!(rank = rank, step = mirror.schedule_step(); "worker proxy synced");

        Ok(Self {
            store,
            rank,
            mirror,
        })
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Replaces the local mirror with a fresh copy of the store's optimizer attributes.
    ///
    /// The mirror is left untouched if the fetch fails.
    pub async fn sync(&mut self) -> Result<()> {
        self.mirror = self.store.fetch().await?;
        debug!(rank = self.rank, step = self.mirror.schedule_step(); "worker proxy synced");
        Ok(())
    }

    /// Applies `gradient` to the tensor under `key` at the scheduled learning rate.
    ///
    /// See `apply_scaled`.
    pub async fn apply(
        &mut self,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        self.apply_scaled(key, weights, gradient, 1.).await
    }

    /// Applies `gradient` to the tensor under `key`, waiting for the store to do so.
    ///
    /// The call is never retried, on failure it's unknown whether the store applied it.
    ///
    /// # Arguments
    /// * `key` - The name of the tensor.
    /// * `weights` - This worker's belief of the current weights, only used if `key` is new.
    /// * `gradient` - The gradient to apply.
    /// * `lr_scale` - A factor applied on top of the scheduled learning rate.
    ///
    /// # Returns
    /// The store's new weights and transformed gradient, owned by the caller.
    pub async fn apply_scaled(
        &mut self,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        self.store
            .apply(self.rank, key, weights, gradient, lr_scale)
            .await
    }

    /// Advances the store's schedule, then refreshes the mirror.
    ///
    /// The mirror is only refreshed after the store acknowledged the step, so it always
    /// reflects it once this returns successfully.
    pub async fn step_schedule(&mut self) -> Result<()> {
        let step = self.store.step_schedule().await?;
        debug!(rank = self.rank, step = step; "schedule step acknowledged");
        self.sync().await
    }

    /// The whole mirrored snapshot, as of the last refresh.
    pub fn mirror(&self) -> &OptimizerSnapshot {
        &self.mirror
    }

    pub fn algorithm(&self) -> Algorithm {
        self.mirror.algorithm()
    }

    pub fn base_learning_rate(&self) -> f32 {
        self.mirror.base_learning_rate()
    }

    /// The schedule-derived learning rate, as of the last refresh.
    pub fn learning_rate(&self) -> f32 {
        self.mirror.learning_rate()
    }

    pub fn schedule_step(&self) -> u64 {
        self.mirror.schedule_step()
    }

    pub fn grad_clip(&self) -> Option<f32> {
        self.mirror.grad_clip()
    }

    pub fn l2(&self) -> f32 {
        self.mirror.l2()
    }

    pub fn tracked_keys(&self) -> usize {
        self.mirror.tracked_keys()
    }

    pub fn total_updates(&self) -> u64 {
        self.mirror.total_updates()
    }

    /// Releases the underlying store connection.
    pub fn into_inner(self) -> S {
        self.store
    }
}
