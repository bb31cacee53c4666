mod client;
mod local;

use comms::{Rank, snapshot::OptimizerSnapshot};

pub use client::RemoteClient;

use crate::error::Result;

/// The calls a worker can make into a parameter store, wherever it runs.
///
/// Each call suspends the caller until the store answers or the call fails.
#[trait_variant::make(RemoteStore: Send)]
pub trait RemoteStoreTemplate {
    /// Asks the store to apply `gradient` to the tensor under `key`.
    ///
    /// # Arguments
    /// * `rank` - The caller's rank.
    /// * `key` - The name of the tensor.
    /// * `weights` - The caller's belief of the current weights, only used if `key` is new.
    /// * `gradient` - The gradient to apply.
    /// * `lr_scale` - A factor applied on top of the scheduled learning rate.
    ///
    /// # Returns
    /// The store's new weights and transformed gradient.
    async fn apply(
        &mut self,
        rank: Rank,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)>;

    /// Fetches a copy of the optimizer's observable attributes.
    async fn fetch(&mut self) -> Result<OptimizerSnapshot>;

    /// Advances the optimizer's schedule and waits for the store to acknowledge it.
    ///
    /// # Returns
    /// The new schedule step.
    async fn step_schedule(&mut self) -> Result<u64>;
}
