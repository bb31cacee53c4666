//! Workers sharing a process with their store talk to it through its handle.

use comms::{Rank, snapshot::OptimizerSnapshot};
use parameter_server::StoreHandle;

use super::RemoteStore;
use crate::error::Result;

impl RemoteStore for StoreHandle {
    async fn apply(
        &mut self,
        rank: Rank,
        key: &str,
        weights: &[f32],
        gradient: &[f32],
        lr_scale: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        let res = StoreHandle::apply(self, rank, key, weights, gradient, lr_scale).await?;
        Ok(res)
    }

    async fn fetch(&mut self) -> Result<OptimizerSnapshot> {
        Ok(StoreHandle::fetch(self).await?)
    }

    async fn step_schedule(&mut self) -> Result<u64> {
        Ok(StoreHandle::step_schedule(self).await?)
    }
}
