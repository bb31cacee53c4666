use comms::{
    Rank,
    snapshot::{Algorithm, OptimizerSnapshot},
};

/// The optimizer owned by a `ParameterStore`: per-key auxiliary state plus a single
/// global schedule cursor.
pub trait Optimizer: Send {
    /// Applies `grad` to `weights` in place.
    ///
    /// The gradient may be transformed in place as well (regularized, clipped), whatever
    /// it holds afterwards is what the caller gets back as the new gradient.
    ///
    /// # Arguments
    /// * `rank` - The worker this update comes from.
    /// * `key` - The name of the tensor being updated.
    /// * `weights` - The authoritative weights under `key`.
    /// * `grad` - The gradient to apply, always the same length as `weights`.
    /// * `lr_scale` - A factor applied on top of the scheduled learning rate.
    fn update(&mut self, rank: Rank, key: &str, weights: &mut [f32], grad: &mut [f32], lr_scale: f32);

    /// Copies out the attributes a worker may observe.
    fn snapshot(&self) -> OptimizerSnapshot;

    /// Advances the global schedule cursor by one step.
    ///
    /// # Returns
    /// The new position of the cursor.
    fn advance_schedule(&mut self) -> u64;
}

/// The algorithm specific part of an update, run once per key and call.
pub trait UpdateRule: Send {
    /// The auxiliary accumulators kept for every key.
    type State: Send;

    /// Creates the state for a key seen for the first time.
    ///
    /// # Arguments
    /// * `len` - The amount of weights under the key.
    fn init_state(&self, len: usize) -> Self::State;

    /// Updates `weights` with `grad`.
    ///
    /// # Arguments
    /// * `state` - This key's accumulators.
    /// * `learning_rate` - The effective learning rate for this call.
    /// * `grad` - The (already transformed) gradient.
    /// * `weights` - The weights to update.
    fn apply(&self, state: &mut Self::State, learning_rate: f32, grad: &[f32], weights: &mut [f32]);

    fn algorithm(&self) -> Algorithm;
}
