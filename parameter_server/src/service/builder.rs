use comms::specs::{
    optimizer::OptimizerSpec,
    store::{ResourceHints, StoreSpec},
};

use crate::{
    error::ConstructionErr,
    optimization::{
        Adam, GradientDescent, GradientDescentWithMomentum, Schedule, ScheduledOptimizer,
        UpdateRule,
    },
    storage::{ParameterStore, StoreHandle},
};

/// Builds running stores given a specification.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreBuilder;

impl StoreBuilder {
    /// Creates a new `StoreBuilder`.
    ///
    /// # Returns
    /// A new `StoreBuilder` instance.
    pub fn new() -> Self {
        Self
    }

    /// Builds the store's optimizer following `spec` and starts the store.
    ///
    /// # Arguments
    /// * `spec` - The specification of the store.
    /// * `hints` - The placement hints for the store.
    ///
    /// # Returns
    /// A handle to the new store or a `ConstructionErr` if the optimizer
    /// configuration is invalid, in which case nothing is started.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn build(&self, spec: &StoreSpec, hints: ResourceHints) -> Result<StoreHandle, ConstructionErr> {
        if let Some(fraction) = hints.accelerator.filter(|f| !(*f > 0. && *f <= 1.)) {
            let reason = format!("accelerator fraction must be in (0, 1], got {fraction}");
            return Err(ConstructionErr::new(reason));
        }

        let schedule = Schedule::from_spec(spec.schedule)?;
        self.resolve_optimizer(spec, schedule, hints)
    }

    /// Resolves the `UpdateRule` for this store.
    ///
    /// # Arguments
    /// * `spec` - The specification of the store.
    /// * `schedule` - A resolved schedule.
    /// * `hints` - The placement hints for the store.
    ///
    /// # Returns
    /// A handle to the new store or a `ConstructionErr`.
    fn resolve_optimizer(
        &self,
        spec: &StoreSpec,
        schedule: Schedule,
        hints: ResourceHints,
    ) -> Result<StoreHandle, ConstructionErr> {
        match spec.optimizer {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let rule = Adam::new(beta1, beta2, epsilon)?;
                self.terminate_build(spec, rule, learning_rate, schedule, hints)
            }
            OptimizerSpec::GradientDescent { learning_rate } => {
                self.terminate_build(spec, GradientDescent, learning_rate, schedule, hints)
            }
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => {
                let rule = GradientDescentWithMomentum::new(momentum)?;
                self.terminate_build(spec, rule, learning_rate, schedule, hints)
            }
        }
    }

    /// Terminates the build, instanciating the optimizer and the store.
    ///
    /// # Arguments
    /// * `spec` - The specification of the store.
    /// * `rule` - A resolved update rule.
    /// * `learning_rate` - The base learning rate.
    /// * `schedule` - A resolved schedule.
    /// * `hints` - The placement hints for the store.
    ///
    /// # Returns
    /// A handle to the new store or a `ConstructionErr`.
    fn terminate_build<R>(
        &self,
        spec: &StoreSpec,
        rule: R,
        learning_rate: f32,
        schedule: Schedule,
        hints: ResourceHints,
    ) -> Result<StoreHandle, ConstructionErr>
    where
        R: UpdateRule + 'static,
    {
        let optimizer = ScheduledOptimizer::new(rule, learning_rate, schedule, spec.grad_clip, spec.l2)?;
        let store = ParameterStore::new(optimizer, spec.world_size);
        Ok(StoreHandle::spawn(&spec.name, store, hints))
    }
}
