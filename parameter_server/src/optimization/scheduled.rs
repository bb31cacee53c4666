use std::collections::HashMap;

use comms::{Rank, WeightKey, snapshot::OptimizerSnapshot};

use super::{Optimizer, Schedule, UpdateRule};
use crate::error::ConstructionErr;

/// Runs an `UpdateRule` per key under a learning rate schedule.
///
/// Before the rule runs, the gradient gets the L2 penalty added and is then clipped by
/// its norm, the caller receives the gradient in that transformed form.
#[derive(Debug)]
pub struct ScheduledOptimizer<R: UpdateRule> {
    rule: R,
    learning_rate: f32,
    schedule: Schedule,
    step: u64,
    grad_clip: Option<f32>,
    l2: f32,
    states: HashMap<WeightKey, R::State>,
    updates: u64,
}

impl<R: UpdateRule> ScheduledOptimizer<R> {
    /// Creates a new `ScheduledOptimizer`.
    ///
    /// # Arguments
    /// * `rule` - The per-key update rule.
    /// * `learning_rate` - The base learning rate.
    /// * `schedule` - How the learning rate evolves as the schedule steps.
    /// * `grad_clip` - The maximum norm of a gradient, if any.
    /// * `l2` - The L2 penalty coefficient.
    ///
    /// # Returns
    /// A new `ScheduledOptimizer` or a `ConstructionErr` if a value is out of range.
    pub fn new(
        rule: R,
        learning_rate: f32,
        schedule: Schedule,
        grad_clip: Option<f32>,
        l2: f32,
    ) -> Result<Self, ConstructionErr> {
        if !(learning_rate > 0.) || !learning_rate.is_finite() {
            let reason = format!("learning_rate must be finite and positive, got {learning_rate}");
            return Err(ConstructionErr::new(reason));
        }

        if let Some(max_norm) = grad_clip.filter(|max_norm| !(*max_norm > 0.)) {
            let reason = format!("grad_clip must be positive, got {max_norm}");
            return Err(ConstructionErr::new(reason));
        }

        if !(l2 >= 0.) || !l2.is_finite() {
            let reason = format!("l2 must be finite and non negative, got {l2}");
            return Err(ConstructionErr::new(reason));
        }

        Ok(Self {
            rule,
            learning_rate,
            schedule,
            step: 0,
            grad_clip,
            l2,
            states: HashMap::new(),
            updates: 0,
        })
    }

    /// The learning rate at the current schedule step.
    pub fn current_rate(&self) -> f32 {
        self.schedule.rate(self.learning_rate, self.step)
    }

    fn regularize(&self, weights: &[f32], grad: &mut [f32]) {
        if self.l2 > 0. {
            for (g, w) in grad.iter_mut().zip(weights) {
                *g += self.l2 * w;
            }
        }

        if let Some(max_norm) = self.grad_clip {
            let norm = grad.iter().map(|g| g * g).sum::<f32>().sqrt();

            if norm > max_norm {
                let scale = max_norm / norm;
                grad.iter_mut().for_each(|g| *g *= scale);
            }
        }
    }
}

impl<R: UpdateRule> Optimizer for ScheduledOptimizer<R> {
    fn update(&mut self, _rank: Rank, key: &str, weights: &mut [f32], grad: &mut [f32], lr_scale: f32) {
        self.regularize(weights, grad);
        let lr = self.current_rate() * lr_scale;

        let Self { rule, states, .. } = self;

        if !states.contains_key(key) {
            states.insert(key.to_owned(), rule.init_state(weights.len()));
        }

        if let Some(state) = states.get_mut(key) {
            rule.apply(state, lr, grad, weights);
        }

        self.updates += 1;
    }

    fn snapshot(&self) -> OptimizerSnapshot {
        OptimizerSnapshot::new(self.rule.algorithm(), self.learning_rate)
            .with_schedule(self.step, self.current_rate())
            .with_regularization(self.grad_clip, self.l2)
            .with_usage(self.states.len(), self.updates)
    }

    fn advance_schedule(&mut self) -> u64 {
        self.step += 1;
        self.step
    }
}

#[cfg(test)]
mod tests {
    use comms::snapshot::Algorithm;

    use super::*;
    use crate::optimization::{GradientDescent, GradientDescentWithMomentum};

    fn sgd(learning_rate: f32, schedule: Schedule) -> ScheduledOptimizer<GradientDescent> {
        ScheduledOptimizer::new(GradientDescent, learning_rate, schedule, None, 0.).unwrap()
    }

    #[test]
    fn test_lr_scale_multiplies_the_scheduled_rate() {
        let mut optimizer = sgd(0.1, Schedule::Constant);
        let mut weights = [0.0; 2];
        let mut grad = [1.0; 2];

        optimizer.update(0, "w", &mut weights, &mut grad, 2.0);
        assert_eq!(weights, [-0.2; 2]);
    }

    #[test]
    fn test_clipping_is_visible_in_the_returned_gradient() {
        let mut optimizer =
            ScheduledOptimizer::new(GradientDescent, 1.0, Schedule::Constant, Some(1.0), 0.)
                .unwrap();
        let mut weights = [0.0; 2];
        let mut grad = [3.0, 4.0];

        optimizer.update(0, "w", &mut weights, &mut grad, 1.0);
        assert!((grad[0] - 0.6).abs() < 1e-6);
        assert!((grad[1] - 0.8).abs() < 1e-6);
        assert!((weights[0] + 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_penalty_is_added_before_the_update() {
        let mut optimizer =
            ScheduledOptimizer::new(GradientDescent, 1.0, Schedule::Constant, None, 0.5).unwrap();
        let mut weights = [2.0];
        let mut grad = [0.0];

        optimizer.update(0, "w", &mut weights, &mut grad, 1.0);
        assert_eq!(grad, [1.0]);
        assert_eq!(weights, [1.0]);
    }

    #[test]
    fn test_state_is_kept_per_key() {
        let rule = GradientDescentWithMomentum::new(0.5).unwrap();
        let mut optimizer = ScheduledOptimizer::new(rule, 1.0, Schedule::Constant, None, 0.).unwrap();

        let mut a = [0.0];
        let mut b = [0.0];
        optimizer.update(0, "a", &mut a, &mut [1.0], 1.0);
        optimizer.update(0, "a", &mut a, &mut [1.0], 1.0);
        optimizer.update(0, "b", &mut b, &mut [1.0], 1.0);

        assert_eq!(a, [-2.5]);
        assert_eq!(b, [-1.0]);
        assert_eq!(optimizer.snapshot().tracked_keys(), 2);
        assert_eq!(optimizer.snapshot().total_updates(), 3);
    }

    #[test]
    fn test_advancing_the_schedule_shows_in_the_snapshot() {
        let mut optimizer = sgd(1.0, Schedule::Decaying { decay: 1.0 });
        let before = optimizer.snapshot();

        assert_eq!(optimizer.advance_schedule(), 1);
        let after = optimizer.snapshot();

        assert_eq!(before.algorithm(), Algorithm::GradientDescent);
        assert_eq!(before.schedule_step(), 0);
        assert_eq!(before.learning_rate(), 1.0);
        assert_eq!(after.schedule_step(), 1);
        assert_eq!(after.learning_rate(), 0.5);
        assert_eq!(after.base_learning_rate(), 1.0);
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let new = |lr, clip, l2| ScheduledOptimizer::new(GradientDescent, lr, Schedule::Constant, clip, l2);

        assert!(new(0.0, None, 0.0).is_err());
        assert!(new(f32::INFINITY, None, 0.0).is_err());
        assert!(new(0.1, Some(0.0), 0.0).is_err());
        assert!(new(0.1, None, -1.0).is_err());
        assert!(new(0.1, Some(1.0), 0.01).is_ok());
    }
}
