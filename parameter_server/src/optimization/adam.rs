use comms::snapshot::Algorithm;

use super::UpdateRule;
use crate::error::ConstructionErr;

#[derive(Debug, Clone, Copy)]
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

/// The moment estimates Adam keeps for a single key.
#[derive(Debug)]
pub struct AdamState {
    v: Box<[f32]>,
    s: Box<[f32]>,
    beta1_t: f32,
    beta2_t: f32,
}

impl Adam {
    /// Creates a new `Adam` update rule.
    ///
    /// # Arguments
    /// * `beta1`, `beta2` - Decay rates of the first and second moment estimates, in `[0, 1)`.
    /// * `epsilon` - Small positive term keeping the denominator away from zero.
    ///
    /// # Returns
    /// A new `Adam` instance or a `ConstructionErr` if a hyperparameter is out of range.
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Result<Self, ConstructionErr> {
        for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
            if !(0. ..1.).contains(&beta) {
                let reason = format!("{name} must be in [0, 1), got {beta}");
                return Err(ConstructionErr::new(reason));
            }
        }

        if !(epsilon > 0.) {
            let reason = format!("epsilon must be positive, got {epsilon}");
            return Err(ConstructionErr::new(reason));
        }

        Ok(Self {
            beta1,
            beta2,
            epsilon,
        })
    }
}

impl UpdateRule for Adam {
    type State = AdamState;

    fn init_state(&self, len: usize) -> Self::State {
        AdamState {
            v: vec![0.; len].into_boxed_slice(),
            s: vec![0.; len].into_boxed_slice(),
            beta1_t: 1.,
            beta2_t: 1.,
        }
    }

    fn apply(&self, state: &mut Self::State, lr: f32, grad: &[f32], weights: &mut [f32]) {
        let Self {
            beta1: b1,
            beta2: b2,
            epsilon: eps,
        } = *self;

        state.beta1_t *= b1;
        state.beta2_t *= b2;

        let bc1 = 1. - state.beta1_t;
        let bc2 = 1. - state.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        weights
            .iter_mut()
            .zip(grad)
            .zip(state.v.iter_mut())
            .zip(state.s.iter_mut())
            .for_each(|(((w, g), v), s)| {
                *v = b1 * *v + (1. - b1) * g;
                *s = b2 * *s + (1. - b2) * g.powi(2);
                *w -= step_size * *v / (s.sqrt() + eps);
            });
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Adam {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
        }
    }
}
