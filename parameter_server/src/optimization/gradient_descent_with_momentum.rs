use comms::snapshot::Algorithm;

use super::UpdateRule;
use crate::error::ConstructionErr;

#[derive(Debug, Clone, Copy)]
pub struct GradientDescentWithMomentum {
    momentum: f32,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` update rule.
    ///
    /// # Arguments
    /// * `momentum` - The fraction of the previous velocity kept on every update.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` or a `ConstructionErr` if `momentum` isn't in `[0, 1)`.
    pub fn new(momentum: f32) -> Result<Self, ConstructionErr> {
        if !(0. ..1.).contains(&momentum) {
            let reason = format!("momentum must be in [0, 1), got {momentum}");
            return Err(ConstructionErr::new(reason));
        }

        Ok(Self { momentum })
    }
}

impl UpdateRule for GradientDescentWithMomentum {
    /// The velocity of every weight.
    type State = Box<[f32]>;

    fn init_state(&self, len: usize) -> Self::State {
        vec![0.; len].into_boxed_slice()
    }

    fn apply(&self, velocity: &mut Self::State, lr: f32, grad: &[f32], weights: &mut [f32]) {
        let mu = self.momentum;

        weights
            .iter_mut()
            .zip(grad)
            .zip(velocity.iter_mut())
            .for_each(|((w, g), v)| {
                *v = (mu * *v) + g;
                *w -= lr * *v;
            });
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientDescentWithMomentum {
            momentum: self.momentum,
        }
    }
}
