use comms::snapshot::Algorithm;

use super::UpdateRule;

/// Plain gradient descent, it keeps no per-key state.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDescent;

impl UpdateRule for GradientDescent {
    type State = ();

    fn init_state(&self, _len: usize) -> Self::State {}

    fn apply(&self, _state: &mut Self::State, lr: f32, grad: &[f32], weights: &mut [f32]) {
        for (w, g) in weights.iter_mut().zip(grad) {
            *w -= lr * g;
        }
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::GradientDescent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_against_the_gradient() {
        let rule = GradientDescent;
        let mut weights = [1.0, 2.0];

        rule.apply(&mut (), 0.5, &[2.0, -2.0], &mut weights);
        assert_eq!(weights, [0.0, 3.0]);
    }
}
