use serde::{Deserialize, Serialize};

/// The specification for the `Optimizer` update rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerSpec {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

impl OptimizerSpec {
    /// The base learning rate of the specified rule, before any schedule is applied.
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Adam { learning_rate, .. }
            | Self::GradientDescent { learning_rate }
            | Self::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }
}

/// The specification for the learning rate `Schedule`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    #[default]
    Constant,
    Decaying {
        decay: f32,
    },
    Exponential {
        gamma: f32,
    },
    WarmupLinear {
        warmup_steps: u64,
        total_steps: u64,
    },
}
