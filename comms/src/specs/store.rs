use serde::{Deserialize, Serialize};

use super::optimizer::{OptimizerSpec, ScheduleSpec};

/// The specification for a named `ParameterStore` and the optimizer it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSpec {
    pub name: String,
    pub world_size: usize,
    pub optimizer: OptimizerSpec,
    #[serde(default)]
    pub schedule: ScheduleSpec,
    #[serde(default)]
    pub grad_clip: Option<f32>,
    #[serde(default)]
    pub l2: f32,
}

/// Placement hints forwarded to whoever hosts a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceHints {
    /// Fraction of an accelerator to reserve, `None` to stay on the host.
    #[serde(default)]
    pub accelerator: Option<f32>,
}
