use comms::specs::optimizer::ScheduleSpec;

use crate::error::ConstructionErr;

/// A learning rate schedule, evaluated at the optimizer's global schedule cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Schedule {
    Constant,
    /// `lr / (1 + decay * t)`
    Decaying { decay: f32 },
    /// `lr * gamma^t`
    Exponential { gamma: f32 },
    /// Ramps up linearly over `warmup_steps`, then down to zero at `total_steps`.
    WarmupLinear { warmup_steps: u64, total_steps: u64 },
}

impl Schedule {
    /// Creates a new `Schedule` out of its specification.
    ///
    /// # Arguments
    /// * `spec` - The specification of the schedule.
    ///
    /// # Returns
    /// A new `Schedule` or a `ConstructionErr` if its parameters are out of range.
    pub fn from_spec(spec: ScheduleSpec) -> Result<Self, ConstructionErr> {
        let schedule = match spec {
            ScheduleSpec::Constant => Self::Constant,
            ScheduleSpec::Decaying { decay } => {
                if !(decay >= 0.) || !decay.is_finite() {
                    let reason = format!("decay must be finite and non negative, got {decay}");
                    return Err(ConstructionErr::new(reason));
                }

                Self::Decaying { decay }
            }
            ScheduleSpec::Exponential { gamma } => {
                if !(gamma > 0. && gamma <= 1.) {
                    let reason = format!("gamma must be in (0, 1], got {gamma}");
                    return Err(ConstructionErr::new(reason));
                }

                Self::Exponential { gamma }
            }
            ScheduleSpec::WarmupLinear {
                warmup_steps,
                total_steps,
            } => {
                if warmup_steps >= total_steps {
                    let reason = format!(
                        "warmup_steps ({warmup_steps}) must be less than total_steps ({total_steps})"
                    );
                    return Err(ConstructionErr::new(reason));
                }

                Self::WarmupLinear {
                    warmup_steps,
                    total_steps,
                }
            }
        };

        Ok(schedule)
    }

    /// Evaluates the schedule.
    ///
    /// # Arguments
    /// * `base` - The learning rate the schedule starts from.
    /// * `step` - The position of the schedule cursor.
    ///
    /// # Returns
    /// The learning rate at `step`.
    pub fn rate(&self, base: f32, step: u64) -> f32 {
        match *self {
            Self::Constant => base,
            Self::Decaying { decay } => base / (1. + decay * step as f32),
            Self::Exponential { gamma } => base * gamma.powf(step as f32),
            Self::WarmupLinear {
                warmup_steps,
                total_steps,
            } => {
                let factor = if step < warmup_steps {
                    (step + 1) as f32 / warmup_steps as f32
                } else {
                    let remaining = total_steps.saturating_sub(step);
                    remaining as f32 / (total_steps - warmup_steps) as f32
                };

                base * factor.clamp(0., 1.)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(spec: ScheduleSpec) -> Schedule {
        Schedule::from_spec(spec).unwrap()
    }

    #[test]
    fn test_constant_ignores_the_cursor() {
        let s = schedule(ScheduleSpec::Constant);
        assert_eq!(s.rate(0.1, 0), 0.1);
        assert_eq!(s.rate(0.1, 1_000), 0.1);
    }

    #[test]
    fn test_decaying() {
        let s = schedule(ScheduleSpec::Decaying { decay: 1.0 });
        assert_eq!(s.rate(1.0, 0), 1.0);
        assert_eq!(s.rate(1.0, 1), 0.5);
        assert_eq!(s.rate(1.0, 3), 0.25);
    }

    #[test]
    fn test_exponential() {
        let s = schedule(ScheduleSpec::Exponential { gamma: 0.5 });
        assert_eq!(s.rate(1.0, 0), 1.0);
        assert!((s.rate(1.0, 2) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_warmup_then_linear_decay() {
        let s = schedule(ScheduleSpec::WarmupLinear {
            warmup_steps: 4,
            total_steps: 8,
        });

        assert_eq!(s.rate(1.0, 0), 0.25);
        assert_eq!(s.rate(1.0, 3), 1.0);
        assert_eq!(s.rate(1.0, 4), 1.0);
        assert_eq!(s.rate(1.0, 6), 0.5);
        assert_eq!(s.rate(1.0, 8), 0.0);
        assert_eq!(s.rate(1.0, 100), 0.0);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(Schedule::from_spec(ScheduleSpec::Decaying { decay: -1.0 }).is_err());
        assert!(Schedule::from_spec(ScheduleSpec::Exponential { gamma: 0.0 }).is_err());
        assert!(Schedule::from_spec(ScheduleSpec::Exponential { gamma: 1.5 }).is_err());
        assert!(
            Schedule::from_spec(ScheduleSpec::WarmupLinear {
                warmup_steps: 10,
                total_steps: 10,
            })
            .is_err()
        );
    }
}
