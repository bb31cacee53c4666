mod adam;
mod gradient_descent;
mod gradient_descent_with_momentum;
mod optimizer;
mod schedule;
mod scheduled;

pub use adam::{Adam, AdamState};
pub use gradient_descent::GradientDescent;
pub use gradient_descent_with_momentum::GradientDescentWithMomentum;
pub use optimizer::{Optimizer, UpdateRule};
pub use schedule::Schedule;
pub use scheduled::ScheduledOptimizer;
