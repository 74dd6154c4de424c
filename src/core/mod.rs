mod engine;
mod solver;
mod types;

pub use engine::project;
pub use solver::{GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, solve_goal};
pub use types::{Projection, ProjectionInputs, ProjectionPoint, RetirementYearTreatment};
