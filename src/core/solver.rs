use serde::Serialize;

use super::engine::project;
use super::types::ProjectionInputs;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GoalType {
    RequiredContribution,
    MaxExpense,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub final_balance: f64,
}

#[derive(Debug, Clone)]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub solved_value: Option<f64>,
    pub achieved_final_balance: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    succeeds: bool,
    final_balance: f64,
}

fn evaluate_candidate(
    base_inputs: &ProjectionInputs,
    goal_type: GoalType,
    candidate_value: f64,
) -> Result<CandidateEval, String> {
    let mut inputs = base_inputs.clone();
    match goal_type {
        GoalType::RequiredContribution => inputs.annual_contribution = candidate_value.max(0.0),
        GoalType::MaxExpense => inputs.annual_expense = candidate_value.max(0.0),
    }

    let projection = project(&inputs)?;
    Ok(CandidateEval {
        succeeds: projection.succeeds(),
        final_balance: projection.final_balance,
    })
}

/// Bisection over one plan knob. Success is monotone in both supported goals:
/// more contribution never hurts, more expense never helps.
pub fn solve_goal(
    inputs: &ProjectionInputs,
    config: GoalSolveConfig,
) -> Result<GoalSolveResult, String> {
    validate_config(config)?;

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate_candidate(inputs, config.goal_type, config.search_min)?;
    let high_eval = evaluate_candidate(inputs, config.goal_type, config.search_max)?;

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    match config.goal_type {
        GoalType::RequiredContribution => {
            if low_eval.succeeds {
                solved_value = Some(config.search_min);
                converged = true;
                feasible = true;
                message = "Already funded at the lower contribution bound.".to_string();
            } else if !high_eval.succeeds {
                feasible = false;
                message = "No feasible contribution found within the search bounds.".to_string();
            } else {
                let mut lo = config.search_min;
                let mut hi = config.search_max;
                let mut it = 0;
                while it < config.max_iterations {
                    it += 1;
                    let mid = (lo + hi) * 0.5;
                    let eval = evaluate_candidate(inputs, config.goal_type, mid)?;
                    iterations.push(GoalSolveIteration {
                        iteration: it,
                        lower_bound: lo,
                        upper_bound: hi,
                        candidate_value: mid,
                        final_balance: eval.final_balance,
                    });

                    if eval.succeeds {
                        hi = mid;
                    } else {
                        lo = mid;
                    }

                    if (hi - lo).abs() <= config.tolerance {
                        converged = true;
                        solved_value = Some(hi);
                        break;
                    }
                }
                if solved_value.is_none() {
                    solved_value = Some(hi);
                }
                feasible = true;
                message = if converged {
                    "Solved required contribution.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
        GoalType::MaxExpense => {
            if !low_eval.succeeds {
                feasible = false;
                message = "No feasible expense found within the search bounds.".to_string();
            } else if high_eval.succeeds {
                solved_value = Some(config.search_max);
                converged = true;
                feasible = true;
                message =
                    "Upper expense bound is still sustainable; increase search max for more."
                        .to_string();
            } else {
                let mut lo = config.search_min;
                let mut hi = config.search_max;
                let mut it = 0;
                while it < config.max_iterations {
                    it += 1;
                    let mid = (lo + hi) * 0.5;
                    let eval = evaluate_candidate(inputs, config.goal_type, mid)?;
                    iterations.push(GoalSolveIteration {
                        iteration: it,
                        lower_bound: lo,
                        upper_bound: hi,
                        candidate_value: mid,
                        final_balance: eval.final_balance,
                    });

                    if eval.succeeds {
                        lo = mid;
                    } else {
                        hi = mid;
                    }

                    if (hi - lo).abs() <= config.tolerance {
                        converged = true;
                        solved_value = Some(lo);
                        break;
                    }
                }
                if solved_value.is_none() {
                    solved_value = Some(lo);
                }
                feasible = true;
                message = if converged {
                    "Solved maximum sustainable expense.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
    }

    let mut achieved_final_balance = None;
    if let Some(value) = solved_value {
        let final_eval = evaluate_candidate(inputs, config.goal_type, value)?;
        achieved_final_balance = Some(final_eval.final_balance);
    }

    Ok(GoalSolveResult {
        goal_type: config.goal_type,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        solved_value,
        achieved_final_balance,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn validate_config(config: GoalSolveConfig) -> Result<(), String> {
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetirementYearTreatment;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn deterministic_inputs() -> ProjectionInputs {
        ProjectionInputs {
            current_age: 30,
            retirement_age: 31,
            life_expectancy: 32,
            starting_principal: 0.0,
            annual_contribution: 0.0,
            annual_expense: 100.0,
            inflation_rate: 0.0,
            annualized_return_pre: 0.0,
            annualized_return_final_years: 0.0,
            annualized_return_post: 0.0,
            years_final_return: 0,
            retirement_year_treatment: RetirementYearTreatment::FinalContribution,
            lump_sum_expense: 0.0,
            health_risk_expense: 0.0,
            health_insurance_expense: 0.0,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        // One transition year collects the contribution, one drawdown year
        // spends 100: the plan succeeds exactly above 100.
        let inputs = deterministic_inputs();
        let config = GoalSolveConfig {
            goal_type: GoalType::RequiredContribution,
            search_min: 0.0,
            search_max: 400.0,
            tolerance: 0.5,
            max_iterations: 24,
        };

        let result = solve_goal(&inputs, config).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            100.0,
            config.tolerance + 0.5,
        );
        assert!(result.achieved_final_balance.expect("balance expected") >= 0.0);
    }

    #[test]
    fn max_expense_solver_finds_deterministic_solution() {
        let mut inputs = deterministic_inputs();
        inputs.starting_principal = 500.0;
        inputs.annual_expense = 100.0;

        let config = GoalSolveConfig {
            goal_type: GoalType::MaxExpense,
            search_min: 0.0,
            search_max: 2_000.0,
            tolerance: 0.5,
            max_iterations: 24,
        };

        let result = solve_goal(&inputs, config).expect("must solve");
        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            500.0,
            config.tolerance + 0.5,
        );
    }

    #[test]
    fn required_contribution_solver_reports_infeasible_when_bounds_too_low() {
        let inputs = deterministic_inputs();
        let config = GoalSolveConfig {
            goal_type: GoalType::RequiredContribution,
            search_min: 0.0,
            search_max: 50.0,
            tolerance: 0.5,
            max_iterations: 16,
        };

        let result = solve_goal(&inputs, config).expect("must return result");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn max_expense_solver_keeps_the_upper_bound_when_still_sustainable() {
        let mut inputs = deterministic_inputs();
        inputs.starting_principal = 1_000_000.0;

        let config = GoalSolveConfig {
            goal_type: GoalType::MaxExpense,
            search_min: 0.0,
            search_max: 100.0,
            tolerance: 0.5,
            max_iterations: 16,
        };

        let result = solve_goal(&inputs, config).expect("must return result");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(result.solved_value.expect("value expected"), 100.0, 1e-9);
    }

    #[test]
    fn solver_rejects_bad_config() {
        let inputs = deterministic_inputs();
        let bad = GoalSolveConfig {
            goal_type: GoalType::MaxExpense,
            search_min: 10.0,
            search_max: 10.0,
            tolerance: 0.5,
            max_iterations: 16,
        };
        assert!(solve_goal(&inputs, bad).is_err());

        let bad = GoalSolveConfig {
            goal_type: GoalType::MaxExpense,
            search_min: 0.0,
            search_max: 10.0,
            tolerance: 0.0,
            max_iterations: 16,
        };
        assert!(solve_goal(&inputs, bad).is_err());
    }

    #[test]
    fn solver_propagates_engine_validation_errors() {
        let mut inputs = deterministic_inputs();
        inputs.retirement_age = 20;
        let config = GoalSolveConfig {
            goal_type: GoalType::MaxExpense,
            search_min: 0.0,
            search_max: 100.0,
            tolerance: 0.5,
            max_iterations: 8,
        };
        assert!(solve_goal(&inputs, config).is_err());
    }
}
