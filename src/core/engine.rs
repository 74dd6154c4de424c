use super::types::{Projection, ProjectionInputs, ProjectionPoint, RetirementYearTreatment};

const MAX_HORIZON_YEARS: u32 = 120;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Phase {
    EarlyAccumulation,
    LateAccumulation,
    RetirementTransition,
    Drawdown,
}

fn classify(inputs: &ProjectionInputs, age: u32) -> Phase {
    if age < inputs.retirement_age - inputs.years_final_return {
        Phase::EarlyAccumulation
    } else if age < inputs.retirement_age {
        Phase::LateAccumulation
    } else if age == inputs.retirement_age
        && inputs.retirement_year_treatment == RetirementYearTreatment::FinalContribution
    {
        Phase::RetirementTransition
    } else {
        Phase::Drawdown
    }
}

fn first_withdrawal_age(inputs: &ProjectionInputs) -> u32 {
    match inputs.retirement_year_treatment {
        RetirementYearTreatment::FirstWithdrawal => inputs.retirement_age,
        RetirementYearTreatment::FinalContribution => inputs.retirement_age + 1,
    }
}

fn annual_withdrawal(inputs: &ProjectionInputs, age: u32) -> f64 {
    let years_since_retirement = (age - inputs.retirement_age) as i32;
    let recurring =
        inputs.annual_expense * (1.0 + inputs.inflation_rate).powi(years_since_retirement);

    let years_post = inputs.years_post_retirement();
    let insurance_share = if years_post == 0 {
        0.0
    } else {
        inputs.health_insurance_expense / years_post as f64
    };

    let one_time = if age == first_withdrawal_age(inputs) {
        inputs.lump_sum_expense + inputs.health_risk_expense
    } else {
        0.0
    };

    recurring + insurance_share + one_time
}

fn validate(inputs: &ProjectionInputs) -> Result<(), String> {
    if inputs.current_age >= inputs.retirement_age {
        return Err("current_age must be < retirement_age".to_string());
    }
    if inputs.retirement_age > inputs.life_expectancy {
        return Err("retirement_age must be <= life_expectancy".to_string());
    }
    if inputs.years_final_return > inputs.years_to_retirement() {
        return Err("years_final_return cannot exceed the years until retirement".to_string());
    }
    if inputs.life_expectancy - inputs.current_age > MAX_HORIZON_YEARS {
        return Err(format!(
            "projection horizon cannot exceed {MAX_HORIZON_YEARS} years"
        ));
    }

    for (name, value) in [
        ("starting_principal", inputs.starting_principal),
        ("annual_contribution", inputs.annual_contribution),
        ("annual_expense", inputs.annual_expense),
        ("lump_sum_expense", inputs.lump_sum_expense),
        ("health_risk_expense", inputs.health_risk_expense),
        ("health_insurance_expense", inputs.health_insurance_expense),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be finite and >= 0"));
        }
    }

    if !inputs.inflation_rate.is_finite() || inputs.inflation_rate < 0.0 {
        return Err("inflation_rate must be finite and >= 0".to_string());
    }

    for (name, rate) in [
        ("annualized_return_pre", inputs.annualized_return_pre),
        (
            "annualized_return_final_years",
            inputs.annualized_return_final_years,
        ),
        ("annualized_return_post", inputs.annualized_return_post),
    ] {
        if !rate.is_finite() || rate <= -1.0 {
            return Err(format!("{name} must be finite and > -100%"));
        }
    }

    Ok(())
}

/// Runs the year-by-year projection from current age through life expectancy.
///
/// Accumulation years contribute before growing; drawdown years withdraw
/// before growing. The first year a drawdown balance would go negative it is
/// clamped to zero and the rest of the series stays frozen there.
pub fn project(inputs: &ProjectionInputs) -> Result<Projection, String> {
    validate(inputs)?;

    let total_points = (inputs.life_expectancy - inputs.current_age + 1) as usize;
    let mut series = Vec::with_capacity(total_points);
    series.push(ProjectionPoint {
        age: inputs.current_age,
        fund_balance: inputs.starting_principal,
        cumulative_expense: 0.0,
    });

    let mut balance = inputs.starting_principal;
    let mut cumulative_expense = 0.0;
    let mut depletion_age = None;
    let mut recorded_retirement_balance = None;

    for age in inputs.current_age + 1..=inputs.life_expectancy {
        match classify(inputs, age) {
            Phase::EarlyAccumulation => {
                balance = (balance + inputs.annual_contribution)
                    * (1.0 + inputs.annualized_return_pre);
            }
            Phase::LateAccumulation => {
                balance = (balance + inputs.annual_contribution)
                    * (1.0 + inputs.annualized_return_final_years);
            }
            Phase::RetirementTransition => {
                balance = (balance + inputs.annual_contribution)
                    * (1.0 + inputs.annualized_return_final_years);
                recorded_retirement_balance = Some(balance);
            }
            Phase::Drawdown => {
                let withdrawal = annual_withdrawal(inputs, age);
                balance = (balance - withdrawal) * (1.0 + inputs.annualized_return_post);
                if balance < 0.0 {
                    depletion_age = Some(age);
                    break;
                }
                // The depleting year's withdrawal never counts: only fully
                // funded withdrawals accrue into the cumulative expense.
                cumulative_expense += withdrawal;
            }
        }

        series.push(ProjectionPoint {
            age,
            fund_balance: balance,
            cumulative_expense,
        });
    }

    if let Some(depleted_at) = depletion_age {
        for age in depleted_at..=inputs.life_expectancy {
            series.push(ProjectionPoint {
                age,
                fund_balance: 0.0,
                cumulative_expense,
            });
        }
    }

    let retirement_year_balance = match recorded_retirement_balance {
        Some(recorded) => recorded,
        None => series
            .iter()
            .find(|point| point.age == inputs.retirement_age)
            .map_or(0.0, |point| point.fund_balance),
    };
    let final_balance = series.last().map_or(0.0, |point| point.fund_balance);

    Ok(Projection {
        series,
        depletion_age,
        retirement_year_balance,
        final_balance,
    })
}
