use serde::Serialize;

/// How the retirement year itself is treated on the age axis.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetirementYearTreatment {
    /// The retirement year already takes the first withdrawal.
    FirstWithdrawal,
    /// The retirement year receives one last contribution at the
    /// late-accumulation rate; withdrawals begin the following year.
    FinalContribution,
}

#[derive(Debug, Clone)]
pub struct ProjectionInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub starting_principal: f64,
    pub annual_contribution: f64,
    pub annual_expense: f64,
    pub inflation_rate: f64,
    pub annualized_return_pre: f64,
    pub annualized_return_final_years: f64,
    pub annualized_return_post: f64,
    pub years_final_return: u32,
    pub retirement_year_treatment: RetirementYearTreatment,
    pub lump_sum_expense: f64,
    pub health_risk_expense: f64,
    pub health_insurance_expense: f64,
}

impl ProjectionInputs {
    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age - self.current_age
    }

    pub fn years_post_retirement(&self) -> u32 {
        self.life_expectancy - self.retirement_age
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub age: u32,
    pub fund_balance: f64,
    pub cumulative_expense: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub series: Vec<ProjectionPoint>,
    pub depletion_age: Option<u32>,
    pub retirement_year_balance: f64,
    pub final_balance: f64,
}

impl Projection {
    /// The plan succeeds when something is left to bequeath at life expectancy.
    pub fn succeeds(&self) -> bool {
        self.final_balance > 0.0
    }
}
