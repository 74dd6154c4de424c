use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    GoalSolveConfig, GoalSolveIteration, GoalType, Projection, ProjectionInputs, ProjectionPoint,
    RetirementYearTreatment, project, solve_goal,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRetirementYearTreatment {
    FirstWithdrawal,
    FinalContribution,
}

impl From<CliRetirementYearTreatment> for RetirementYearTreatment {
    fn from(value: CliRetirementYearTreatment) -> Self {
        match value {
            CliRetirementYearTreatment::FirstWithdrawal => RetirementYearTreatment::FirstWithdrawal,
            CliRetirementYearTreatment::FinalContribution => {
                RetirementYearTreatment::FinalContribution
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRetirementYearTreatment {
    #[serde(alias = "firstWithdrawal", alias = "first_withdrawal")]
    FirstWithdrawal,
    #[serde(alias = "finalContribution", alias = "final_contribution")]
    FinalContribution,
}

impl From<ApiRetirementYearTreatment> for CliRetirementYearTreatment {
    fn from(value: ApiRetirementYearTreatment) -> Self {
        match value {
            ApiRetirementYearTreatment::FirstWithdrawal => {
                CliRetirementYearTreatment::FirstWithdrawal
            }
            ApiRetirementYearTreatment::FinalContribution => {
                CliRetirementYearTreatment::FinalContribution
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGoalType {
    #[serde(
        alias = "requiredContribution",
        alias = "required_contribution",
        alias = "contribution"
    )]
    RequiredContribution,
    #[serde(alias = "maxExpense", alias = "max_expense", alias = "expense")]
    MaxExpense,
}

impl From<ApiGoalType> for GoalType {
    fn from(value: ApiGoalType) -> Self {
        match value {
            ApiGoalType::RequiredContribution => GoalType::RequiredContribution,
            ApiGoalType::MaxExpense => GoalType::MaxExpense,
        }
    }
}

impl From<GoalType> for ApiGoalType {
    fn from(value: GoalType) -> Self {
        match value {
            GoalType::RequiredContribution => ApiGoalType::RequiredContribution,
            GoalType::MaxExpense => ApiGoalType::MaxExpense,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    starting_principal: Option<f64>,
    annual_contribution: Option<f64>,
    annual_expense: Option<f64>,
    inflation_rate: Option<f64>,
    pre_retirement_return: Option<f64>,
    final_years_return: Option<f64>,
    post_retirement_return: Option<f64>,
    years_final_return: Option<u32>,
    retirement_year_treatment: Option<ApiRetirementYearTreatment>,
    lump_sum_expense: Option<f64>,
    health_risk_expense: Option<f64>,
    health_insurance_expense: Option<f64>,
    expenses_in_todays_money: Option<bool>,

    goal: Option<ApiGoalType>,
    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "glidepath",
    about = "Deterministic retirement fund projection across accumulation, glide path, and drawdown"
)]
struct Cli {
    #[arg(long, default_value_t = 27, help = "Current age (planner range 20-50)")]
    current_age: u32,
    #[arg(long, default_value_t = 60, help = "Retirement age (planner range 50-75)")]
    retirement_age: u32,
    #[arg(long, default_value_t = 85, help = "Life expectancy (planner range 70-100)")]
    life_expectancy: u32,
    #[arg(long, default_value_t = 1_000_000.0, help = "Fund value at the current age")]
    starting_principal: f64,
    #[arg(
        long,
        default_value_t = 100_000.0,
        help = "Amount added once per accumulation year"
    )]
    annual_contribution: f64,
    #[arg(
        long,
        default_value_t = 500_000.0,
        help = "Base annual retirement expense before per-year inflation compounding"
    )]
    annual_expense: f64,
    #[arg(long, default_value_t = 3.5, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Annualized return before the final pre-retirement window, in percent"
    )]
    pre_retirement_return: f64,
    #[arg(
        long,
        default_value_t = 5.0,
        help = "Annualized return during the final pre-retirement window, in percent"
    )]
    final_years_return: f64,
    #[arg(
        long,
        default_value_t = 10,
        help = "Width of the final pre-retirement window in years (planner range 1-20)"
    )]
    years_final_return: u32,
    #[arg(
        long,
        default_value_t = 3.5,
        help = "Annualized return after retirement, in percent"
    )]
    post_retirement_return: f64,
    #[arg(
        long,
        value_enum,
        default_value_t = CliRetirementYearTreatment::FirstWithdrawal,
        help = "Whether the retirement year takes the first withdrawal or one final contribution"
    )]
    retirement_year_treatment: CliRetirementYearTreatment,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "One-time expense charged in the first withdrawal year"
    )]
    lump_sum_expense: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "One-time health shock reserve charged in the first withdrawal year"
    )]
    health_risk_expense: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Total health insurance budget spread evenly over the retirement years"
    )]
    health_insurance_expense: f64,
    #[arg(
        long,
        help = "Treat expense and lump-sum figures as today's money and inflate them to retirement age"
    )]
    expenses_in_todays_money: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    series: Vec<ProjectionPoint>,
    depletion_age: Option<u32>,
    retirement_year_balance: f64,
    final_balance: f64,
    success: bool,
    final_window_start_age: u32,
    retirement_age: u32,
    life_expectancy: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveResponse {
    goal: ApiGoalType,
    search_min: f64,
    search_max: f64,
    tolerance: f64,
    max_iterations: u32,
    solved_value: Option<f64>,
    achieved_final_balance: Option<f64>,
    converged: bool,
    feasible: bool,
    message: String,
    iterations: Vec<GoalSolveIteration>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: Cli) -> Result<ProjectionInputs, String> {
    if cli.retirement_age <= cli.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }

    if cli.life_expectancy < cli.retirement_age {
        return Err("--life-expectancy must be >= --retirement-age".to_string());
    }

    if cli.years_final_return > cli.retirement_age - cli.current_age {
        return Err("--years-final-return cannot exceed the years until retirement".to_string());
    }

    for (name, value) in [
        ("--starting-principal", cli.starting_principal),
        ("--annual-contribution", cli.annual_contribution),
        ("--annual-expense", cli.annual_expense),
        ("--lump-sum-expense", cli.lump_sum_expense),
        ("--health-risk-expense", cli.health_risk_expense),
        ("--health-insurance-expense", cli.health_insurance_expense),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    for (name, rate) in [
        ("--inflation-rate", cli.inflation_rate),
        ("--pre-retirement-return", cli.pre_retirement_return),
        ("--final-years-return", cli.final_years_return),
        ("--post-retirement-return", cli.post_retirement_return),
    ] {
        if !rate.is_finite() || rate < 0.0 {
            return Err(format!("{name} must be >= 0 (percent)"));
        }
    }

    let inflation_rate = cli.inflation_rate / 100.0;

    // Today's-money figures are inflated over the accumulation horizon here,
    // at the input boundary; the engine only ever compounds from retirement.
    let accumulation_inflation = if cli.expenses_in_todays_money {
        (1.0 + inflation_rate).powi((cli.retirement_age - cli.current_age) as i32)
    } else {
        1.0
    };

    Ok(ProjectionInputs {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        life_expectancy: cli.life_expectancy,
        starting_principal: cli.starting_principal,
        annual_contribution: cli.annual_contribution,
        annual_expense: cli.annual_expense * accumulation_inflation,
        inflation_rate,
        annualized_return_pre: cli.pre_retirement_return / 100.0,
        annualized_return_final_years: cli.final_years_return / 100.0,
        annualized_return_post: cli.post_retirement_return / 100.0,
        years_final_return: cli.years_final_return,
        retirement_year_treatment: cli.retirement_year_treatment.into(),
        lump_sum_expense: cli.lump_sum_expense * accumulation_inflation,
        health_risk_expense: cli.health_risk_expense,
        health_insurance_expense: cli.health_insurance_expense,
    })
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route(
            "/api/solve",
            get(solve_get_handler).post(solve_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("Glidepath HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, app).await
}

/// One-shot CLI mode: parse flags, run a single projection, print JSON.
pub fn run_cli_projection(args: &[String]) -> Result<(), String> {
    let argv = std::iter::once("glidepath".to_string()).chain(args.iter().cloned());
    let cli = Cli::parse_from(argv);
    let inputs = build_inputs(cli)?;
    let projection = project(&inputs)?;
    let response = build_project_response(&inputs, projection);
    let rendered = serde_json::to_string_pretty(&response)
        .map_err(|e| format!("Failed to render projection: {e}"))?;
    println!("{rendered}");
    Ok(())
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload)
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload)
}

async fn solve_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    solve_handler_impl(payload)
}

async fn solve_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    solve_handler_impl(payload)
}

fn project_handler_impl(payload: ProjectPayload) -> Response {
    let inputs = match inputs_from_payload(payload) {
        Ok(inputs) => inputs,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match project(&inputs) {
        Ok(projection) => {
            json_response(StatusCode::OK, build_project_response(&inputs, projection))
        }
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn solve_handler_impl(payload: ProjectPayload) -> Response {
    let (inputs, config) = match solve_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match solve_goal(&inputs, config) {
        Ok(result) => json_response(
            StatusCode::OK,
            SolveResponse {
                goal: result.goal_type.into(),
                search_min: result.search_min,
                search_max: result.search_max,
                tolerance: result.tolerance,
                max_iterations: result.max_iterations,
                solved_value: result.solved_value,
                achieved_final_balance: result.achieved_final_balance,
                converged: result.converged,
                feasible: result.feasible,
                message: result.message,
                iterations: result.iterations,
            },
        ),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn build_project_response(inputs: &ProjectionInputs, projection: Projection) -> ProjectResponse {
    ProjectResponse {
        success: projection.succeeds(),
        depletion_age: projection.depletion_age,
        retirement_year_balance: projection.retirement_year_balance,
        final_balance: projection.final_balance,
        series: projection.series,
        final_window_start_age: inputs.retirement_age - inputs.years_final_return,
        retirement_age: inputs.retirement_age,
        life_expectancy: inputs.life_expectancy,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn inputs_from_json(json: &str) -> Result<ProjectionInputs, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    inputs_from_payload(payload)
}

#[cfg(test)]
fn solve_request_from_json(json: &str) -> Result<(ProjectionInputs, GoalSolveConfig), String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    solve_request_from_payload(payload)
}

fn inputs_from_payload(payload: ProjectPayload) -> Result<ProjectionInputs, String> {
    build_inputs(cli_from_payload(payload))
}

fn solve_request_from_payload(
    payload: ProjectPayload,
) -> Result<(ProjectionInputs, GoalSolveConfig), String> {
    let goal = payload
        .goal
        .ok_or_else(|| "goal is required: required-contribution or max-expense".to_string())?;
    let search_max = payload
        .search_max
        .ok_or_else(|| "searchMax is required for solving".to_string())?;

    let config = GoalSolveConfig {
        goal_type: goal.into(),
        search_min: payload.search_min.unwrap_or(0.0),
        search_max,
        tolerance: payload.tolerance.unwrap_or(1.0),
        max_iterations: payload.max_iterations.unwrap_or(48),
    };

    let inputs = inputs_from_payload(payload)?;
    Ok((inputs, config))
}

fn cli_from_payload(payload: ProjectPayload) -> Cli {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.starting_principal {
        cli.starting_principal = v;
    }
    if let Some(v) = payload.annual_contribution {
        cli.annual_contribution = v;
    }
    if let Some(v) = payload.annual_expense {
        cli.annual_expense = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.pre_retirement_return {
        cli.pre_retirement_return = v;
    }
    if let Some(v) = payload.final_years_return {
        cli.final_years_return = v;
    }
    if let Some(v) = payload.post_retirement_return {
        cli.post_retirement_return = v;
    }
    if let Some(v) = payload.years_final_return {
        cli.years_final_return = v;
    }
    if let Some(v) = payload.retirement_year_treatment {
        cli.retirement_year_treatment = v.into();
    }
    if let Some(v) = payload.lump_sum_expense {
        cli.lump_sum_expense = v;
    }
    if let Some(v) = payload.health_risk_expense {
        cli.health_risk_expense = v;
    }
    if let Some(v) = payload.health_insurance_expense {
        cli.health_insurance_expense = v;
    }
    if let Some(v) = payload.expenses_in_todays_money {
        cli.expenses_in_todays_money = v;
    }

    cli
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 27,
        retirement_age: 60,
        life_expectancy: 85,
        starting_principal: 1_000_000.0,
        annual_contribution: 100_000.0,
        annual_expense: 500_000.0,
        inflation_rate: 3.5,
        pre_retirement_return: 7.0,
        final_years_return: 5.0,
        years_final_return: 10,
        post_retirement_return: 3.5,
        retirement_year_treatment: CliRetirementYearTreatment::FirstWithdrawal,
        lump_sum_expense: 0.0,
        health_risk_expense: 0.0,
        health_insurance_expense: 0.0,
        expenses_in_todays_money: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_payload_uses_the_documented_defaults() {
        let inputs = inputs_from_json("{}").expect("defaults must build");
        assert_eq!(inputs.current_age, 27);
        assert_eq!(inputs.retirement_age, 60);
        assert_eq!(inputs.life_expectancy, 85);
        assert_approx(inputs.starting_principal, 1_000_000.0);
        assert_approx(inputs.annual_contribution, 100_000.0);
        assert_approx(inputs.annual_expense, 500_000.0);
        assert_approx(inputs.inflation_rate, 0.035);
        assert_approx(inputs.annualized_return_pre, 0.07);
        assert_approx(inputs.annualized_return_final_years, 0.05);
        assert_approx(inputs.annualized_return_post, 0.035);
        assert_eq!(inputs.years_final_return, 10);
        assert_eq!(
            inputs.retirement_year_treatment,
            RetirementYearTreatment::FirstWithdrawal
        );
        assert_approx(inputs.lump_sum_expense, 0.0);
        assert_approx(inputs.health_risk_expense, 0.0);
        assert_approx(inputs.health_insurance_expense, 0.0);
    }

    #[test]
    fn rates_cross_the_boundary_in_percent() {
        let inputs =
            inputs_from_json(r#"{"inflationRate": 2.0, "preRetirementReturn": 8.0}"#)
                .expect("must build");
        assert_approx(inputs.inflation_rate, 0.02);
        assert_approx(inputs.annualized_return_pre, 0.08);
    }

    #[test]
    fn treatment_accepts_kebab_and_camel_aliases() {
        let inputs =
            inputs_from_json(r#"{"retirementYearTreatment": "final-contribution"}"#)
                .expect("must build");
        assert_eq!(
            inputs.retirement_year_treatment,
            RetirementYearTreatment::FinalContribution
        );

        let inputs = inputs_from_json(r#"{"retirementYearTreatment": "finalContribution"}"#)
            .expect("must build");
        assert_eq!(
            inputs.retirement_year_treatment,
            RetirementYearTreatment::FinalContribution
        );
    }

    #[test]
    fn todays_money_figures_are_inflated_over_the_accumulation_horizon() {
        let inputs = inputs_from_json(
            r#"{
                "currentAge": 30,
                "retirementAge": 32,
                "lifeExpectancy": 40,
                "yearsFinalReturn": 0,
                "inflationRate": 10.0,
                "annualExpense": 100.0,
                "lumpSumExpense": 50.0,
                "healthRiskExpense": 20.0,
                "expensesInTodaysMoney": true
            }"#,
        )
        .expect("must build");

        // Two accumulation years at 10%: 1.21x.
        assert_approx(inputs.annual_expense, 121.0);
        assert_approx(inputs.lump_sum_expense, 60.5);
        // The health shock reserve is always retirement-age money already.
        assert_approx(inputs.health_risk_expense, 20.0);
    }

    #[test]
    fn rejects_inverted_ages_at_the_boundary() {
        assert!(inputs_from_json(r#"{"currentAge": 60, "retirementAge": 50}"#).is_err());
        assert!(
            inputs_from_json(r#"{"retirementAge": 84, "lifeExpectancy": 70}"#).is_err()
        );
        assert!(inputs_from_json(r#"{"yearsFinalReturn": 60}"#).is_err());
    }

    #[test]
    fn rejects_negative_surface_values() {
        assert!(inputs_from_json(r#"{"annualExpense": -1.0}"#).is_err());
        assert!(inputs_from_json(r#"{"postRetirementReturn": -2.0}"#).is_err());
    }

    #[test]
    fn solve_request_requires_goal_and_search_max() {
        assert!(solve_request_from_json("{}").is_err());
        assert!(solve_request_from_json(r#"{"goal": "max-expense"}"#).is_err());

        let (inputs, config) =
            solve_request_from_json(r#"{"goal": "max-expense", "searchMax": 1000.0}"#)
                .expect("must build");
        assert_eq!(config.goal_type, GoalType::MaxExpense);
        assert_approx(config.search_min, 0.0);
        assert_approx(config.search_max, 1_000.0);
        assert_approx(config.tolerance, 1.0);
        assert_eq!(config.max_iterations, 48);
        assert_eq!(inputs.current_age, 27);
    }

    #[test]
    fn solve_goal_accepts_aliases() {
        let (_, config) = solve_request_from_json(
            r#"{"goal": "requiredContribution", "searchMax": 500000.0}"#,
        )
        .expect("must build");
        assert_eq!(config.goal_type, GoalType::RequiredContribution);
    }

    #[test]
    fn project_response_serializes_camel_case() {
        let inputs = inputs_from_json("{}").expect("must build");
        let projection = project(&inputs).expect("must project");
        let response = build_project_response(&inputs, projection);
        let value = serde_json::to_value(&response).expect("must serialize");

        assert_eq!(value["retirementAge"], 60);
        assert_eq!(value["lifeExpectancy"], 85);
        assert_eq!(value["finalWindowStartAge"], 50);
        assert!(value["series"].as_array().expect("series array").len() == 59);
        assert!(value["series"][0]["fundBalance"].is_number());
        assert!(value["series"][0]["cumulativeExpense"].is_number());
        assert!(value["finalBalance"].is_number());
        assert!(value["success"].is_boolean());
        assert!(value["depletionAge"].is_null());
    }

    #[test]
    fn default_projection_matches_the_planner_walkthrough_start() {
        let inputs = inputs_from_json("{}").expect("must build");
        let projection = project(&inputs).expect("must project");
        assert_eq!(projection.series[0].age, 27);
        assert_approx(projection.series[0].fund_balance, 1_000_000.0);
        assert_approx(projection.series[0].cumulative_expense, 0.0);
    }
}
