use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    Inputs, ProjectionSummary, Strategy, YearResult, apply_strategy, run_projection,
    solve_die_with_zero_savings, solve_fire_savings, summarize_projection,
};

mod report;

use report::{ProjectionReport, SavingsReport};

const MAX_AGE: u32 = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliStrategy {
    Fire,
    DieWithZero,
    CurrentPlan,
}

impl From<CliStrategy> for Strategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Fire => Strategy::Fire,
            CliStrategy::DieWithZero => Strategy::DieWithZero,
            CliStrategy::CurrentPlan => Strategy::CurrentPlan,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum InputMode {
    #[default]
    Annual,
    Monthly,
}

impl InputMode {
    fn to_annual(self, value: f64) -> f64 {
        match self {
            InputMode::Annual => value,
            InputMode::Monthly => value * 12.0,
        }
    }

    fn display_value(self, annual: f64) -> f64 {
        match self {
            InputMode::Annual => annual,
            InputMode::Monthly => (annual / 12.0).round(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStrategy {
    #[serde(alias = "FIRE")]
    Fire,
    #[serde(alias = "DIE_WITH_ZERO", alias = "dieWithZero", alias = "die_with_zero")]
    DieWithZero,
    #[serde(alias = "CURRENT_PLAN", alias = "currentPlan", alias = "current_plan")]
    CurrentPlan,
}

impl From<ApiStrategy> for Strategy {
    fn from(value: ApiStrategy) -> Self {
        match value {
            ApiStrategy::Fire => Strategy::Fire,
            ApiStrategy::DieWithZero => Strategy::DieWithZero,
            ApiStrategy::CurrentPlan => Strategy::CurrentPlan,
        }
    }
}

impl From<Strategy> for ApiStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::Fire => ApiStrategy::Fire,
            Strategy::DieWithZero => ApiStrategy::DieWithZero,
            Strategy::CurrentPlan => ApiStrategy::CurrentPlan,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum ApiInputMode {
    #[serde(alias = "ANNUAL")]
    Annual,
    #[serde(alias = "MONTHLY")]
    Monthly,
}

impl From<ApiInputMode> for InputMode {
    fn from(value: ApiInputMode) -> Self {
        match value {
            ApiInputMode::Annual => InputMode::Annual,
            ApiInputMode::Monthly => InputMode::Monthly,
        }
    }
}

impl From<InputMode> for ApiInputMode {
    fn from(value: InputMode) -> Self {
        match value {
            InputMode::Annual => ApiInputMode::Annual,
            InputMode::Monthly => ApiInputMode::Monthly,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retire_age: Option<u32>,
    die_age: Option<u32>,
    current_assets: Option<f64>,
    current_expense: Option<f64>,
    inflation_rate: Option<f64>,
    investment_return: Option<f64>,
    #[serde(alias = "savings")]
    annual_savings: Option<f64>,
    inflation_adjust_savings: Option<bool>,
    partial_income: Option<f64>,
    partial_income_until_age: Option<u32>,
    inflation_adjust_partial_income: Option<bool>,

    strategy: Option<ApiStrategy>,
    expense_input_mode: Option<ApiInputMode>,
    partial_income_input_mode: Option<ApiInputMode>,
    savings_input_mode: Option<ApiInputMode>,
}

#[derive(Parser, Debug)]
#[command(
    name = "fireplan",
    version,
    about = "Net worth projection with FIRE and Die-with-Zero savings solvers"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "FIREPLAN_LOG_LEVEL",
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset"
    )]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the year-by-year projection and key results
    Project {
        #[command(flatten)]
        plan: PlanArgs,
        #[arg(long, value_enum, default_value_t = CliStrategy::CurrentPlan)]
        strategy: CliStrategy,
        #[arg(long, help = "Print the HTTP API response body instead of a table")]
        json: bool,
    },
    /// Print the savings required for FIRE and for Die with Zero
    Solve {
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "FIREPLAN_HOST", default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "FIREPLAN_PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct PlanArgs {
    #[arg(long, default_value_t = 25)]
    current_age: u32,
    #[arg(long, default_value_t = 60)]
    retire_age: u32,
    #[arg(long, default_value_t = 90, help = "Age the projection runs through")]
    die_age: u32,
    #[arg(
        long,
        default_value_t = 100_000.0,
        allow_negative_numbers = true,
        help = "Net worth today; may be negative"
    )]
    current_assets: f64,
    #[arg(
        long,
        default_value_t = 50_000.0,
        help = "Living expense in today's money, per --expense-mode period"
    )]
    current_expense: f64,
    #[arg(long, value_enum, default_value_t = InputMode::Annual)]
    expense_mode: InputMode,
    #[arg(
        long,
        default_value_t = 4.0,
        allow_negative_numbers = true,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 8.0,
        allow_negative_numbers = true,
        help = "Expected annual investment return in percent"
    )]
    investment_return: f64,
    #[arg(
        long,
        default_value_t = 12_000.0,
        help = "Savings while working, per --savings-mode period"
    )]
    savings: f64,
    #[arg(long, value_enum, default_value_t = InputMode::Annual)]
    savings_mode: InputMode,
    #[arg(long, help = "Grow savings with inflation every year")]
    inflation_adjust_savings: bool,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Income received in retirement, per --partial-income-mode period"
    )]
    partial_income: f64,
    #[arg(long, value_enum, default_value_t = InputMode::Annual)]
    partial_income_mode: InputMode,
    #[arg(
        long,
        default_value_t = 0,
        help = "Last age (inclusive) partial income is received"
    )]
    partial_income_until_age: u32,
    #[arg(long, help = "Grow partial income with inflation from the retirement year")]
    inflation_adjust_partial_income: bool,
}

#[derive(Copy, Clone, Debug)]
struct ApiOptions {
    strategy: Strategy,
    savings_mode: InputMode,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
    options: ApiOptions,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct SavingsResponse {
    fire_savings: f64,
    die_with_zero_savings: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    strategy: ApiStrategy,
    annual_savings: f64,
    display_savings: f64,
    savings_input_mode: ApiInputMode,
    fire_savings: f64,
    die_with_zero_savings: f64,
    summary: ProjectionSummary,
    years: Vec<YearResult>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(plan: PlanArgs) -> Result<Inputs, ApiError> {
    for (field, value) in [
        ("--current-assets", plan.current_assets),
        ("--current-expense", plan.current_expense),
        ("--inflation-rate", plan.inflation_rate),
        ("--investment-return", plan.investment_return),
        ("--savings", plan.savings),
        ("--partial-income", plan.partial_income),
    ] {
        if !value.is_finite() {
            return Err(ApiError::NonFinite { field, value });
        }
    }

    Ok(Inputs {
        current_age: plan.current_age.min(MAX_AGE),
        retire_age: plan.retire_age.min(MAX_AGE),
        die_age: plan.die_age.min(MAX_AGE),
        current_assets: plan.current_assets,
        current_expense: plan.expense_mode.to_annual(plan.current_expense),
        inflation_rate: plan.inflation_rate,
        investment_return: plan.investment_return,
        annual_savings: plan.savings_mode.to_annual(plan.savings),
        inflation_adjust_savings: plan.inflation_adjust_savings,
        partial_income: plan.partial_income_mode.to_annual(plan.partial_income),
        partial_income_until_age: plan.partial_income_until_age.min(MAX_AGE),
        inflation_adjust_partial_income: plan.inflation_adjust_partial_income,
    })
}

fn api_request_from_plan(plan: PlanArgs, strategy: Strategy) -> Result<ApiRequest, ApiError> {
    let options = ApiOptions {
        strategy,
        savings_mode: plan.savings_mode,
    };
    let inputs = build_inputs(plan)?;
    Ok(ApiRequest { inputs, options })
}

pub async fn run_cli(cli: Cli) -> Result<(), ApiError> {
    match cli.command {
        Command::Project {
            plan,
            strategy,
            json,
        } => {
            let request = api_request_from_plan(plan, strategy.into())?;
            let response = evaluate_request(&request);
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!(
                    "{}",
                    ProjectionReport {
                        years: &response.years,
                        summary: &response.summary,
                        annual_savings: response.annual_savings,
                    }
                );
            }
        }
        Command::Solve { plan } => {
            let inputs = build_inputs(plan)?;
            let savings = solve_savings(&inputs);
            print!(
                "{}",
                SavingsReport {
                    fire: savings.fire_savings,
                    die_with_zero: savings.die_with_zero_savings,
                }
            );
        }
        Command::Serve { host, port } => {
            run_http_server(SocketAddr::new(host, port)).await?;
        }
    }
    Ok(())
}

pub async fn run_http_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fireplan HTTP API listening");
    axum::serve(listener, router()).await
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/savings",
            get(savings_get_handler).post(savings_post_handler),
        )
        .fallback(not_found_handler)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn savings_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    savings_handler_impl(payload)
}

async fn savings_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    savings_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    debug!(strategy = ?request.options.strategy, "simulate request");
    json_response(StatusCode::OK, evaluate_request(&request))
}

fn savings_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    debug!("savings request");
    json_response(StatusCode::OK, solve_savings(&request.inputs))
}

fn solve_savings(inputs: &Inputs) -> SavingsResponse {
    SavingsResponse {
        fire_savings: solve_fire_savings(inputs),
        die_with_zero_savings: solve_die_with_zero_savings(inputs),
    }
}

fn evaluate_request(request: &ApiRequest) -> SimulateResponse {
    let applied = apply_strategy(&request.inputs, request.options.strategy);
    let years = run_projection(&applied);
    build_simulate_response(request, &applied, solve_savings(&request.inputs), years)
}

fn build_simulate_response(
    request: &ApiRequest,
    applied: &Inputs,
    savings: SavingsResponse,
    years: Vec<YearResult>,
) -> SimulateResponse {
    SimulateResponse {
        strategy: request.options.strategy.into(),
        annual_savings: applied.annual_savings,
        display_savings: request
            .options
            .savings_mode
            .display_value(applied.annual_savings),
        savings_input_mode: request.options.savings_mode.into(),
        fire_savings: savings.fire_savings,
        die_with_zero_savings: savings.die_with_zero_savings,
        summary: summarize_projection(applied, &years),
        years,
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
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload).map_err(|e| e.to_string())
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, ApiError> {
    let mut plan = default_plan_args();
    let mut strategy = Strategy::CurrentPlan;

    if let Some(v) = payload.current_age {
        plan.current_age = v;
    }
    if let Some(v) = payload.retire_age {
        plan.retire_age = v;
    }
    if let Some(v) = payload.die_age {
        plan.die_age = v;
    }
    if let Some(v) = payload.current_assets {
        plan.current_assets = v;
    }
    if let Some(v) = payload.current_expense {
        plan.current_expense = v;
    }
    if let Some(v) = payload.inflation_rate {
        plan.inflation_rate = v;
    }
    if let Some(v) = payload.investment_return {
        plan.investment_return = v;
    }
    if let Some(v) = payload.annual_savings {
        plan.savings = v;
    }
    if let Some(v) = payload.inflation_adjust_savings {
        plan.inflation_adjust_savings = v;
    }
    if let Some(v) = payload.partial_income {
        plan.partial_income = v;
    }
    if let Some(v) = payload.partial_income_until_age {
        plan.partial_income_until_age = v;
    }
    if let Some(v) = payload.inflation_adjust_partial_income {
        plan.inflation_adjust_partial_income = v;
    }

    if let Some(v) = payload.expense_input_mode {
        plan.expense_mode = v.into();
    }
    if let Some(v) = payload.partial_income_input_mode {
        plan.partial_income_mode = v.into();
    }
    if let Some(v) = payload.savings_input_mode {
        plan.savings_mode = v.into();
    }
    if let Some(v) = payload.strategy {
        strategy = v.into();
    }

    api_request_from_plan(plan, strategy)
}

fn default_plan_args() -> PlanArgs {
    let defaults = Inputs::default();
    PlanArgs {
        current_age: defaults.current_age,
        retire_age: defaults.retire_age,
        die_age: defaults.die_age,
        current_assets: defaults.current_assets,
        current_expense: defaults.current_expense,
        expense_mode: InputMode::Annual,
        inflation_rate: defaults.inflation_rate,
        investment_return: defaults.investment_return,
        savings: defaults.annual_savings,
        savings_mode: InputMode::Annual,
        inflation_adjust_savings: defaults.inflation_adjust_savings,
        partial_income: defaults.partial_income,
        partial_income_mode: InputMode::Annual,
        partial_income_until_age: defaults.partial_income_until_age,
        inflation_adjust_partial_income: defaults.inflation_adjust_partial_income,
    }
}
