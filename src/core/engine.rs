use chrono::{Datelike, Local};

use super::math::{MAX_SAFE_VALUE, clamp_non_finite, safe_compound};
use super::types::{Inputs, ProjectionSummary, YearResult};

pub fn run_projection(inputs: &Inputs) -> Vec<YearResult> {
    run_projection_from_year(inputs, Local::now().year())
}

pub fn run_projection_from_year(inputs: &Inputs, start_year: i32) -> Vec<YearResult> {
    let inflation = inputs.inflation_rate / 100.0;
    let growth = 1.0 + inputs.investment_return / 100.0;

    let mut years = Vec::new();
    let mut assets = inputs.current_assets;
    for (offset, age) in (inputs.current_age..=inputs.die_age).enumerate() {
        let offset = offset as i64;
        let inflated_expense = safe_compound(inputs.current_expense, inflation, offset);
        let income = partial_income_for_age(inputs, age);

        if age < inputs.retire_age {
            assets = assets * growth + contribution_for_year(inputs, offset);
        } else {
            let withdrawal = (inflated_expense - income).max(0.0);
            // Negative balances are not charged a borrowing rate.
            assets = if assets > 0.0 {
                assets * growth - withdrawal
            } else {
                assets - withdrawal
            };
        }

        let reported_assets = clamp_non_finite(assets);
        let reported_expenses = if inflated_expense.is_finite() {
            (inflated_expense - income).max(0.0)
        } else {
            MAX_SAFE_VALUE
        };
        years.push(YearResult {
            age,
            year: calendar_year(start_year, offset),
            assets: reported_assets,
            expenses: reported_expenses,
            income: clamp_non_finite(income),
            net_worth: reported_assets,
        });
    }
    years
}

pub fn final_assets(years: &[YearResult]) -> f64 {
    years.last().map_or(0.0, |year| year.assets)
}

pub fn has_calculation_limits(years: &[YearResult]) -> bool {
    years.iter().any(|year| {
        [year.assets, year.expenses, year.income]
            .iter()
            .any(|value| !value.is_finite() || *value >= MAX_SAFE_VALUE)
    })
}

pub fn summarize_projection(inputs: &Inputs, years: &[YearResult]) -> ProjectionSummary {
    let retirement_assets = years
        .iter()
        .find(|year| year.age == inputs.retire_age)
        .map_or(0.0, |year| year.assets);
    let price_level = safe_compound(
        1.0,
        inputs.inflation_rate / 100.0,
        inputs.years_to_retirement(),
    );

    ProjectionSummary {
        retirement_assets,
        retirement_assets_today_value: clamp_non_finite(retirement_assets / price_level),
        final_assets: final_assets(years),
        die_age: inputs.die_age,
        hits_calculation_limits: has_calculation_limits(years),
    }
}

fn contribution_for_year(inputs: &Inputs, years_since_start: i64) -> f64 {
    if inputs.inflation_adjust_savings {
        safe_compound(
            inputs.annual_savings,
            inputs.inflation_rate / 100.0,
            years_since_start,
        )
    } else {
        inputs.annual_savings
    }
}

fn partial_income_for_age(inputs: &Inputs, age: u32) -> f64 {
    if age < inputs.retire_age || age > inputs.partial_income_until_age {
        return 0.0;
    }
    if inputs.inflation_adjust_partial_income {
        safe_compound(
            inputs.partial_income,
            inputs.inflation_rate / 100.0,
            i64::from(age - inputs.retire_age),
        )
    } else {
        inputs.partial_income
    }
}

fn calendar_year(start_year: i32, offset: i64) -> i32 {
    i32::try_from(offset).map_or(i32::MAX, |offset| start_year.saturating_add(offset))
}
