use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Strategy {
    Fire,
    DieWithZero,
    CurrentPlan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub current_age: u32,
    pub retire_age: u32,
    pub die_age: u32,
    pub current_assets: f64,
    pub current_expense: f64,
    pub inflation_rate: f64,
    pub investment_return: f64,
    pub annual_savings: f64,
    pub inflation_adjust_savings: bool,
    pub partial_income: f64,
    pub partial_income_until_age: u32,
    pub inflation_adjust_partial_income: bool,
}

impl Inputs {
    pub fn years_to_retirement(&self) -> i64 {
        i64::from(self.retire_age) - i64::from(self.current_age)
    }

    pub fn years_in_retirement(&self) -> i64 {
        i64::from(self.die_age) - i64::from(self.retire_age) + 1
    }

    pub(crate) fn with_annual_savings(&self, annual_savings: f64) -> Self {
        Self {
            annual_savings,
            ..self.clone()
        }
    }
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            current_age: 25,
            retire_age: 60,
            die_age: 90,
            current_assets: 100_000.0,
            current_expense: 50_000.0,
            inflation_rate: 4.0,
            investment_return: 8.0,
            annual_savings: 12_000.0,
            inflation_adjust_savings: false,
            partial_income: 0.0,
            partial_income_until_age: 0,
            inflation_adjust_partial_income: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResult {
    pub age: u32,
    pub year: i32,
    pub assets: f64,
    pub expenses: f64,
    pub income: f64,
    pub net_worth: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub retirement_assets: f64,
    pub retirement_assets_today_value: f64,
    pub final_assets: f64,
    pub die_age: u32,
    pub hits_calculation_limits: bool,
}
