use std::fmt;

use crate::core::{MAX_SAFE_VALUE, ProjectionSummary, YearResult};

pub(super) struct ProjectionReport<'a> {
    pub(super) years: &'a [YearResult],
    pub(super) summary: &'a ProjectionSummary,
    pub(super) annual_savings: f64,
}

impl fmt::Display for ProjectionReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>5} {:>6} {:>20} {:>16} {:>14}",
            "age", "year", "assets", "withdrawal", "income"
        )?;
        for year in self.years {
            writeln!(
                f,
                "{:>5} {:>6} {:>20.0} {:>16.0} {:>14.0}",
                year.age, year.year, year.assets, year.expenses, year.income
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Annual savings:            {:.0}", self.annual_savings)?;
        writeln!(
            f,
            "Assets at retirement:      {:.0}",
            self.summary.retirement_assets
        )?;
        writeln!(
            f,
            "  in today's money:        {:.0}",
            self.summary.retirement_assets_today_value
        )?;
        writeln!(
            f,
            "Assets at age {:<3}:         {:.0}",
            self.summary.die_age, self.summary.final_assets
        )?;
        if self.summary.hits_calculation_limits {
            writeln!(
                f,
                "Warning: some values exceed the calculation range and are capped at {MAX_SAFE_VALUE:.0}"
            )?;
        }
        Ok(())
    }
}

pub(super) struct SavingsReport {
    pub(super) fire: f64,
    pub(super) die_with_zero: f64,
}

impl fmt::Display for SavingsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_savings_line(f, "FIRE", self.fire)?;
        write_savings_line(f, "Die with Zero", self.die_with_zero)
    }
}

fn write_savings_line(f: &mut fmt::Formatter<'_>, label: &str, savings: f64) -> fmt::Result {
    if savings >= MAX_SAFE_VALUE {
        writeln!(f, "{label:<15} no finite annual savings reaches this goal")
    } else {
        writeln!(f, "{label:<15} {savings:.0} per year")
    }
}
