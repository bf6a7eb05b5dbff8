use tracing::{debug, trace};

use super::engine::{final_assets, run_projection_from_year};
use super::math::{
    MAX_SAFE_VALUE, safe_annuity_factor, safe_compound, safe_growing_annuity_factor,
};
use super::types::{Inputs, Strategy};

// Only the final balance matters to the solvers, so the calendar is pinned.
const SOLVER_START_YEAR: i32 = 2000;

const PROBE_STEPS: [f64; 6] = [1.0, 2.0, 5.0, 10.0, 20.0, 50.0];
const NEAR_MISS_TOLERANCES: f64 = 100.0;
const OVERSHOOT_TOLERANCES: f64 = 2.0;
const POSITIVE_ESTIMATE_RANGE: f64 = 0.1;
const NON_POSITIVE_ESTIMATE_RANGE: f64 = 0.5;
const BRACKET_GROWTH: f64 = 1.2;
const MAX_BRACKET_ATTEMPTS: u32 = 20;
const FALLBACK_BRACKET_MULTIPLE: f64 = 5.0;
const MAX_BISECTION_STEPS: u32 = 50;

// Partial income is left out of the FIRE target.
pub fn solve_fire_savings(inputs: &Inputs) -> f64 {
    let years_to_retirement = inputs.years_to_retirement();
    let future_expenses = safe_compound(
        inputs.current_expense,
        inputs.inflation_rate / 100.0,
        years_to_retirement,
    );

    let real_return = (inputs.investment_return - inputs.inflation_rate) / 100.0;
    if real_return <= 0.0 {
        return MAX_SAFE_VALUE;
    }
    let required_assets = future_expenses / real_return;
    if !required_assets.is_finite() {
        return MAX_SAFE_VALUE;
    }

    let future_current_assets = safe_compound(
        inputs.current_assets,
        inputs.investment_return / 100.0,
        years_to_retirement,
    );
    if future_current_assets == f64::INFINITY {
        return 0.0;
    }

    let shortfall = (required_assets - future_current_assets).max(0.0);
    if !shortfall.is_finite() {
        return MAX_SAFE_VALUE;
    }
    if years_to_retirement <= 0 {
        return 0.0;
    }

    savings_for_shortfall(inputs, shortfall, years_to_retirement)
}

pub fn solve_die_with_zero_savings(inputs: &Inputs) -> f64 {
    if inputs.years_to_retirement() <= 0 || inputs.years_in_retirement() <= 0 {
        return 0.0;
    }

    let estimate = estimate_die_with_zero_savings(inputs);
    if estimate == 0.0 {
        return 0.0;
    }
    if estimate >= MAX_SAFE_VALUE {
        debug!(estimate, "die-with-zero estimate beyond numeric range; skipping refinement");
        return MAX_SAFE_VALUE;
    }

    refine_die_with_zero_savings(inputs, estimate.round().max(0.0))
}

pub fn estimate_die_with_zero_savings(inputs: &Inputs) -> f64 {
    let years_to_retirement = inputs.years_to_retirement();
    let years_in_retirement = inputs.years_in_retirement();
    if years_to_retirement <= 0 || years_in_retirement <= 0 {
        return 0.0;
    }

    let investment_rate = inputs.investment_return / 100.0;
    let inflation_rate = inputs.inflation_rate / 100.0;

    let withdrawals: Vec<f64> = (0..years_in_retirement)
        .map(|year| {
            let age = i64::from(inputs.retire_age) + year;
            let expense = safe_compound(
                inputs.current_expense,
                inflation_rate,
                years_to_retirement + year,
            );
            let income = if age <= i64::from(inputs.partial_income_until_age) {
                if inputs.inflation_adjust_partial_income {
                    safe_compound(inputs.partial_income, inflation_rate, year)
                } else {
                    inputs.partial_income
                }
            } else {
                0.0
            };
            (expense - income).max(0.0)
        })
        .collect();

    let required_at_retirement = withdrawals
        .iter()
        .rev()
        .fold(0.0, |after, withdrawal| {
            (after + withdrawal) / (1.0 + investment_rate)
        });

    let future_current_assets =
        safe_compound(inputs.current_assets, investment_rate, years_to_retirement);
    let shortfall = (required_at_retirement - future_current_assets).max(0.0);
    if shortfall == 0.0 {
        return 0.0;
    }
    if !shortfall.is_finite() {
        return MAX_SAFE_VALUE;
    }

    savings_for_shortfall(inputs, shortfall, years_to_retirement)
}

pub fn refine_die_with_zero_savings(inputs: &Inputs, estimate: f64) -> f64 {
    let tolerance = (inputs.current_expense / 10_000.0).max(1.0);
    let base = estimate.round();
    let estimate_result = final_assets_for_savings(inputs, estimate);

    if estimate_result < 0.0 && estimate_result > -tolerance * NEAR_MISS_TOLERANCES {
        debug!(estimate, estimate_result, "estimate falls just short; probing upwards");
        for step in PROBE_STEPS {
            let candidate = base + step;
            let result = final_assets_for_savings(inputs, candidate);
            if within_tolerance(result, tolerance) {
                return candidate;
            }
            if result >= 0.0 {
                return binary_search_savings(inputs, base, candidate, tolerance);
            }
        }
    }

    if estimate_result > tolerance * OVERSHOOT_TOLERANCES {
        debug!(estimate, estimate_result, "estimate overshoots; probing downwards");
        for step in PROBE_STEPS {
            let candidate = base - step;
            if candidate < 0.0 {
                continue;
            }
            let result = final_assets_for_savings(inputs, candidate);
            if within_tolerance(result, tolerance) {
                return candidate;
            }
            if result < 0.0 {
                return binary_search_savings(inputs, candidate, base, tolerance);
            }
        }
    }

    let range = if estimate > 0.0 {
        POSITIVE_ESTIMATE_RANGE
    } else {
        NON_POSITIVE_ESTIMATE_RANGE
    };
    let mut low = (estimate * (1.0 - range)).round().max(0.0);
    let mut high = (estimate * (1.0 + range)).round();

    let mut attempts = 0;
    while final_assets_for_savings(inputs, high) < 0.0 && attempts < MAX_BRACKET_ATTEMPTS {
        low = high;
        high = (high * BRACKET_GROWTH).round();
        attempts += 1;
    }
    if final_assets_for_savings(inputs, high) < 0.0 {
        high = (estimate * FALLBACK_BRACKET_MULTIPLE).round();
    }

    debug!(low, high, attempts, "bisecting die-with-zero bracket");
    binary_search_savings(inputs, low, high, tolerance)
}

pub fn binary_search_savings(inputs: &Inputs, low: f64, high: f64, tolerance: f64) -> f64 {
    let mut low = low;
    let mut high = high;
    for step in 0..MAX_BISECTION_STEPS {
        let mid = ((low + high) / 2.0).round();
        let result = final_assets_for_savings(inputs, mid);
        trace!(step, low, high, mid, result, "die-with-zero bisection step");

        if within_tolerance(result, tolerance) {
            return mid;
        }
        if result < 0.0 {
            low = mid;
        } else {
            high = mid;
        }
        if high - low <= 1.0 {
            break;
        }
    }
    high.round()
}

pub fn final_assets_for_savings(inputs: &Inputs, annual_savings: f64) -> f64 {
    let candidate = inputs.with_annual_savings(annual_savings.round());
    final_assets(&run_projection_from_year(&candidate, SOLVER_START_YEAR))
}

pub fn apply_strategy(inputs: &Inputs, strategy: Strategy) -> Inputs {
    match strategy {
        Strategy::Fire => inputs.with_annual_savings(solve_fire_savings(inputs).round()),
        Strategy::DieWithZero => {
            inputs.with_annual_savings(solve_die_with_zero_savings(inputs).round())
        }
        Strategy::CurrentPlan => inputs.clone(),
    }
}

fn savings_for_shortfall(inputs: &Inputs, shortfall: f64, years_to_retirement: i64) -> f64 {
    let investment_rate = inputs.investment_return / 100.0;
    let factor = if inputs.inflation_adjust_savings {
        safe_growing_annuity_factor(
            investment_rate,
            inputs.inflation_rate / 100.0,
            years_to_retirement,
        )
    } else {
        safe_annuity_factor(investment_rate, years_to_retirement)
    };

    let savings = shortfall / factor;
    if savings.is_finite() {
        savings.max(0.0)
    } else {
        MAX_SAFE_VALUE
    }
}

fn within_tolerance(result: f64, tolerance: f64) -> bool {
    (0.0..=tolerance).contains(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, proptest};

    fn assert_rel(actual: f64, expected: f64, rel: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= rel * scale,
            "expected {expected}, got {actual}, relative tolerance {rel}"
        );
    }

    fn base_inputs() -> Inputs {
        Inputs {
            current_age: 30,
            retire_age: 40,
            die_age: 80,
            current_assets: 0.0,
            current_expense: 40_000.0,
            inflation_rate: 0.0,
            investment_return: 5.0,
            annual_savings: 0.0,
            inflation_adjust_savings: false,
            partial_income: 0.0,
            partial_income_until_age: 0,
            inflation_adjust_partial_income: false,
        }
    }

    /// Assets at the end of the last accumulation year.
    fn assets_entering_retirement(inputs: &Inputs) -> f64 {
        let years = run_projection_from_year(inputs, SOLVER_START_YEAR);
        years
            .iter()
            .find(|year| year.age + 1 == inputs.retire_age)
            .map(|year| year.assets)
            .expect("projection covers the last working year")
    }

    #[test]
    fn fire_savings_zero_when_assets_already_sustain_expenses() {
        let inputs = Inputs {
            current_age: 50,
            retire_age: 50,
            die_age: 90,
            current_assets: 1_000_000.0,
            current_expense: 40_000.0,
            inflation_rate: 4.0,
            investment_return: 8.0,
            ..base_inputs()
        };
        assert_eq!(solve_fire_savings(&inputs), 0.0);
    }

    #[test]
    fn fire_savings_unreachable_without_positive_real_return() {
        let mut inputs = base_inputs();
        inputs.inflation_rate = 5.0;
        inputs.investment_return = 5.0;
        assert_eq!(solve_fire_savings(&inputs), MAX_SAFE_VALUE);

        inputs.investment_return = 3.0;
        assert_eq!(solve_fire_savings(&inputs), MAX_SAFE_VALUE);
    }

    #[test]
    fn fire_savings_level_contributions_reach_perpetuity_target() {
        let inputs = base_inputs();
        let savings = solve_fire_savings(&inputs);
        // 40k / 5% = 800k needed after ten years of contributions.
        assert_rel(savings, 800_000.0 / ((1.05f64.powi(10) - 1.0) / 0.05), 1e-9);

        let funded = inputs.with_annual_savings(savings);
        assert_rel(assets_entering_retirement(&funded), 800_000.0, 1e-9);
    }

    #[test]
    fn fire_savings_growing_contributions_reach_perpetuity_target() {
        let inputs = Inputs {
            current_assets: 25_000.0,
            inflation_rate: 2.0,
            investment_return: 6.0,
            inflation_adjust_savings: true,
            ..base_inputs()
        };
        let savings = solve_fire_savings(&inputs);
        let required = 40_000.0 * 1.02f64.powi(10) / 0.04;

        let funded = inputs.with_annual_savings(savings);
        assert_rel(assets_entering_retirement(&funded), required, 1e-9);
    }

    #[test]
    fn fire_savings_ignore_partial_income() {
        let inputs = base_inputs();
        let with_income = Inputs {
            partial_income: 30_000.0,
            partial_income_until_age: 70,
            inflation_adjust_partial_income: true,
            ..base_inputs()
        };
        assert_eq!(solve_fire_savings(&inputs), solve_fire_savings(&with_income));
    }

    #[test]
    fn fire_savings_zero_when_existing_assets_overflow() {
        let inputs = Inputs {
            current_age: 20,
            retire_age: 120,
            current_assets: 1_000_000.0,
            investment_return: 1_000.0,
            ..base_inputs()
        };
        assert_eq!(solve_fire_savings(&inputs), 0.0);
    }

    #[test]
    fn fire_savings_zero_when_already_past_retirement_age() {
        let inputs = Inputs {
            current_age: 45,
            retire_age: 40,
            ..base_inputs()
        };
        assert_eq!(solve_fire_savings(&inputs), 0.0);
    }

    #[test]
    fn fire_savings_count_starting_debt_against_the_target() {
        let solvent = base_inputs();
        let indebted = Inputs {
            current_assets: -50_000.0,
            ..base_inputs()
        };
        assert!(solve_fire_savings(&indebted) > solve_fire_savings(&solvent));
    }

    #[test]
    fn die_with_zero_degenerate_timelines_need_no_savings() {
        let no_accumulation = Inputs {
            retire_age: 30,
            ..base_inputs()
        };
        let dies_before_retiring = Inputs {
            die_age: 38,
            ..base_inputs()
        };
        assert_eq!(solve_die_with_zero_savings(&no_accumulation), 0.0);
        assert_eq!(solve_die_with_zero_savings(&dies_before_retiring), 0.0);
    }

    #[test]
    fn die_with_zero_zero_when_current_assets_suffice() {
        let inputs = Inputs {
            current_assets: 10_000_000.0,
            ..base_inputs()
        };
        assert_eq!(estimate_die_with_zero_savings(&inputs), 0.0);
        assert_eq!(solve_die_with_zero_savings(&inputs), 0.0);
    }

    #[test]
    fn oracle_die_with_zero_without_growth_matches_hand_calculation() {
        let inputs = Inputs {
            current_age: 30,
            retire_age: 40,
            die_age: 50,
            current_expense: 10_000.0,
            investment_return: 0.0,
            ..base_inputs()
        };

        // Eleven retirement years of 10k funded by ten years of saving.
        assert_eq!(estimate_die_with_zero_savings(&inputs), 11_000.0);
        let savings = solve_die_with_zero_savings(&inputs);
        assert_eq!(savings, 11_000.0);
        assert_eq!(final_assets_for_savings(&inputs, savings), 0.0);
    }

    #[test]
    fn die_with_zero_returns_smallest_whole_dollar_that_stays_solvent() {
        let inputs = Inputs {
            current_assets: 50_000.0,
            current_expense: 30_000.0,
            inflation_rate: 3.0,
            die_age: 50,
            retire_age: 40,
            ..base_inputs()
        };

        let savings = solve_die_with_zero_savings(&inputs);
        assert!(savings > 0.0);
        assert_eq!(savings, savings.round());
        assert!(final_assets_for_savings(&inputs, savings) >= 0.0);
        assert!(final_assets_for_savings(&inputs, savings - 1.0) < 0.0);
    }

    #[test]
    fn die_with_zero_partial_income_lowers_required_savings() {
        let inputs = base_inputs();
        let with_income = Inputs {
            partial_income: 20_000.0,
            partial_income_until_age: 55,
            ..base_inputs()
        };
        assert!(
            solve_die_with_zero_savings(&with_income) < solve_die_with_zero_savings(&inputs)
        );
    }

    #[test]
    fn die_with_zero_beyond_numeric_range_is_capped() {
        let inputs = Inputs {
            current_age: 20,
            retire_age: 30,
            die_age: 200,
            inflation_rate: 1_000.0,
            ..base_inputs()
        };
        assert_eq!(estimate_die_with_zero_savings(&inputs), MAX_SAFE_VALUE);
        assert_eq!(solve_die_with_zero_savings(&inputs), MAX_SAFE_VALUE);
    }

    #[test]
    fn binary_search_returns_upper_bound_when_bracket_collapses() {
        let inputs = Inputs {
            current_age: 30,
            retire_age: 40,
            die_age: 50,
            current_expense: 10_000.0,
            investment_return: 0.0,
            ..base_inputs()
        };
        // Every candidate in [20k, 30k] overshoots by far more than the tolerance.
        assert_eq!(binary_search_savings(&inputs, 20_000.0, 30_000.0, 1.0), 20_001.0);
    }

    #[test]
    fn solvers_are_idempotent() {
        let inputs = Inputs {
            inflation_rate: 3.0,
            investment_return: 7.0,
            partial_income: 12_000.0,
            partial_income_until_age: 65,
            inflation_adjust_partial_income: true,
            inflation_adjust_savings: true,
            ..base_inputs()
        };
        assert_eq!(
            solve_fire_savings(&inputs).to_bits(),
            solve_fire_savings(&inputs).to_bits()
        );
        assert_eq!(
            solve_die_with_zero_savings(&inputs).to_bits(),
            solve_die_with_zero_savings(&inputs).to_bits()
        );
    }

    #[test]
    fn apply_strategy_fills_rounded_savings() {
        let inputs = Inputs {
            annual_savings: 1_234.0,
            ..base_inputs()
        };

        assert_eq!(apply_strategy(&inputs, Strategy::CurrentPlan), inputs);
        assert_eq!(
            apply_strategy(&inputs, Strategy::Fire).annual_savings,
            solve_fire_savings(&inputs).round()
        );
        assert_eq!(
            apply_strategy(&inputs, Strategy::DieWithZero).annual_savings,
            solve_die_with_zero_savings(&inputs)
        );
    }

    // One saving year, one retirement year, no growth: a whole dollar of
    // savings moves the final balance by exactly one dollar. Tolerance is 5.
    fn unit_sensitivity_inputs() -> Inputs {
        Inputs {
            current_age: 39,
            retire_age: 40,
            die_age: 40,
            current_expense: 50_000.0,
            investment_return: 0.0,
            ..base_inputs()
        }
    }

    #[test]
    fn oracle_refine_near_miss_takes_first_upward_step_in_tolerance() {
        let inputs = unit_sensitivity_inputs();
        assert_eq!(final_assets_for_savings(&inputs, 49_999.0), -1.0);

        // +1 lands on 0.
        assert_eq!(refine_die_with_zero_savings(&inputs, 49_999.0), 50_000.0);
        // +1 still short, +2 lands on 0.
        assert_eq!(refine_die_with_zero_savings(&inputs, 49_998.0), 50_000.0);
        // +1, +2 short; +5 lands on +1 before +10 or +50 are tried.
        assert_eq!(refine_die_with_zero_savings(&inputs, 49_996.0), 50_001.0);
    }

    #[test]
    fn oracle_refine_overshoot_steps_down_then_bisects() {
        let inputs = unit_sensitivity_inputs();
        assert_eq!(final_assets_for_savings(&inputs, 50_016.0), 16.0);

        // -1, -2, -5, -10 stay above tolerance; -20 crosses to -4, and
        // bisecting [49996, 50016] tries 50006 then accepts 50001.
        assert_eq!(refine_die_with_zero_savings(&inputs, 50_016.0), 50_001.0);
    }

    #[test]
    fn oracle_refine_grows_insolvent_bracket_by_a_fifth() {
        let inputs = unit_sensitivity_inputs();

        // [27000, 33000] -> 39600 -> 47520 -> 57024, then bisect [47520, 57024].
        assert_eq!(refine_die_with_zero_savings(&inputs, 30_000.0), 50_004.0);
    }

    #[test]
    fn oracle_refine_bracket_growth_is_capped_at_twenty_attempts() {
        let inputs = unit_sensitivity_inputs();

        // From 1320 the twentieth growth step is the first to clear 50k.
        assert_eq!(refine_die_with_zero_savings(&inputs, 1_200.0), 50_004.0);
        // From 1100 twenty steps stop near 42k, so the upper bound falls back
        // to five times the estimate and the bracket collapses onto it.
        assert_eq!(refine_die_with_zero_savings(&inputs, 1_000.0), 5_000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_die_with_zero_round_trip_lands_within_tolerance(
            current_age in 20u32..70,
            years_after_retiring in 0u32..5,
            current_expense in 20_000u32..200_000,
            inflation_bp in 0u32..500,
            return_bp in 0u32..600
        ) {
            // One contribution year keeps a whole dollar of savings worth less
            // than the tolerance at the end of the run.
            let inputs = Inputs {
                current_age,
                retire_age: current_age + 1,
                die_age: current_age + 1 + years_after_retiring,
                current_assets: 0.0,
                current_expense: current_expense as f64,
                inflation_rate: inflation_bp as f64 / 100.0,
                investment_return: return_bp as f64 / 100.0,
                annual_savings: 0.0,
                inflation_adjust_savings: false,
                partial_income: 0.0,
                partial_income_until_age: 0,
                inflation_adjust_partial_income: false,
            };

            let tolerance = (inputs.current_expense / 10_000.0).max(1.0);
            let savings = solve_die_with_zero_savings(&inputs);
            let remaining = final_assets_for_savings(&inputs, savings);
            prop_assert!(
                remaining.abs() <= tolerance,
                "savings {savings} left {remaining}, tolerance {tolerance}"
            );
        }

        #[test]
        fn prop_die_with_zero_savings_are_solvent_and_minimal(
            current_age in 20u32..50,
            working_years in 1u32..30,
            retired_years in 1u32..40,
            current_assets in 0u32..300_000,
            current_expense in 20_000u32..150_000,
            inflation_bp in 0u32..500,
            return_bp in 0u32..800,
            partial_income in 0u32..40_000,
            income_years in 0u32..25,
            adjust_savings in any::<bool>(),
            adjust_income in any::<bool>()
        ) {
            let retire_age = current_age + working_years;
            let inputs = Inputs {
                current_age,
                retire_age,
                die_age: retire_age + retired_years - 1,
                current_assets: current_assets as f64,
                current_expense: current_expense as f64,
                inflation_rate: inflation_bp as f64 / 100.0,
                investment_return: return_bp as f64 / 100.0,
                annual_savings: 0.0,
                inflation_adjust_savings: adjust_savings,
                partial_income: partial_income as f64,
                partial_income_until_age: retire_age + income_years,
                inflation_adjust_partial_income: adjust_income,
            };

            let tolerance = (inputs.current_expense / 10_000.0).max(1.0);
            let savings = solve_die_with_zero_savings(&inputs);
            prop_assert!(savings >= 0.0 && savings == savings.round());
            if savings > 0.0 && savings < MAX_SAFE_VALUE {
                let remaining = final_assets_for_savings(&inputs, savings);
                prop_assert!(remaining >= 0.0, "savings {savings} left {remaining}");
                prop_assert!(
                    remaining <= tolerance || final_assets_for_savings(&inputs, savings - 1.0) < 0.0,
                    "savings {savings} left {remaining} but one dollar less is still solvent"
                );
            }
        }
    }
}
