pub const MAX_SAFE_VALUE: f64 = 9_007_199_254_740_991.0;

const EQUAL_RATE_EPSILON: f64 = 0.0001;

/// `principal * (1 + rate)^years` in log space. Overflow returns an infinity
/// carrying the sign of `principal`.
pub fn safe_compound(principal: f64, rate: f64, years: i64) -> f64 {
    if years == 0 || rate == 0.0 {
        return principal;
    }

    let sign = if principal < 0.0 { -1.0 } else { 1.0 };
    let log_result = principal.abs().ln() + years as f64 * rate.ln_1p();
    if log_result > MAX_SAFE_VALUE.ln() {
        return sign * f64::INFINITY;
    }

    let result = log_result.exp();
    if result.is_finite() {
        sign * result
    } else {
        sign * f64::INFINITY
    }
}

pub fn safe_annuity_factor(rate: f64, years: i64) -> f64 {
    if rate == 0.0 {
        return years as f64;
    }
    if years == 0 {
        return 0.0;
    }

    let compounded = safe_compound(1.0, rate, years);
    if !compounded.is_finite() {
        return 1.0 / rate;
    }

    let factor = (compounded - 1.0) / rate;
    if factor.is_finite() {
        factor
    } else {
        1.0 / rate
    }
}

pub fn safe_growing_annuity_factor(investment_rate: f64, growth_rate: f64, years: i64) -> f64 {
    if years == 0 {
        return 0.0;
    }

    let spread = investment_rate - growth_rate;
    if spread.abs() < EQUAL_RATE_EPSILON {
        return years as f64 * safe_compound(1.0, investment_rate, years - 1);
    }

    let investment_compounded = safe_compound(1.0, investment_rate, years);
    let growth_compounded = safe_compound(1.0, growth_rate, years);
    if !investment_compounded.is_finite() || !growth_compounded.is_finite() {
        return 1.0 / spread;
    }

    let factor = (investment_compounded - growth_compounded) / spread;
    if factor.is_finite() {
        factor
    } else {
        1.0 / spread
    }
}

/// Maps `NaN` and both infinities to `MAX_SAFE_VALUE`.
pub fn clamp_non_finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        MAX_SAFE_VALUE
    }
}
