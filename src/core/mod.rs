mod engine;
mod math;
mod solver;
mod types;

pub use engine::{
    final_assets, has_calculation_limits, run_projection, run_projection_from_year,
    summarize_projection,
};
pub use math::{
    MAX_SAFE_VALUE, clamp_non_finite, safe_annuity_factor, safe_compound,
    safe_growing_annuity_factor,
};
pub use solver::{
    apply_strategy, binary_search_savings, estimate_die_with_zero_savings,
    final_assets_for_savings, refine_die_with_zero_savings, solve_die_with_zero_savings,
    solve_fire_savings,
};
pub use types::{Inputs, ProjectionSummary, Strategy, YearResult};
