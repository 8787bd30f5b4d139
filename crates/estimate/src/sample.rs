//! Converting a pair budget into a row-sampling proportion.

use serde::Serialize;
use ulink_settings::LinkType;

use crate::error::EstimateError;

/// Default number of pairs to generate from the sample.
pub const DEFAULT_TARGET_ROWS: f64 = 1_000_000.0;

/// Reject budgets that can't produce a meaningful sample size.
///
/// The upper bound is where `8t + 1` stops being representable; past it the
/// quadratic solution is infinite.
pub fn validate_target(target_rows: f64) -> Result<(), EstimateError> {
    if target_rows.is_finite() && target_rows > 0.0 && (8.0 * target_rows + 1.0).is_finite() {
        Ok(())
    } else {
        Err(EstimateError::InvalidTarget(target_rows))
    }
}

/// Rows whose all-pairs comparison set has `target_rows` pairs.
///
/// Solves `t = n(n-1)/2` for `n`: `n = (sqrt(8t + 1) + 1) / 2`.
pub fn dedupe_rows_to_sample(target_rows: f64) -> f64 {
    0.5 * ((8.0 * target_rows + 1.0).sqrt() + 1.0)
}

/// Rows to sample for the link type.
///
/// `link_only` uses `sqrt(t)` (per side for a cross product), `dedupe_only`
/// and `link_and_dedupe` use the quadratic solution. Both link types express
/// the result against the combined row count of left and right.
pub fn rows_to_sample(link_type: LinkType, target_rows: f64) -> f64 {
    match link_type {
        LinkType::DedupeOnly | LinkType::LinkAndDedupe => dedupe_rows_to_sample(target_rows),
        LinkType::LinkOnly => target_rows.sqrt(),
    }
}

/// `sample_rows / population`, clamped to 1.0 (sample everything).
pub fn sample_proportion(
    link_type: LinkType,
    sample_rows: f64,
    population: u64,
) -> Result<f64, EstimateError> {
    if population == 0 {
        return Err(EstimateError::EmptyPopulation { link_type });
    }
    let proportion = sample_rows / population as f64;
    Ok(if proportion >= 1.0 { 1.0 } else { proportion })
}

/// The numbers behind one sampling decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingPlan {
    pub link_type: LinkType,
    pub population: u64,
    pub sample_rows: f64,
    pub proportion: f64,
    /// True when the sample covers the whole population; fewer pairs than
    /// requested will be generated.
    pub clamped: bool,
}

impl SamplingPlan {
    pub fn new(link_type: LinkType, population: u64, target_rows: f64) -> Result<Self, EstimateError> {
        validate_target(target_rows)?;
        let sample_rows = rows_to_sample(link_type, target_rows);
        let proportion = sample_proportion(link_type, sample_rows, population)?;
        Ok(Self {
            link_type,
            population,
            sample_rows,
            proportion,
            clamped: proportion >= 1.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn dedupe_million_pairs() {
        let n = dedupe_rows_to_sample(1e6);
        assert!(close(n, 1414.71, 0.01), "got {n}");
        // n(n-1)/2 recovers the target
        assert!(close(n * (n - 1.0) / 2.0, 1e6, 1e-3));
    }

    #[test]
    fn link_only_uses_square_root() {
        assert_eq!(rows_to_sample(LinkType::LinkOnly, 1e6), 1000.0);
        assert_eq!(
            rows_to_sample(LinkType::LinkAndDedupe, 1e6),
            dedupe_rows_to_sample(1e6)
        );
        assert_eq!(
            rows_to_sample(LinkType::DedupeOnly, 1e6),
            dedupe_rows_to_sample(1e6)
        );
    }

    #[test]
    fn dedupe_proportion_of_large_population() {
        let plan = SamplingPlan::new(LinkType::DedupeOnly, 100_000, 1e6).unwrap();
        assert!(close(plan.proportion, 0.014147, 1e-6), "got {}", plan.proportion);
        assert!(!plan.clamped);
    }

    #[test]
    fn link_only_boundary_clamps_to_one() {
        let plan = SamplingPlan::new(LinkType::LinkOnly, 500 + 500, 1e6).unwrap();
        assert_eq!(plan.sample_rows, 1000.0);
        assert_eq!(plan.proportion, 1.0);
        assert!(plan.clamped);
    }

    #[test]
    fn small_population_clamps() {
        let p = sample_proportion(LinkType::DedupeOnly, 1414.68, 10).unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn empty_population_is_an_error() {
        let err = sample_proportion(LinkType::LinkAndDedupe, 1414.68, 0).unwrap_err();
        assert!(matches!(
            err,
            EstimateError::EmptyPopulation { link_type: LinkType::LinkAndDedupe }
        ));
    }

    #[test]
    fn rejects_bad_targets() {
        for t in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(validate_target(t), Err(EstimateError::InvalidTarget(_))), "{t}");
        }
        assert!(validate_target(1.0).is_ok());
        assert!(SamplingPlan::new(LinkType::LinkOnly, 100, 0.0).is_err());
    }

    #[test]
    fn rejects_targets_that_overflow_the_quadratic() {
        for t in [1e308, f64::MAX, f64::MAX / 4.0] {
            assert!(matches!(validate_target(t), Err(EstimateError::InvalidTarget(_))), "{t}");
            assert!(SamplingPlan::new(LinkType::DedupeOnly, 100, t).is_err(), "{t}");
        }

        // Largest accepted budgets still give a finite sample size.
        let t = f64::MAX / 16.0;
        for link_type in [LinkType::DedupeOnly, LinkType::LinkOnly, LinkType::LinkAndDedupe] {
            let plan = SamplingPlan::new(link_type, 100, t).unwrap();
            assert!(plan.sample_rows.is_finite(), "{link_type}");
            assert_eq!(plan.proportion, 1.0);
        }
    }
}
