use ulink_settings::{LinkType, Settings};

use crate::error::EstimateError;
use crate::sample::SamplingPlan;
use crate::session::{Dataset, Frames, Session};

/// Candidate pairs from the sampled input, plus the plan that produced them.
#[derive(Debug)]
pub struct PairGeneration<D> {
    pub pairs: D,
    pub plan: SamplingPlan,
}

/// Sample the input for the settings' link type and generate the all-pairs
/// comparison set over the sample.
///
/// Link types sample left and right independently at one shared proportion
/// computed against their combined row count.
pub fn generate_pairs<S: Session>(
    session: &S,
    settings: &Settings,
    frames: Frames<'_, S::Dataset>,
    target_rows: f64,
) -> Result<PairGeneration<S::Dataset>, EstimateError> {
    let link_type = settings.link_type;

    match (link_type, frames) {
        (LinkType::DedupeOnly, Frames::Dedupe(df)) => {
            let population = df.count().map_err(EstimateError::collaborator)?;
            let plan = SamplingPlan::new(link_type, population, target_rows)?;
            log_plan(&plan);

            let sampled = df.sample(plan.proportion).map_err(EstimateError::collaborator)?;
            let pairs = session
                .cartesian_block(settings, Frames::Dedupe(&sampled))
                .map_err(EstimateError::collaborator)?;

            Ok(PairGeneration { pairs, plan })
        }
        (LinkType::LinkOnly | LinkType::LinkAndDedupe, Frames::Link { left, right }) => {
            let right_count = right.count().map_err(EstimateError::collaborator)?;
            let left_count = left.count().map_err(EstimateError::collaborator)?;
            log::debug!("{link_type}: left has {left_count} rows, right has {right_count} rows");

            let population = left_count.saturating_add(right_count);
            let plan = SamplingPlan::new(link_type, population, target_rows)?;
            log_plan(&plan);

            let right_sampled = right.sample(plan.proportion).map_err(EstimateError::collaborator)?;
            let left_sampled = left.sample(plan.proportion).map_err(EstimateError::collaborator)?;
            let pairs = session
                .cartesian_block(
                    settings,
                    Frames::Link {
                        left: &left_sampled,
                        right: &right_sampled,
                    },
                )
                .map_err(EstimateError::collaborator)?;

            Ok(PairGeneration { pairs, plan })
        }
        (LinkType::DedupeOnly, frames @ Frames::Link { .. })
        | (LinkType::LinkOnly | LinkType::LinkAndDedupe, frames @ Frames::Dedupe(_)) => {
            Err(EstimateError::InputMismatch {
                link_type,
                provided: frames.describe(),
            })
        }
    }
}

fn log_plan(plan: &SamplingPlan) {
    log::info!(
        "{}: sampling {:.2} of {} rows (proportion {:.6})",
        plan.link_type, plan.sample_rows, plan.population, plan.proportion
    );
    if plan.clamped {
        log::warn!(
            "{}: population of {} rows is smaller than the sample needed; using all rows, fewer pairs than targeted will be generated",
            plan.link_type, plan.population
        );
    }
}
