use serde::{Deserialize, Serialize};
use ulink_settings::Settings;

use crate::dispatch::generate_pairs;
use crate::error::EstimateError;
use crate::merge::merge_u_probabilities;
use crate::model::Model;
use crate::prepare::{prepare_settings, PreparedSettings};
use crate::sample::{validate_target, SamplingPlan, DEFAULT_TARGET_ROWS};
use crate::session::{Frames, Session};

/// Prior match probability attached to every sampled pair: all pairs are
/// treated as non-matches.
pub const NON_MATCH_PRIOR: f64 = 0.0;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimateOptions {
    /// Number of pairs to generate from the sample. Too high can exhaust
    /// memory on the engine; 1e7 is a reasonable upper setting.
    pub target_rows: f64,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            target_rows: DEFAULT_TARGET_ROWS,
        }
    }
}

impl EstimateOptions {
    pub fn with_target_rows(target_rows: f64) -> Self {
        Self { target_rows }
    }

    pub fn from_toml(input: &str) -> Result<Self, EstimateError> {
        let options: EstimateOptions =
            toml::from_str(input).map_err(|e| EstimateError::Options(e.to_string()))?;
        validate_target(options.target_rows)?;
        Ok(options)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Settings with estimated u-probabilities, plus the sampling plan used.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub settings: Settings,
    pub plan: SamplingPlan,
}

/// Estimate u-probabilities directly from a random sample of the input,
/// without expectation maximisation.
///
/// Samples the input, generates the unrestricted pair set over the sample,
/// computes comparison outcomes and runs one maximisation step with every
/// pair treated as a non-match. Returns a copy of `settings` in which only
/// each column's `u_probabilities` has changed; `settings` itself is never
/// modified. Any failure aborts the whole run.
pub fn run<S: Session>(
    settings: &Settings,
    session: &S,
    frames: Frames<'_, S::Dataset>,
    options: &EstimateOptions,
) -> Result<Estimate, EstimateError> {
    validate_target(options.target_rows)?;
    settings.validate()?;

    let PreparedSettings { mut pristine, working } = prepare_settings(settings, session)?;

    let generation = generate_pairs(session, &working, frames, options.target_rows)?;
    log::debug!("pair generation complete");

    let gammas = session
        .add_gammas(&generation.pairs, &working)
        .map_err(EstimateError::collaborator)?;
    let scored = session
        .with_match_probability(&gammas, NON_MATCH_PRIOR)
        .map_err(EstimateError::collaborator)?;

    let mut model = Model::new(working);
    session
        .run_maximisation_step(&scored, &mut model)
        .map_err(EstimateError::collaborator)?;
    let estimated = model.into_settings();

    merge_u_probabilities(&mut pristine, &estimated)?;
    log::info!(
        "estimated u-probabilities for {} comparison column(s)",
        pristine.comparison_columns.len()
    );

    Ok(Estimate {
        settings: pristine,
        plan: generation.plan,
    })
}

/// [`run`], returning only the updated settings.
pub fn estimate_u_values<S: Session>(
    settings: &Settings,
    session: &S,
    frames: Frames<'_, S::Dataset>,
    options: &EstimateOptions,
) -> Result<Settings, EstimateError> {
    run(settings, session, frames, options).map(|estimate| estimate.settings)
}
