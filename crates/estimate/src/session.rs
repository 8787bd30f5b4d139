//! Contracts for the engine the estimator drives.
//!
//! The estimator never looks inside a dataset. It asks for a row count, asks
//! for a random sub-sample, and hands datasets to the session's transforms.

use ulink_settings::Settings;

use crate::model::Model;

/// Opaque handle to a (possibly distributed) set of rows.
pub trait Dataset: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn count(&self) -> Result<u64, Self::Error>;

    /// Sample without replacement, keeping each row with probability `fraction`.
    /// `fraction` is always within `[0, 1]`.
    fn sample(&self, fraction: f64) -> Result<Self, Self::Error>;
}

/// One dataset to dedupe, or a left/right pair to link.
#[derive(Debug)]
pub enum Frames<'a, D> {
    Dedupe(&'a D),
    Link { left: &'a D, right: &'a D },
}

impl<D> Clone for Frames<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for Frames<'_, D> {}

impl<D> Frames<'_, D> {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Dedupe(_) => "a single dataset",
            Self::Link { .. } => "a left and a right dataset",
        }
    }
}

/// Engine session: the transforms the pipeline delegates to, in call order.
pub trait Session {
    type Dataset: Dataset<Error = Self::Error>;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fill defaults. Must preserve comparison column order.
    fn complete_settings(&self, settings: &Settings) -> Result<Settings, Self::Error>;

    /// Unrestricted pair generation over the given frames. Cross pairs only
    /// for `link_only`; cross and within pairs for `link_and_dedupe`.
    fn cartesian_block(
        &self,
        settings: &Settings,
        frames: Frames<'_, Self::Dataset>,
    ) -> Result<Self::Dataset, Self::Error>;

    /// Add one comparison-outcome column per comparison column.
    fn add_gammas(
        &self,
        pairs: &Self::Dataset,
        settings: &Settings,
    ) -> Result<Self::Dataset, Self::Error>;

    /// Attach a constant `match_probability` column.
    fn with_match_probability(
        &self,
        pairs: &Self::Dataset,
        probability: f64,
    ) -> Result<Self::Dataset, Self::Error>;

    /// Update the model's probability tables in place from the scored pairs.
    fn run_maximisation_step(
        &self,
        pairs: &Self::Dataset,
        model: &mut Model,
    ) -> Result<(), Self::Error>;
}
