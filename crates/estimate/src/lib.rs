//! `ulink-estimate` — direct u-probability estimation.
//!
//! Samples the input, builds the unrestricted pair set over the sample and
//! estimates each comparison column's u-probabilities on the assumption that
//! almost every such pair is a non-match. The engine doing the heavy lifting
//! sits behind the [`session::Session`] and [`session::Dataset`] traits;
//! [`memory`] provides a local implementation.

pub mod dispatch;
pub mod error;
pub mod estimate;
pub mod memory;
pub mod merge;
pub mod model;
pub mod prepare;
pub mod sample;
pub mod session;

pub use error::EstimateError;
pub use estimate::{estimate_u_values, run, Estimate, EstimateOptions};
pub use model::Model;
pub use sample::{SamplingPlan, DEFAULT_TARGET_ROWS};
pub use session::{Dataset, Frames, Session};
