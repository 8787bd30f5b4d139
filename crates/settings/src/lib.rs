//! `ulink-settings` — typed record-linkage settings.
//!
//! Link type, ordered comparison columns with their level-indexed m/u
//! probability tables, parsing from TOML/JSON, validation, and the default
//! completion routine.

pub mod complete;
pub mod error;
pub mod settings;

pub use complete::complete_settings;
pub use error::SettingsError;
pub use settings::{ComparisonColumn, LinkType, ParameterRecord, Settings};
