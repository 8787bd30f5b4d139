use ulink_settings::Settings;

use crate::error::EstimateError;
use crate::session::Session;

/// Two independent copies of the caller's settings.
#[derive(Debug, Clone)]
pub struct PreparedSettings {
    /// Returned to the caller; only u-probability tables are ever written.
    pub pristine: Settings,
    /// Completed with defaults; drives every collaborator call.
    pub working: Settings,
}

/// Deep-copy the settings and build an independent completed copy through the
/// session. Fails if completion changes the number of comparison columns,
/// since the final merge is positional.
pub fn prepare_settings<S: Session>(
    settings: &Settings,
    session: &S,
) -> Result<PreparedSettings, EstimateError> {
    let pristine = settings.clone();
    let working = session
        .complete_settings(settings)
        .map_err(EstimateError::collaborator)?;

    if working.comparison_columns.len() != pristine.comparison_columns.len() {
        return Err(EstimateError::ColumnCountMismatch {
            original: pristine.comparison_columns.len(),
            completed: working.comparison_columns.len(),
        });
    }

    Ok(PreparedSettings { pristine, working })
}
