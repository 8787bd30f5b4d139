use ulink_settings::Settings;

use crate::error::EstimateError;

/// Copy each column's u-probability table from `estimated` into `target` at
/// the same position. Nothing else in `target` is touched.
///
/// Columns are matched by position only. A length mismatch is rejected before
/// any column is written.
pub fn merge_u_probabilities(target: &mut Settings, estimated: &Settings) -> Result<(), EstimateError> {
    if target.comparison_columns.len() != estimated.comparison_columns.len() {
        return Err(EstimateError::ColumnCountMismatch {
            original: target.comparison_columns.len(),
            completed: estimated.comparison_columns.len(),
        });
    }

    for (col, est) in target
        .comparison_columns
        .iter_mut()
        .zip(&estimated.comparison_columns)
    {
        col.u_probabilities = est.u_probabilities.clone();
    }

    Ok(())
}
