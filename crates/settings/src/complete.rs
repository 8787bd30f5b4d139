use crate::error::SettingsError;
use crate::settings::Settings;

pub const DEFAULT_PROPORTION_OF_MATCHES: f64 = 0.3;
pub const DEFAULT_UNIQUE_ID_COLUMN: &str = "unique_id";
pub const DEFAULT_SOURCE_DATASET_COLUMN: &str = "source_dataset";
pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
pub const DEFAULT_EM_CONVERGENCE: f64 = 0.0001;

/// Starting m-probabilities by level count. Highest level = best agreement.
fn default_m_probabilities(levels: u8) -> Option<Vec<f64>> {
    let table: &[f64] = match levels {
        2 => &[0.1, 0.9],
        3 => &[0.1, 0.2, 0.7],
        4 => &[0.1, 0.1, 0.1, 0.7],
        5 => &[0.1, 0.1, 0.1, 0.2, 0.5],
        6 => &[0.1, 0.1, 0.1, 0.1, 0.1, 0.5],
        _ => return None,
    };
    Some(table.to_vec())
}

/// u defaults mirror m: non-matches mostly land on the lowest level.
fn default_u_probabilities(levels: u8) -> Option<Vec<f64>> {
    default_m_probabilities(levels).map(|mut t| {
        t.reverse();
        t
    })
}

/// Fill every optional field with its default. Returns a new value; the input
/// is left alone. Column order is preserved.
pub fn complete_settings(settings: &Settings) -> Result<Settings, SettingsError> {
    settings.validate()?;

    let mut completed = settings.clone();

    for col in &mut completed.comparison_columns {
        let levels = col.levels();
        let column = col.name().unwrap_or_default().to_string();
        let unsupported = || SettingsError::UnsupportedLevels {
            column: column.clone(),
            levels,
        };

        if col.m_probabilities.is_none() {
            col.m_probabilities = Some(default_m_probabilities(levels).ok_or_else(unsupported)?);
        }
        if col.u_probabilities.is_none() {
            col.u_probabilities = Some(default_u_probabilities(levels).ok_or_else(unsupported)?);
        }
        col.num_levels = Some(levels);
        col.term_frequency_adjustments.get_or_insert(false);
    }

    completed.proportion_of_matches.get_or_insert(DEFAULT_PROPORTION_OF_MATCHES);
    completed
        .unique_id_column_name
        .get_or_insert_with(|| DEFAULT_UNIQUE_ID_COLUMN.to_string());
    completed
        .source_dataset_column_name
        .get_or_insert_with(|| DEFAULT_SOURCE_DATASET_COLUMN.to_string());
    completed.max_iterations.get_or_insert(DEFAULT_MAX_ITERATIONS);
    completed.em_convergence.get_or_insert(DEFAULT_EM_CONVERGENCE);
    completed.retain_matching_columns.get_or_insert(true);
    completed.additional_columns_to_retain.get_or_insert_with(Vec::new);

    Ok(completed)
}
