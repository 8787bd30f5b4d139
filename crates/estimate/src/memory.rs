//! In-memory reference backend.
//!
//! Rows are JSON objects held in a `Vec`. Suitable for small data sets and
//! tests; pair generation is quadratic in the sampled row count.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use ulink_settings::{complete_settings, LinkType, Settings, SettingsError};

use crate::model::Model;
use crate::session::{Dataset, Frames, Session};

pub type Row = Map<String, Value>;

pub const MATCH_PROBABILITY_COLUMN: &str = "match_probability";

const LEFT_SOURCE: &str = "left";
const RIGHT_SOURCE: &str = "right";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryError {
    /// Sampling fraction outside `[0, 1]`.
    InvalidFraction(f64),
    /// JSON input is not an array of rows.
    NotAnArray,
    /// Input row is not a JSON object.
    NotAnObject { index: usize },
    /// CSV read error.
    Csv(String),
    /// Frames don't fit the link type.
    FramesMismatch { link_type: LinkType },
    /// Custom case expressions are not evaluated by this backend.
    UnsupportedComparison { column: String },
    /// A column the step needs is missing or has the wrong type.
    MissingColumn(String),
    /// Comparison outcome outside `-1..levels`.
    GammaOutOfRange { column: String, value: i64, levels: u8 },
    /// No pair contributed to this column's estimate.
    NoComparisons { column: String },
    Settings(SettingsError),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFraction(p) => write!(f, "sampling fraction {p} is outside [0, 1]"),
            Self::NotAnArray => write!(f, "expected a JSON array of row objects"),
            Self::NotAnObject { index } => write!(f, "row {index} is not a JSON object"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::FramesMismatch { link_type } => {
                write!(f, "frames do not match link type {link_type}")
            }
            Self::UnsupportedComparison { column } => write!(
                f,
                "column '{column}': case_expression comparisons are not supported in memory"
            ),
            Self::MissingColumn(name) => write!(f, "missing or non-numeric column '{name}'"),
            Self::GammaOutOfRange { column, value, levels } => write!(
                f,
                "column '{column}': comparison outcome {value} outside -1..{levels}"
            ),
            Self::NoComparisons { column } => write!(
                f,
                "column '{column}': no non-null comparisons in the sample; increase target_rows"
            ),
            Self::Settings(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for MemoryError {}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

type SharedRng = Arc<Mutex<StdRng>>;

#[derive(Debug, Clone, Default)]
pub struct MemoryFrame {
    rows: Vec<Row>,
    /// Set when the frame is bound to a seeded session.
    rng: Option<SharedRng>,
}

impl MemoryFrame {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, rng: None }
    }

    /// Build from a JSON array of objects.
    pub fn from_json(value: Value) -> Result<Self, MemoryError> {
        let items = match value {
            Value::Array(items) => items,
            _ => return Err(MemoryError::NotAnArray),
        };
        let rows = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => Ok(map),
                _ => Err(MemoryError::NotAnObject { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rows))
    }

    /// Build from CSV with a header row. Values are kept as strings; empty
    /// fields become null.
    pub fn from_csv(csv_data: &str) -> Result<Self, MemoryError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| MemoryError::Csv(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| MemoryError::Csv(e.to_string()))?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| {
                    let value = if v.is_empty() { Value::Null } else { Value::String(v.to_string()) };
                    (h.clone(), value)
                })
                .collect();
            rows.push(row);
        }

        Ok(Self::new(rows))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn derive(&self, rows: Vec<Row>) -> Self {
        Self {
            rows,
            rng: self.rng.clone(),
        }
    }
}

impl Dataset for MemoryFrame {
    type Error = MemoryError;

    fn count(&self) -> Result<u64, MemoryError> {
        Ok(self.rows.len() as u64)
    }

    fn sample(&self, fraction: f64) -> Result<Self, MemoryError> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(MemoryError::InvalidFraction(fraction));
        }
        let rows = match &self.rng {
            Some(shared) => {
                let mut rng = shared.lock().unwrap_or_else(PoisonError::into_inner);
                bernoulli(&self.rows, fraction, &mut *rng)
            }
            None => bernoulli(&self.rows, fraction, &mut StdRng::from_entropy()),
        };
        Ok(self.derive(rows))
    }
}

/// Keep each row independently with probability `fraction`.
fn bernoulli<R: Rng>(rows: &[Row], fraction: f64, rng: &mut R) -> Vec<Row> {
    rows.iter().filter(|_| rng.gen_bool(fraction)).cloned().collect()
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The default session samples from entropy. A seeded session owns one RNG
/// stream that every bound frame draws from, so successive samples (right,
/// then left) are independent of each other yet repeatable run to run.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    rng: Option<SharedRng>,
}

impl MemorySession {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Some(Arc::new(Mutex::new(StdRng::seed_from_u64(seed)))),
        }
    }

    /// Route the frame's sampling through this session's RNG. A no-op for
    /// an unseeded session.
    pub fn bind(&self, mut frame: MemoryFrame) -> MemoryFrame {
        if self.rng.is_some() {
            frame.rng = self.rng.clone();
        }
        frame
    }
}

fn source_column(settings: &Settings) -> String {
    settings
        .source_dataset_column_name
        .clone()
        .unwrap_or_else(|| ulink_settings::complete::DEFAULT_SOURCE_DATASET_COLUMN.to_string())
}

fn tag_source(rows: &[Row], source_col: &str, source: &str) -> Vec<Row> {
    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            row.insert(source_col.to_string(), Value::String(source.to_string()));
            row
        })
        .collect()
}

fn pair_row(left: &Row, right: &Row) -> Row {
    let mut out = Row::new();
    for (k, v) in left {
        out.insert(format!("{k}_l"), v.clone());
    }
    for (k, v) in right {
        out.insert(format!("{k}_r"), v.clone());
    }
    out
}

/// All `i < j` pairs within one list of rows.
fn within_pairs(rows: &[Row]) -> Vec<Row> {
    let mut out = Vec::with_capacity(rows.len() * rows.len().saturating_sub(1) / 2);
    for (i, left) in rows.iter().enumerate() {
        for right in &rows[i + 1..] {
            out.push(pair_row(left, right));
        }
    }
    out
}

fn gamma_for(left: Option<&Value>, right: Option<&Value>, levels: u8) -> i64 {
    match (left, right) {
        (None, _) | (_, None) | (Some(Value::Null), _) | (_, Some(Value::Null)) => -1,
        (Some(l), Some(r)) if l == r => i64::from(levels) - 1,
        _ => 0,
    }
}

impl Session for MemorySession {
    type Dataset = MemoryFrame;
    type Error = MemoryError;

    fn complete_settings(&self, settings: &Settings) -> Result<Settings, MemoryError> {
        complete_settings(settings).map_err(MemoryError::Settings)
    }

    fn cartesian_block(
        &self,
        settings: &Settings,
        frames: Frames<'_, MemoryFrame>,
    ) -> Result<MemoryFrame, MemoryError> {
        let link_type = settings.link_type;
        let pairs = match (link_type, frames) {
            (LinkType::DedupeOnly, Frames::Dedupe(df)) => df.derive(within_pairs(&df.rows)),
            (LinkType::LinkOnly, Frames::Link { left, right }) => {
                let source_col = source_column(settings);
                let left_rows = tag_source(&left.rows, &source_col, LEFT_SOURCE);
                let right_rows = tag_source(&right.rows, &source_col, RIGHT_SOURCE);
                let mut out = Vec::with_capacity(left_rows.len() * right_rows.len());
                for l in &left_rows {
                    for r in &right_rows {
                        out.push(pair_row(l, r));
                    }
                }
                left.derive(out)
            }
            (LinkType::LinkAndDedupe, Frames::Link { left, right }) => {
                let source_col = source_column(settings);
                let mut rows = tag_source(&left.rows, &source_col, LEFT_SOURCE);
                rows.extend(tag_source(&right.rows, &source_col, RIGHT_SOURCE));
                left.derive(within_pairs(&rows))
            }
            (LinkType::DedupeOnly, Frames::Link { .. })
            | (LinkType::LinkOnly | LinkType::LinkAndDedupe, Frames::Dedupe(_)) => {
                return Err(MemoryError::FramesMismatch { link_type });
            }
        };
        log::debug!("{link_type}: generated {} candidate pairs", pairs.len());
        Ok(pairs)
    }

    fn add_gammas(&self, pairs: &MemoryFrame, settings: &Settings) -> Result<MemoryFrame, MemoryError> {
        let mut columns = Vec::with_capacity(settings.comparison_columns.len());
        for col in &settings.comparison_columns {
            let name = col.name().unwrap_or_default().to_string();
            if col.case_expression.is_some() || col.col_name.is_none() {
                return Err(MemoryError::UnsupportedComparison { column: name });
            }
            let gamma = col
                .gamma_column_name()
                .ok_or_else(|| MemoryError::MissingColumn(name.clone()))?;
            columns.push((format!("{name}_l"), format!("{name}_r"), gamma, col.levels()));
        }

        let rows = pairs
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (left, right, gamma, levels) in &columns {
                    let value = gamma_for(row.get(left), row.get(right), *levels);
                    row.insert(gamma.clone(), Value::from(value));
                }
                row
            })
            .collect();

        Ok(pairs.derive(rows))
    }

    fn with_match_probability(&self, pairs: &MemoryFrame, probability: f64) -> Result<MemoryFrame, MemoryError> {
        let rows = pairs
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.insert(MATCH_PROBABILITY_COLUMN.to_string(), Value::from(probability));
                row
            })
            .collect();
        Ok(pairs.derive(rows))
    }

    fn run_maximisation_step(&self, pairs: &MemoryFrame, model: &mut Model) -> Result<(), MemoryError> {
        let probabilities = pairs
            .rows
            .iter()
            .map(|row| {
                row.get(MATCH_PROBABILITY_COLUMN)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| MemoryError::MissingColumn(MATCH_PROBABILITY_COLUMN.into()))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        // Compute everything before writing so a failure leaves the model as it was.
        let mut updates = Vec::new();
        for col in &model.current_settings().comparison_columns {
            let name = col.name().unwrap_or_default().to_string();
            let gamma = col
                .gamma_column_name()
                .ok_or_else(|| MemoryError::MissingColumn(name.clone()))?;
            let levels = col.levels();

            let mut u_weights = vec![0.0; levels as usize];
            let mut m_weights = vec![0.0; levels as usize];
            for (row, p) in pairs.rows.iter().zip(&probabilities) {
                let value = row
                    .get(&gamma)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| MemoryError::MissingColumn(gamma.clone()))?;
                if value == -1 {
                    continue;
                }
                if value < 0 || value >= i64::from(levels) {
                    return Err(MemoryError::GammaOutOfRange { column: name, value, levels });
                }
                u_weights[value as usize] += 1.0 - p;
                m_weights[value as usize] += p;
            }

            let normalise = |weights: Vec<f64>| {
                let total: f64 = weights.iter().sum();
                (total > 0.0).then(|| weights.iter().map(|w| w / total).collect::<Vec<f64>>())
            };
            let u = normalise(u_weights);
            let m = normalise(m_weights);
            if u.is_none() && m.is_none() {
                return Err(MemoryError::NoComparisons { column: name });
            }
            updates.push((u, m));
        }

        let settings = model.current_settings_mut();
        for (col, (u, m)) in settings.comparison_columns.iter_mut().zip(updates) {
            if u.is_some() {
                col.u_probabilities = u;
            }
            if m.is_some() {
                col.m_probabilities = m;
            }
        }
        if !probabilities.is_empty() {
            settings.proportion_of_matches =
                Some(probabilities.iter().sum::<f64>() / probabilities.len() as f64);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulink_settings::ComparisonColumn;

    fn frame(value: Value) -> MemoryFrame {
        MemoryFrame::from_json(value).unwrap()
    }

    fn people() -> MemoryFrame {
        frame(json!([
            {"first_name": "ann", "surname": "lee"},
            {"first_name": "ann", "surname": "kim"},
            {"first_name": "bob", "surname": null},
            {"first_name": "cat", "surname": "lee"},
        ]))
    }

    fn settings(link_type: LinkType) -> Settings {
        complete_settings(&Settings::new(
            link_type,
            vec![ComparisonColumn::new("first_name"), ComparisonColumn::new("surname")],
        ))
        .unwrap()
    }

    #[test]
    fn from_json_rejects_non_objects() {
        let err = MemoryFrame::from_json(json!([{"a": 1}, 2])).unwrap_err();
        assert_eq!(err, MemoryError::NotAnObject { index: 1 });
    }

    #[test]
    fn from_json_rejects_non_arrays() {
        let err = MemoryFrame::from_json(json!({"first_name": "ann"})).unwrap_err();
        assert_eq!(err, MemoryError::NotAnArray);
        assert_eq!(err.to_string(), "expected a JSON array of row objects");
    }

    #[test]
    fn from_csv_reads_headers_and_nulls() {
        let df = MemoryFrame::from_csv("first_name,surname\nann,lee\nbob,\n").unwrap();
        assert_eq!(df.len(), 2);
        assert_eq!(df.rows()[0]["surname"], json!("lee"));
        assert_eq!(df.rows()[1]["surname"], Value::Null);
    }

    #[test]
    fn sample_full_and_empty() {
        let df = people();
        assert_eq!(df.sample(1.0).unwrap().len(), 4);
        assert_eq!(df.sample(0.0).unwrap().len(), 0);
        assert_eq!(df.sample(1.5).unwrap_err(), MemoryError::InvalidFraction(1.5));
    }

    fn numbered(n: usize) -> MemoryFrame {
        let rows: Vec<Row> = (0..n)
            .map(|i| json!({"id": i}).as_object().cloned().unwrap())
            .collect();
        MemoryFrame::new(rows)
    }

    fn kept_ids(df: &MemoryFrame) -> Vec<i64> {
        df.rows().iter().map(|row| row["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn frames_on_one_seeded_session_sample_independently() {
        let session = MemorySession::seeded(11);
        let left = session.bind(numbered(1000));
        let right = session.bind(numbered(1000));

        let right_kept = kept_ids(&right.sample(0.5).unwrap());
        let left_kept = kept_ids(&left.sample(0.5).unwrap());
        assert_ne!(left_kept, right_kept);
        // Same frame, next draw
        assert_ne!(kept_ids(&left.sample(0.5).unwrap()), left_kept);
    }

    #[test]
    fn seeded_sessions_are_repeatable() {
        let draws = |seed| {
            let session = MemorySession::seeded(seed);
            let left = session.bind(numbered(200));
            let right = session.bind(numbered(200));
            (kept_ids(&right.sample(0.3).unwrap()), kept_ids(&left.sample(0.3).unwrap()))
        };
        assert_eq!(draws(42), draws(42));
        assert_ne!(draws(42), draws(43));
    }

    #[test]
    fn derived_frames_stay_on_the_session_stream() {
        let s = settings(LinkType::DedupeOnly);
        let session = MemorySession::seeded(5);
        let pairs = session.cartesian_block(&s, Frames::Dedupe(&session.bind(people()))).unwrap();
        assert!(pairs.rng.is_some());
        assert!(MemorySession::default().bind(people()).rng.is_none());
    }

    #[test]
    fn dedupe_block_counts() {
        let pairs = MemorySession::default()
            .cartesian_block(&settings(LinkType::DedupeOnly), Frames::Dedupe(&people()))
            .unwrap();
        assert_eq!(pairs.len(), 6);
        assert!(pairs.rows()[0].contains_key("first_name_l"));
        assert!(pairs.rows()[0].contains_key("first_name_r"));
    }

    #[test]
    fn link_block_counts() {
        let session = MemorySession::default();
        let left = people();
        let right = frame(json!([{"first_name": "ann", "surname": "lee"}, {"first_name": "dan", "surname": "ng"}]));
        let frames = Frames::Link { left: &left, right: &right };

        let cross = session.cartesian_block(&settings(LinkType::LinkOnly), frames).unwrap();
        assert_eq!(cross.len(), 8);
        for row in cross.rows() {
            assert_eq!(row["source_dataset_l"], json!("left"));
            assert_eq!(row["source_dataset_r"], json!("right"));
        }

        let both = session.cartesian_block(&settings(LinkType::LinkAndDedupe), frames).unwrap();
        assert_eq!(both.len(), 15);
    }

    #[test]
    fn block_rejects_mismatched_frames() {
        let df = people();
        let err = MemorySession::default()
            .cartesian_block(&settings(LinkType::LinkOnly), Frames::Dedupe(&df))
            .unwrap_err();
        assert_eq!(err, MemoryError::FramesMismatch { link_type: LinkType::LinkOnly });
    }

    #[test]
    fn gammas_cover_null_match_and_mismatch() {
        let session = MemorySession::default();
        let s = settings(LinkType::DedupeOnly);
        let pairs = session.cartesian_block(&s, Frames::Dedupe(&people())).unwrap();
        let gammas = session.add_gammas(&pairs, &s).unwrap();

        // (ann lee, ann kim): first_name equal, surname differs
        assert_eq!(gammas.rows()[0]["gamma_first_name"], json!(1));
        assert_eq!(gammas.rows()[0]["gamma_surname"], json!(0));
        // (ann lee, bob null): surname null
        assert_eq!(gammas.rows()[1]["gamma_surname"], json!(-1));
        // (ann lee, cat lee)
        assert_eq!(gammas.rows()[2]["gamma_surname"], json!(1));
    }

    #[test]
    fn gammas_reject_case_expressions() {
        let mut s = settings(LinkType::DedupeOnly);
        s.comparison_columns[0].case_expression = Some("case when ... end".into());
        let err = MemorySession::default().add_gammas(&people(), &s).unwrap_err();
        assert_eq!(err, MemoryError::UnsupportedComparison { column: "first_name".into() });
    }

    #[test]
    fn maximisation_with_zero_prior_sets_u_only() {
        let session = MemorySession::default();
        let s = settings(LinkType::DedupeOnly);
        let pairs = session.cartesian_block(&s, Frames::Dedupe(&people())).unwrap();
        let gammas = session.add_gammas(&pairs, &s).unwrap();
        let scored = session.with_match_probability(&gammas, 0.0).unwrap();

        let mut model = Model::new(s.clone());
        session.run_maximisation_step(&scored, &mut model).unwrap();
        let out = model.current_settings();

        // first_name: 1 agreeing pair of 6
        let u = out.comparison_columns[0].u_probabilities.as_ref().unwrap();
        assert!((u[0] - 5.0 / 6.0).abs() < 1e-12);
        assert!((u[1] - 1.0 / 6.0).abs() < 1e-12);
        // surname: 3 pairs with a null, 1 agreeing of the remaining 3
        let u = out.comparison_columns[1].u_probabilities.as_ref().unwrap();
        assert!((u[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((u[1] - 1.0 / 3.0).abs() < 1e-12);
        // m keeps its starting values when no pair carries match weight
        assert_eq!(out.comparison_columns[0].m_probabilities, s.comparison_columns[0].m_probabilities);
        assert_eq!(out.proportion_of_matches, Some(0.0));
    }

    #[test]
    fn maximisation_without_pairs_fails() {
        let s = settings(LinkType::DedupeOnly);
        let before = s.clone();
        let mut model = Model::new(s);
        let err = MemorySession::default()
            .run_maximisation_step(&MemoryFrame::default(), &mut model)
            .unwrap_err();
        assert_eq!(err, MemoryError::NoComparisons { column: "first_name".into() });
        assert_eq!(model.current_settings(), &before);
    }

    #[test]
    fn maximisation_requires_match_probability() {
        let session = MemorySession::default();
        let s = settings(LinkType::DedupeOnly);
        let pairs = session.cartesian_block(&s, Frames::Dedupe(&people())).unwrap();
        let gammas = session.add_gammas(&pairs, &s).unwrap();
        let mut model = Model::new(s);
        let err = session.run_maximisation_step(&gammas, &mut model).unwrap_err();
        assert_eq!(err, MemoryError::MissingColumn("match_probability".into()));
    }
}
