use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// TOML / JSON parse or deserialization error.
    Parse(String),
    /// Settings validation error (missing name, bad probability table, etc.).
    Validation(String),
    /// `link_type` is not one of the three recognized values.
    InvalidLinkType(String),
    /// No default probability table exists for this many levels.
    UnsupportedLevels { column: String, levels: u8 },
    /// IO error (file read, unknown extension).
    Io(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "settings parse error: {msg}"),
            Self::Validation(msg) => write!(f, "settings validation error: {msg}"),
            Self::InvalidLinkType(value) => write!(
                f,
                "invalid link_type '{value}' (expected dedupe_only, link_only or link_and_dedupe)"
            ),
            Self::UnsupportedLevels { column, levels } => write!(
                f,
                "column '{column}': no default probabilities for {levels} levels (supported: 2-6)"
            ),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for SettingsError {}
