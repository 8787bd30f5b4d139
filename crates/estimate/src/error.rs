use std::fmt;

use ulink_settings::{LinkType, SettingsError};

#[derive(Debug)]
pub enum EstimateError {
    /// Target pair count is zero, negative or not finite.
    InvalidTarget(f64),
    /// Row count of zero where a sampling proportion is needed.
    EmptyPopulation { link_type: LinkType },
    /// Dataset handles don't fit the link type (one vs. left/right).
    InputMismatch { link_type: LinkType, provided: &'static str },
    /// The completed settings changed the number of comparison columns.
    ColumnCountMismatch { original: usize, completed: usize },
    /// Run options could not be parsed.
    Options(String),
    /// Settings rejected by validation or completion.
    Settings(SettingsError),
    /// Failure inside a collaborator (sampling, blocking, gammas, maximisation).
    Collaborator(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl EstimateError {
    pub fn collaborator<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Collaborator(Box::new(err))
    }
}

impl fmt::Display for EstimateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget(t) => {
                write!(f, "target pair count must be a positive number, got {t}")
            }
            Self::EmptyPopulation { link_type } => {
                write!(f, "{link_type}: input has no rows, cannot compute a sampling proportion")
            }
            Self::InputMismatch { link_type, provided } => {
                let expected = if link_type.is_link() { "a left and a right dataset" } else { "a single dataset" };
                write!(f, "{link_type} requires {expected}, got {provided}")
            }
            Self::ColumnCountMismatch { original, completed } => write!(
                f,
                "completed settings have {completed} comparison column(s), expected {original}"
            ),
            Self::Options(msg) => write!(f, "options parse error: {msg}"),
            Self::Settings(e) => write!(f, "{e}"),
            Self::Collaborator(e) => write!(f, "collaborator failed: {e}"),
        }
    }
}

impl std::error::Error for EstimateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Settings(e) => Some(e),
            Self::Collaborator(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<SettingsError> for EstimateError {
    fn from(e: SettingsError) -> Self {
        Self::Settings(e)
    }
}
