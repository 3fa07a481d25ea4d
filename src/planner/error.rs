use std::fmt;

/// Errors that can occur during query planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// WHERE clause outside the supported shapes
    UnsupportedPredicate(String),
    /// Join condition the evaluator cannot execute
    UnsupportedJoin(String),
    /// Column qualifier that names neither the FROM nor the JOIN table
    UnknownQualifier(String),
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPredicate(clause) => {
                write!(f, "Unsupported WHERE clause: {clause}")
            }
            Self::UnsupportedJoin(msg) => write!(f, "Unsupported join: {msg}"),
            Self::UnknownQualifier(name) => write!(f, "Unknown table or alias: {name}"),
        }
    }
}

impl std::error::Error for PlanError {}

/// Result type for planning operations
pub type PlanResult<T> = Result<T, PlanError>;
