use serde::Serialize;

/// Evaluation errors that can occur during statement execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Bound parameters do not match the statement's placeholders
    ParameterCount { expected: usize, got: usize },
    /// `get`/`all` called on a statement that returns no rows
    NotAQuery,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParameterCount { expected, got } => {
                write!(f, "Statement expects {expected} parameters, got {got}")
            }
            Self::NotAQuery => write!(f, "Statement does not return rows; use run instead"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Statistics collected during statement execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvalStats {
    pub rows_scanned: usize,
    pub inserted_count: usize,
    pub updated_count: usize,
    pub deleted_count: usize,
    pub returned_count: usize,
    pub duration_ms: u128,
}

impl EvalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rows_scanned(&mut self, count: usize) {
        self.rows_scanned += count;
    }

    pub fn record_duration(&mut self, duration: std::time::Duration) {
        self.duration_ms = duration.as_millis();
    }

    /// Rows changed by the statement.
    pub const fn affected(&self) -> usize {
        self.inserted_count + self.updated_count + self.deleted_count
    }
}
