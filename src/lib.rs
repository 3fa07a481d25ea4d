pub mod ast;
pub mod cli;
pub mod engine;
pub mod evaluator;
pub mod parser;
pub mod planner;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use ast::{Datum, Record, Statement, Table};
pub use engine::{Engine, EngineError, Mode, Output, Prepared, WriteMode, generate_id};
pub use evaluator::{EvalError, EvalResult, EvalStats, Evaluator};
pub use parser::{ParseError, parse_statement, split_statements};
pub use planner::{Plan, PlanError, PlanExplanation, PlanNode, Planner};
pub use storage::{
    Config, Database, JsonFileStorage, MemoryStorage, StorageBackend, StorageError,
};
