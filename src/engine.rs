use crate::ast::{Datum, Record, Statement};
use crate::evaluator::{EvalError, EvalResult, EvalStats, Evaluator};
use crate::parser::{ParseError, parse_statement, split_statements};
use crate::planner::{Plan, PlanError, PlanExplanation, PlanNode, Planner};
use crate::storage::{Database, StorageBackend, StorageError};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug)]
pub enum EngineError {
    Parse(ParseError),
    Plan(PlanError),
    Eval(EvalError),
    Storage(StorageError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Plan(e) => write!(f, "Plan error: {e}"),
            Self::Eval(e) => write!(f, "Evaluation error: {e}"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Plan(e) => Some(e),
            Self::Eval(e) => Some(e),
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<PlanError> for EngineError {
    fn from(e: PlanError) -> Self {
        Self::Plan(e)
    }
}

impl From<EvalError> for EngineError {
    fn from(e: EvalError) -> Self {
        Self::Eval(e)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// When mutations reach the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Every statement that changes the store saves it before returning.
    #[default]
    WriteThrough,
    /// Changes stay in memory until [`Engine::flush`].
    Deferred,
}

/// How a statement's outcome is reported.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    All,
    Get,
    Run,
    Exec,
}

/// Outcome of [`Engine::dispatch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Rows(Vec<Record>),
    Row(Option<Record>),
    Affected(usize),
}

/// The store object: owns a backend and a cached snapshot of its contents.
pub struct Engine {
    backend: Box<dyn StorageBackend>,
    cache: Option<Database>,
    write_mode: WriteMode,
    dirty: bool,
    planner: Planner,
}

impl Engine {
    /// Opens a store, creating an empty one in the backend if none exists.
    /// The snapshot itself is loaded on first use.
    pub fn open(backend: impl StorageBackend + 'static) -> Result<Self> {
        backend.ensure_exists()?;
        log::info!("Opened store at {}", backend.location());
        Ok(Self {
            backend: Box::new(backend),
            cache: None,
            write_mode: WriteMode::default(),
            dirty: false,
            planner: Planner::new(),
        })
    }

    #[must_use]
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    #[must_use]
    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub const fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// Parses and plans a statement. A lenient planner turns unparseable
    /// statements into a no-op plan.
    pub fn compile(&self, sql: &str) -> Result<Plan> {
        let statement = match parse_statement(sql) {
            Ok(statement) => statement,
            Err(e) if self.planner.is_lenient() => {
                log::warn!("Treating unparseable statement as a no-op: {e}");
                return Ok(Plan::unrecognized(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.planner.plan(&statement)?)
    }

    pub fn explain(&self, sql: &str) -> Result<PlanExplanation> {
        Ok(self.compile(sql)?.explain())
    }

    /// Compiles a statement once for repeated execution.
    pub fn prepare(&mut self, sql: &str) -> Result<Prepared<'_>> {
        let plan = self.compile(sql)?;
        Ok(Prepared { engine: self, plan })
    }

    pub fn run(&mut self, sql: &str, params: &[Datum]) -> Result<EvalStats> {
        self.prepare(sql)?.run(params)
    }

    pub fn get(&mut self, sql: &str, params: &[Datum]) -> Result<Option<Record>> {
        self.prepare(sql)?.get(params)
    }

    pub fn all(&mut self, sql: &str, params: &[Datum]) -> Result<Vec<Record>> {
        self.prepare(sql)?.all(params)
    }

    /// Runs a statement in the given mode and reports its outcome with statistics.
    pub fn dispatch(&mut self, mode: Mode, sql: &str, params: &[Datum]) -> Result<(Output, EvalStats)> {
        if mode == Mode::Exec {
            let removed = self.exec(sql)?;
            let mut stats = EvalStats::new();
            stats.deleted_count = removed;
            return Ok((Output::Affected(removed), stats));
        }

        let mut prepared = self.prepare(sql)?;
        match mode {
            Mode::Run => {
                let stats = prepared.run(params)?;
                Ok((Output::Affected(stats.affected()), stats))
            }
            Mode::Get => {
                let result = prepared.query(params)?;
                Ok((Output::Row(result.rows.into_iter().next()), result.stats))
            }
            Mode::All | Mode::Exec => {
                let result = prepared.query(params)?;
                Ok((Output::Rows(result.rows), result.stats))
            }
        }
    }

    /// Executes a multi-statement script. Only `DELETE FROM` segments take
    /// effect, each clearing its whole table. Returns the number of records removed.
    pub fn exec(&mut self, sql: &str) -> Result<usize> {
        let tables: Vec<_> = split_statements(sql)
            .into_iter()
            .filter_map(|segment| match parse_statement(segment) {
                Ok(Statement::Delete { table, .. }) => Some(table),
                Ok(_) => None,
                Err(e) => {
                    log::debug!("Skipping script segment: {e}");
                    None
                }
            })
            .collect();

        let db = self.database_mut()?;
        let removed: usize = tables.into_iter().map(|table| db.clear(table)).sum();
        log::debug!("Script removed {removed} records");

        self.mark_dirty()?;
        Ok(removed)
    }

    /// Saves pending changes to the backend.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(db) = &self.cache {
            self.backend.save(db)?;
            log::debug!("Flushed {} records to {}", db.len(), self.backend.location());
        }
        self.dirty = false;
        Ok(())
    }

    pub const fn has_pending_changes(&self) -> bool {
        self.dirty
    }

    /// The current snapshot, loading it from the backend on first use.
    pub fn database(&mut self) -> Result<&Database> {
        Ok(self.database_mut()?)
    }

    fn database_mut(&mut self) -> Result<&mut Database> {
        if self.cache.is_none() {
            let db = self.backend.load()?;
            log::debug!("Loaded {} records from {}", db.len(), self.backend.location());
            self.cache = Some(db);
        }
        Ok(self.cache.get_or_insert_with(Database::new))
    }

    fn evaluate(&mut self, plan: &Plan, params: &[Datum]) -> Result<EvalResult> {
        let db = self.database_mut()?;
        let result = Evaluator::new(db).eval(plan, params)?;
        if plan.is_mutation() {
            self.mark_dirty()?;
        }
        Ok(result)
    }

    fn mark_dirty(&mut self) -> Result<()> {
        self.dirty = true;
        match self.write_mode {
            WriteMode::WriteThrough => self.flush(),
            WriteMode::Deferred => Ok(()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.dirty {
            log::warn!(
                "Dropping store {} with unflushed changes",
                self.backend.location()
            );
        }
    }
}

/// A compiled statement bound to its engine.
pub struct Prepared<'e> {
    engine: &'e mut Engine,
    plan: Plan,
}

impl Prepared<'_> {
    pub const fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Executes a mutation. Queries are not executed.
    pub fn run(&mut self, params: &[Datum]) -> Result<EvalStats> {
        if matches!(self.plan.node, PlanNode::Unrecognized { .. }) {
            log::debug!("Ignoring run of an unrecognized statement");
            return Ok(EvalStats::new());
        }
        if self.plan.is_query() {
            log::debug!("Ignoring run of a query statement");
            return Ok(EvalStats::new());
        }
        Ok(self.engine.evaluate(&self.plan, params)?.stats)
    }

    /// First row of the query, after ordering and limiting.
    pub fn get(&mut self, params: &[Datum]) -> Result<Option<Record>> {
        Ok(self.query(params)?.rows.into_iter().next())
    }

    pub fn all(&mut self, params: &[Datum]) -> Result<Vec<Record>> {
        Ok(self.query(params)?.rows)
    }

    fn query(&mut self, params: &[Datum]) -> Result<EvalResult> {
        if matches!(self.plan.node, PlanNode::Unrecognized { .. }) {
            return Ok(EvalResult {
                rows: Vec::new(),
                stats: EvalStats::new(),
            });
        }
        if !self.plan.is_query() {
            return Err(EvalError::NotAQuery.into());
        }
        self.engine.evaluate(&self.plan, params)
    }
}

/// A fresh record id: `<unix-millis>-<9 random characters>`.
pub fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("{millis}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Table;
    use crate::storage::MemoryStorage;

    fn engine() -> (Engine, MemoryStorage) {
        let storage = MemoryStorage::new();
        let engine = Engine::open(storage.clone()).unwrap();
        (engine, storage)
    }

    #[test]
    fn test_open_creates_empty_store() {
        let (_engine, storage) = engine();
        assert_eq!(storage.saved_len(), Some(0));
    }

    #[test]
    fn test_write_through_saves_each_mutation() {
        let (mut engine, storage) = engine();
        engine
            .run("INSERT INTO users (id) VALUES (?)", &["u1".into()])
            .unwrap();
        assert_eq!(storage.saved_len(), Some(1));
        assert!(!engine.has_pending_changes());
    }

    #[test]
    fn test_deferred_waits_for_flush() {
        let (engine, storage) = engine();
        let mut engine = engine.with_write_mode(WriteMode::Deferred);
        engine
            .run("INSERT INTO users (id) VALUES (?)", &["u1".into()])
            .unwrap();
        assert_eq!(storage.saved_len(), Some(0));
        assert!(engine.has_pending_changes());

        engine.flush().unwrap();
        assert_eq!(storage.saved_len(), Some(1));
    }

    #[test]
    fn test_prepared_statement_reuse() {
        let (mut engine, _) = engine();
        let mut insert = engine
            .prepare("INSERT INTO communities (id, name) VALUES (?, ?)")
            .unwrap();
        insert.run(&["c1".into(), "Gardeners".into()]).unwrap();
        insert.run(&["c2".into(), "Cyclists".into()]).unwrap();

        let rows = engine.all("SELECT name FROM communities", &[]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_get_and_all_reject_mutations() {
        let (mut engine, _) = engine();
        let err = engine
            .all("DELETE FROM users WHERE id = ?", &["u1".into()])
            .unwrap_err();
        assert!(matches!(err, EngineError::Eval(EvalError::NotAQuery)));
    }

    #[test]
    fn test_run_on_query_is_noop() {
        let (mut engine, _) = engine();
        let stats = engine.run("SELECT * FROM users", &[]).unwrap();
        assert_eq!(stats, EvalStats::new());
    }

    #[test]
    fn test_strict_and_lenient_compile() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.compile("DROP TABLE users"),
            Err(EngineError::Parse(_))
        ));

        let engine = engine.with_planner(Planner::lenient());
        let plan = engine.compile("DROP TABLE users").unwrap();
        assert!(matches!(plan.node, PlanNode::Unrecognized { .. }));
    }

    #[test]
    fn test_exec_clears_deleted_tables() {
        let (mut engine, _) = engine();
        engine.run("INSERT INTO users (id) VALUES ('u1')", &[]).unwrap();
        engine.run("INSERT INTO posts (id) VALUES ('p1')", &[]).unwrap();
        engine.run("INSERT INTO comments (id) VALUES ('x1')", &[]).unwrap();

        let removed = engine
            .exec("DELETE FROM users WHERE id = 'nope'; CREATE TABLE t (a); DELETE FROM posts;")
            .unwrap();
        assert_eq!(removed, 2);

        let db = engine.database().unwrap();
        assert!(db.table(Table::Users).is_empty());
        assert!(db.table(Table::Posts).is_empty());
        assert_eq!(db.table(Table::Comments).len(), 1);
    }

    #[test]
    fn test_dispatch_modes() {
        let (mut engine, _) = engine();
        let (output, stats) = engine
            .dispatch(Mode::Run, "INSERT INTO users (id) VALUES (?)", &["u1".into()])
            .unwrap();
        assert_eq!(output, Output::Affected(1));
        assert_eq!(stats.inserted_count, 1);

        let (output, _) = engine
            .dispatch(Mode::Get, "SELECT id FROM users WHERE id = ?", &["u2".into()])
            .unwrap();
        assert_eq!(output, Output::Row(None));
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        let (millis, suffix) = id.split_once('-').unwrap();
        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(suffix.len(), 9);
        assert_ne!(generate_id(), id);
    }
}
