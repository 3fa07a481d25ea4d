pub mod error;
pub mod predicate;
pub mod utils;

pub use error::{EvalError, EvalStats};
pub use predicate::{BoundPredicate, Fallback};

use crate::ast::{Datum, Record, Table};
use crate::evaluator::predicate::resolve_slot;
use crate::evaluator::utils::{compare_values, datums_equal, format_timestamp, is_blank};
use crate::planner::{
    FieldRef, JoinPlan, Plan, PlanNode, Predicate, ProjectItem, SelectPlan, Side, Slot,
};
use crate::storage::Database;
use std::time::Instant;
use time::OffsetDateTime;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// A base record and, for joined queries, the record it joined with.
#[derive(Debug, Clone, Copy)]
pub struct Row<'r> {
    pub base: &'r Record,
    pub joined: Option<&'r Record>,
}

impl<'r> Row<'r> {
    pub const fn single(base: &'r Record) -> Self {
        Self { base, joined: None }
    }

    pub fn field(&self, field: &FieldRef) -> Option<&'r Datum> {
        match field.side {
            Side::Base => self.base.get(&field.name),
            Side::Joined => self.joined.and_then(|joined| joined.get(&field.name)),
        }
    }

    fn project(&self, projection: &[ProjectItem]) -> Record {
        let mut out = Record::new();
        for item in projection {
            match item {
                ProjectItem::Everything => {
                    out.extend(self.base.clone());
                    if let Some(joined) = self.joined {
                        out.extend(joined.clone());
                    }
                }
                ProjectItem::AllOf(Side::Base) => out.extend(self.base.clone()),
                ProjectItem::AllOf(Side::Joined) => {
                    if let Some(joined) = self.joined {
                        out.extend(joined.clone());
                    }
                }
                ProjectItem::Field(field) => {
                    if let Some(value) = self.field(field) {
                        out.insert(field.name.clone(), value.clone());
                    }
                }
            }
        }
        out
    }
}

/// Result of statement evaluation including rows and statistics
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub rows: Vec<Record>,
    pub stats: EvalStats,
}

/// Executes compiled plans against a database snapshot.
pub struct Evaluator<'a> {
    db: &'a mut Database,
    now: OffsetDateTime,
    stats: EvalStats,
}

impl<'a> Evaluator<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self::at(db, OffsetDateTime::now_utc())
    }

    /// An evaluator whose notion of "now" is fixed to `now`.
    pub fn at(db: &'a mut Database, now: OffsetDateTime) -> Self {
        Self {
            db,
            now,
            stats: EvalStats::new(),
        }
    }

    pub fn eval(mut self, plan: &Plan, params: &[Datum]) -> Result<EvalResult, EvalError> {
        if params.len() != plan.param_count {
            return Err(EvalError::ParameterCount {
                expected: plan.param_count,
                got: params.len(),
            });
        }

        let start = Instant::now();
        let rows = match &plan.node {
            PlanNode::Insert { table, fields } => {
                self.eval_insert(*table, fields, params)?;
                Vec::new()
            }
            PlanNode::Update {
                table,
                assignments,
                predicate,
            } => {
                self.eval_update(*table, assignments, predicate, params)?;
                Vec::new()
            }
            PlanNode::Delete { table, predicate } => {
                self.eval_delete(*table, predicate, params)?;
                Vec::new()
            }
            PlanNode::Select(select) => self.eval_select(select, params)?,
            PlanNode::Unrecognized { reason } => {
                log::debug!("Skipping unrecognized statement: {reason}");
                Vec::new()
            }
        };
        self.stats.record_duration(start.elapsed());

        Ok(EvalResult {
            rows,
            stats: self.stats,
        })
    }

    fn eval_insert(
        &mut self,
        table: Table,
        fields: &[(String, Slot)],
        params: &[Datum],
    ) -> Result<(), EvalError> {
        let mut record = Record::new();
        for (name, slot) in fields {
            record.insert(name.clone(), resolve_slot(slot, params, self.now)?);
        }

        let now = format_timestamp(self.now);
        for key in [CREATED_AT, UPDATED_AT] {
            if is_blank(record.get(key)) {
                record.insert(key.to_string(), Datum::String(now.clone()));
            }
        }

        log::debug!("Inserting into {table}: {} fields", record.len());
        self.db.append(table, record);
        self.stats.inserted_count += 1;
        Ok(())
    }

    fn eval_update(
        &mut self,
        table: Table,
        assignments: &[(String, Slot)],
        predicate: &Predicate,
        params: &[Datum],
    ) -> Result<(), EvalError> {
        let values = assignments
            .iter()
            .map(|(name, slot)| Ok((name.clone(), resolve_slot(slot, params, self.now)?)))
            .collect::<Result<Vec<_>, EvalError>>()?;
        let matcher = BoundPredicate::bind(predicate, params, self.now, Fallback::MatchNothing)?;
        let now = format_timestamp(self.now);

        let records = self.db.table_mut(table);
        self.stats.record_rows_scanned(records.len());

        for record in records.iter_mut() {
            if !matcher.matches(&Row::single(record)) {
                continue;
            }
            for (name, value) in &values {
                record.insert(name.clone(), value.clone());
            }
            record.insert(UPDATED_AT.to_string(), Datum::String(now.clone()));
            self.stats.updated_count += 1;
        }

        log::debug!("Updated {} records in {table}", self.stats.updated_count);
        Ok(())
    }

    fn eval_delete(
        &mut self,
        table: Table,
        predicate: &Predicate,
        params: &[Datum],
    ) -> Result<(), EvalError> {
        let matcher = BoundPredicate::bind(predicate, params, self.now, Fallback::MatchNothing)?;

        self.stats.record_rows_scanned(self.db.table(table).len());
        let removed = self
            .db
            .remove_where(table, |record| matcher.matches(&Row::single(record)));
        self.stats.deleted_count += removed;

        log::debug!("Deleted {removed} records from {table}");
        Ok(())
    }

    fn eval_select(
        &mut self,
        select: &SelectPlan,
        params: &[Datum],
    ) -> Result<Vec<Record>, EvalError> {
        let matcher =
            BoundPredicate::bind(&select.predicate, params, self.now, Fallback::MatchEverything)?;

        let db: &Database = self.db;
        let base = db.table(select.table);
        self.stats.record_rows_scanned(base.len());

        let mut rows: Vec<Row<'_>> = match &select.join {
            Some(join) => join_rows(base, db.table(join.table), join),
            None => base.iter().map(Row::single).collect(),
        };
        rows.retain(|row| matcher.matches(row));

        if let Some(order) = &select.order_by {
            rows.sort_by(|a, b| {
                let cmp = compare_values(a.field(&order.field), b.field(&order.field));
                if order.ascending { cmp } else { cmp.reverse() }
            });
        }

        if let Some(limit) = select.limit {
            rows.truncate(limit);
        }

        let out: Vec<Record> = rows
            .iter()
            .map(|row| row.project(&select.projection))
            .collect();
        self.stats.returned_count += out.len();
        Ok(out)
    }
}

/// Pairs each base record with the first joined record whose key matches.
/// Base records without a match, or with a null key, are dropped.
fn join_rows<'r>(base: &'r [Record], joined: &'r [Record], join: &JoinPlan) -> Vec<Row<'r>> {
    base.iter()
        .filter_map(|record| {
            let key = record.get(&join.base_key).filter(|k| !k.is_null())?;
            joined
                .iter()
                .find(|candidate| {
                    candidate
                        .get(&join.joined_key)
                        .is_some_and(|value| datums_equal(value, key))
                })
                .map(|matched| Row {
                    base: record,
                    joined: Some(matched),
                })
        })
        .collect()
}
