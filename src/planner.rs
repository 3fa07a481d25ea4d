mod error;
pub mod explain;

pub use error::{PlanError, PlanResult};
pub use explain::PlanExplanation;

use crate::ast::{
    ColumnRef, CompareOp, Comparison, Condition, Datum, Operand, SelectItem, Statement, Table,
    TableRef,
};

/// Which record of a row a field reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Base,
    Joined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub side: Side,
    pub name: String,
}

/// Where a value comes from when a plan is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Positional parameter, zero-based.
    Param(usize),
    Literal(Datum),
    /// Current time as an ISO-8601 string.
    Now,
}

impl From<&Operand> for Slot {
    fn from(operand: &Operand) -> Self {
        match operand {
            Operand::Placeholder(i) => Self::Param(*i),
            Operand::Literal(d) => Self::Literal(d.clone()),
            Operand::Now => Self::Now,
        }
    }
}

/// Timestamp comparison of a field against the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOp {
    Before,
    AtOrBefore,
    After,
    AtOrAfter,
}

impl TimeOp {
    const fn from_compare(op: CompareOp) -> Option<Self> {
        match op {
            CompareOp::Lt => Some(Self::Before),
            CompareOp::Le => Some(Self::AtOrBefore),
            CompareOp::Gt => Some(Self::After),
            CompareOp::Ge => Some(Self::AtOrAfter),
            CompareOp::Eq | CompareOp::Ne => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "<",
            Self::AtOrBefore => "<=",
            Self::After => ">",
            Self::AtOrAfter => ">=",
        }
    }
}

/// One executable WHERE clause term.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `field = ?` or `field = <literal>`
    Equals { field: FieldRef, value: Slot },
    /// `field > datetime('now')` and friends; consumes no parameter.
    CompareNow { field: FieldRef, op: TimeOp },
}

/// The closed set of WHERE shapes the evaluator understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// No WHERE clause.
    Always,
    /// Every clause must hold.
    Conjunction(Vec<Clause>),
    /// Only produced by a lenient planner: matches nothing for mutations and
    /// everything for queries.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectItem {
    /// `*`
    Everything,
    /// `alias.*`
    AllOf(Side),
    Field(FieldRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: FieldRef,
    pub ascending: bool,
}

/// Inner join on `base.base_key = joined.joined_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    pub table: Table,
    pub base_key: String,
    pub joined_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub table: Table,
    pub join: Option<JoinPlan>,
    pub predicate: Predicate,
    pub projection: Vec<ProjectItem>,
    pub order_by: Option<SortKey>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Insert {
        table: Table,
        fields: Vec<(String, Slot)>,
    },
    Update {
        table: Table,
        assignments: Vec<(String, Slot)>,
        predicate: Predicate,
    },
    Delete {
        table: Table,
        predicate: Predicate,
    },
    Select(SelectPlan),
    /// A statement a lenient planner could not parse. Executes as a no-op.
    Unrecognized { reason: String },
}

/// A compiled statement, reusable across parameter sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub node: PlanNode,
    pub param_count: usize,
}

impl Plan {
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        Self {
            node: PlanNode::Unrecognized {
                reason: reason.into(),
            },
            param_count: 0,
        }
    }

    pub const fn is_query(&self) -> bool {
        matches!(self.node, PlanNode::Select(_))
    }

    pub const fn is_mutation(&self) -> bool {
        matches!(
            self.node,
            PlanNode::Insert { .. } | PlanNode::Update { .. } | PlanNode::Delete { .. }
        )
    }

    pub fn explain(&self) -> PlanExplanation {
        PlanExplanation::new(self)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner {
    lenient: bool,
}

impl Planner {
    pub const fn new() -> Self {
        Self { lenient: false }
    }

    /// A planner that degrades unsupported WHERE clauses instead of rejecting them.
    pub const fn lenient() -> Self {
        Self { lenient: true }
    }

    pub const fn is_lenient(&self) -> bool {
        self.lenient
    }

    pub fn plan(&self, statement: &Statement) -> PlanResult<Plan> {
        let node = match statement {
            Statement::Insert {
                table,
                columns,
                values,
            } => PlanNode::Insert {
                table: *table,
                fields: columns
                    .iter()
                    .cloned()
                    .zip(values.iter().map(Slot::from))
                    .collect(),
            },

            Statement::Update {
                table,
                assignments,
                condition,
            } => {
                let scope = Scope::single(*table);
                PlanNode::Update {
                    table: *table,
                    assignments: assignments
                        .iter()
                        .map(|a| (a.column.clone(), Slot::from(&a.value)))
                        .collect(),
                    predicate: self.compile_predicate(condition.as_ref(), &scope)?,
                }
            }

            Statement::Delete { table, condition } => {
                let scope = Scope::single(*table);
                PlanNode::Delete {
                    table: *table,
                    predicate: self.compile_predicate(condition.as_ref(), &scope)?,
                }
            }

            Statement::Select {
                projection,
                from,
                join,
                condition,
                order_by,
                limit,
            } => {
                let scope = Scope {
                    base: Binding::from(from),
                    joined: join.as_ref().map(|j| Binding::from(&j.table)),
                };

                let join = join
                    .as_ref()
                    .map(|j| compile_join(&scope, &j.left, &j.right, j.table.table))
                    .transpose()?;

                let projection = projection
                    .iter()
                    .map(|item| match item {
                        SelectItem::Wildcard(None) => Ok(ProjectItem::Everything),
                        SelectItem::Wildcard(Some(q)) => Ok(ProjectItem::AllOf(scope.side(q)?)),
                        SelectItem::Column(c) => Ok(ProjectItem::Field(scope.resolve(c)?)),
                    })
                    .collect::<PlanResult<Vec<_>>>()?;

                let order_by = order_by
                    .as_ref()
                    .map(|o| {
                        Ok::<_, PlanError>(SortKey {
                            field: scope.resolve(&o.column)?,
                            ascending: o.ascending,
                        })
                    })
                    .transpose()?;

                PlanNode::Select(SelectPlan {
                    table: from.table,
                    join,
                    predicate: self.compile_predicate(condition.as_ref(), &scope)?,
                    projection,
                    order_by,
                    limit: *limit,
                })
            }
        };

        Ok(Plan {
            node,
            param_count: statement.placeholder_count(),
        })
    }

    fn compile_predicate(
        &self,
        condition: Option<&Condition>,
        scope: &Scope<'_>,
    ) -> PlanResult<Predicate> {
        let Some(condition) = condition else {
            return Ok(Predicate::Always);
        };

        let mut clauses = Vec::new();
        match collect_clauses(condition, scope, &mut clauses) {
            Ok(()) => Ok(Predicate::Conjunction(clauses)),
            Err(PlanError::UnsupportedPredicate(reason)) if self.lenient => {
                log::warn!("Unsupported WHERE clause degraded in lenient mode: {reason}");
                Ok(Predicate::Unsupported(reason))
            }
            Err(e) => Err(e),
        }
    }
}

/// Tables visible to column references of one statement.
struct Scope<'a> {
    base: Binding<'a>,
    joined: Option<Binding<'a>>,
}

#[derive(Clone, Copy)]
struct Binding<'a> {
    table: Table,
    alias: Option<&'a str>,
}

impl<'a> From<&'a TableRef> for Binding<'a> {
    fn from(table_ref: &'a TableRef) -> Self {
        Self {
            table: table_ref.table,
            alias: table_ref.alias.as_deref(),
        }
    }
}

impl Binding<'_> {
    fn is_named(&self, qualifier: &str) -> bool {
        self.alias
            .is_some_and(|alias| alias.eq_ignore_ascii_case(qualifier))
            || self.table.as_str().eq_ignore_ascii_case(qualifier)
    }
}

impl Scope<'_> {
    const fn single(table: Table) -> Scope<'static> {
        Scope {
            base: Binding { table, alias: None },
            joined: None,
        }
    }

    fn side(&self, qualifier: &str) -> PlanResult<Side> {
        if self.base.is_named(qualifier) {
            return Ok(Side::Base);
        }
        match self.joined {
            Some(joined) if joined.is_named(qualifier) => Ok(Side::Joined),
            _ => Err(PlanError::UnknownQualifier(qualifier.to_string())),
        }
    }

    fn resolve(&self, column: &ColumnRef) -> PlanResult<FieldRef> {
        let side = match &column.qualifier {
            Some(q) => self.side(q)?,
            None => Side::Base,
        };
        Ok(FieldRef {
            side,
            name: column.name.clone(),
        })
    }
}

fn compile_join(
    scope: &Scope<'_>,
    left: &ColumnRef,
    right: &ColumnRef,
    table: Table,
) -> PlanResult<JoinPlan> {
    let left = scope.resolve(left)?;
    let right = scope.resolve(right)?;

    let (base_key, joined_key) = match (left.side, right.side) {
        (Side::Base, Side::Joined) => (left.name, right.name),
        (Side::Joined, Side::Base) => (right.name, left.name),
        _ => {
            return Err(PlanError::UnsupportedJoin(
                "join condition must compare one column from each table".to_string(),
            ));
        }
    };

    if base_key != "id" && joined_key != "id" {
        return Err(PlanError::UnsupportedJoin(format!(
            "join keys {base_key} and {joined_key} do not involve an id column"
        )));
    }

    Ok(JoinPlan {
        table,
        base_key,
        joined_key,
    })
}

fn collect_clauses(
    condition: &Condition,
    scope: &Scope<'_>,
    out: &mut Vec<Clause>,
) -> PlanResult<()> {
    match condition {
        Condition::And(left, right) => {
            collect_clauses(left, scope, out)?;
            collect_clauses(right, scope, out)
        }
        Condition::Compare(comparison) => {
            out.push(compile_comparison(comparison, scope)?);
            Ok(())
        }
        Condition::Or(..) | Condition::Not(..) => {
            Err(PlanError::UnsupportedPredicate(condition.to_string()))
        }
    }
}

fn compile_comparison(comparison: &Comparison, scope: &Scope<'_>) -> PlanResult<Clause> {
    let field = scope.resolve(&comparison.column)?;

    match (&comparison.op, &comparison.operand) {
        (CompareOp::Eq, Operand::Placeholder(i)) => Ok(Clause::Equals {
            field,
            value: Slot::Param(*i),
        }),
        (CompareOp::Eq, Operand::Literal(d)) => Ok(Clause::Equals {
            field,
            value: Slot::Literal(d.clone()),
        }),
        (op, Operand::Now) => match TimeOp::from_compare(*op) {
            Some(op) => Ok(Clause::CompareNow { field, op }),
            None => Err(unsupported(comparison)),
        },
        _ => Err(unsupported(comparison)),
    }
}

fn unsupported(comparison: &Comparison) -> PlanError {
    PlanError::UnsupportedPredicate(Condition::Compare(comparison.clone()).to_string())
}
