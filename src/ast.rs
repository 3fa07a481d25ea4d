use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A record is a flat, schema-less map of field names to datum values.
pub type Record = BTreeMap<String, Datum>;

/// A loosely-typed scalar stored in a record field or bound as a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
}

impl Datum {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view of a number; decimals only qualify when they have no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Datum {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Decimal> for Datum {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<f64> for Datum {
    fn from(f: f64) -> Self {
        Decimal::from_f64(f).map_or(Self::Null, Self::Decimal)
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Decimal(d) => match d.to_f64() {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.serialize_str(&d.to_string()),
            },
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

struct DatumVisitor;

impl<'de> Visitor<'de> for DatumVisitor {
    type Value = Datum;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a scalar value (null, boolean, number or string)")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Datum, E> {
        Ok(Datum::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Datum, E> {
        Ok(Datum::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Datum, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Datum, E> {
        Ok(Datum::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Datum, E> {
        Ok(Datum::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Datum, E> {
        Ok(i64::try_from(v).map_or_else(|_| Datum::Decimal(Decimal::from(v)), Datum::Integer))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Datum, E> {
        // Beyond Decimal's range the value is kept as its textual form.
        Ok(Decimal::from_f64(v).map_or_else(|| Datum::String(v.to_string()), Datum::Decimal))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Datum, E> {
        Ok(Datum::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Datum, E> {
        Ok(Datum::String(v))
    }
}

impl<'de> Deserialize<'de> for Datum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DatumVisitor)
    }
}

/// The closed set of tables a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Users,
    Communities,
    CommunityMembers,
    Proposals,
    ProposalVotes,
    Posts,
    Pledges,
    Comments,
    Sessions,
}

impl Table {
    /// Every table, in persisted order.
    pub const ALL: [Self; 9] = [
        Self::Users,
        Self::Communities,
        Self::CommunityMembers,
        Self::Proposals,
        Self::ProposalVotes,
        Self::Posts,
        Self::Pledges,
        Self::Comments,
        Self::Sessions,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Communities => "communities",
            Self::CommunityMembers => "community_members",
            Self::Proposals => "proposals",
            Self::ProposalVotes => "proposal_votes",
            Self::Posts => "posts",
            Self::Pledges => "pledges",
            Self::Comments => "comments",
            Self::Sessions => "sessions",
        }
    }

    /// Looks a table up by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A column reference, optionally qualified by a table name or alias (`s.user_id`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: &str) -> Self {
        Self {
            qualifier: None,
            name: name.to_string(),
        }
    }

    pub fn qualified(qualifier: &str, name: &str) -> Self {
        Self {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The right-hand side of a comparison, assignment or inserted value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A `?` placeholder with its position among all placeholders of the statement.
    Placeholder(usize),
    Literal(Datum),
    /// `datetime('now')` or `CURRENT_TIMESTAMP`.
    Now,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder(i) => write!(f, "?{}", i + 1),
            Self::Literal(d) => write!(f, "{d}"),
            Self::Now => write!(f, "datetime('now')"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub column: ColumnRef,
    pub op: CompareOp,
    pub operand: Operand,
}

/// A WHERE clause as written. The planner decides which shapes are executable.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Comparison),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare(c) => write!(f, "{} {} {}", c.column, c.op.as_str(), c.operand),
            Self::And(l, r) => write!(f, "{l} AND {r}"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(c) => write!(f, "NOT ({c})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: Table,
    pub alias: Option<String>,
}

/// `JOIN <table> ON <left> = <right>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: TableRef,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectItem {
    /// `*` or `alias.*`
    Wildcard(Option<String>),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: Operand,
}

/// A parsed statement, independent of any parameter values.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert {
        table: Table,
        columns: Vec<String>,
        values: Vec<Operand>,
    },
    Update {
        table: Table,
        assignments: Vec<Assignment>,
        condition: Option<Condition>,
    },
    Delete {
        table: Table,
        condition: Option<Condition>,
    },
    Select {
        projection: Vec<SelectItem>,
        from: TableRef,
        join: Option<Join>,
        condition: Option<Condition>,
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    },
}

impl Statement {
    pub const fn table(&self) -> Table {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                *table
            }
            Self::Select { from, .. } => from.table,
        }
    }

    pub const fn is_query(&self) -> bool {
        matches!(self, Self::Select { .. })
    }

    /// Number of `?` placeholders the statement binds.
    pub fn placeholder_count(&self) -> usize {
        let mut operands: Vec<&Operand> = Vec::new();
        let condition = match self {
            Self::Insert { values, .. } => {
                operands.extend(values);
                None
            }
            Self::Update {
                assignments,
                condition,
                ..
            } => {
                operands.extend(assignments.iter().map(|a| &a.value));
                condition.as_ref()
            }
            Self::Delete { condition, .. } | Self::Select { condition, .. } => condition.as_ref(),
        };

        if let Some(condition) = condition {
            collect_operands(condition, &mut operands);
        }

        operands
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Placeholder(i) => Some(i + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

fn collect_operands<'a>(condition: &'a Condition, out: &mut Vec<&'a Operand>) {
    match condition {
        Condition::Compare(c) => out.push(&c.operand),
        Condition::And(l, r) | Condition::Or(l, r) => {
            collect_operands(l, out);
            collect_operands(r, out);
        }
        Condition::Not(c) => collect_operands(c, out),
    }
}
