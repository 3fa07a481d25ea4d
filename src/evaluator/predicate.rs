use crate::ast::Datum;
use crate::evaluator::Row;
use crate::evaluator::error::EvalError;
use crate::evaluator::utils::{datums_equal, format_timestamp, parse_timestamp};
use crate::planner::{Clause, FieldRef, Predicate, Slot, TimeOp};
use time::OffsetDateTime;

/// What an unsupported (lenient) predicate evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    MatchNothing,
    MatchEverything,
}

enum BoundClause<'p> {
    Equals { field: &'p FieldRef, value: Datum },
    CompareNow { field: &'p FieldRef, op: TimeOp },
}

/// A predicate with its parameter slots filled in, ready to test rows.
pub struct BoundPredicate<'p> {
    clauses: Vec<BoundClause<'p>>,
    constant: Option<bool>,
    now: OffsetDateTime,
}

impl<'p> BoundPredicate<'p> {
    pub fn bind(
        predicate: &'p Predicate,
        params: &[Datum],
        now: OffsetDateTime,
        fallback: Fallback,
    ) -> Result<Self, EvalError> {
        let (clauses, constant) = match predicate {
            Predicate::Always => (Vec::new(), Some(true)),
            Predicate::Unsupported(_) => (Vec::new(), Some(fallback == Fallback::MatchEverything)),
            Predicate::Conjunction(clauses) => {
                let bound = clauses
                    .iter()
                    .map(|clause| match clause {
                        Clause::Equals { field, value } => Ok(BoundClause::Equals {
                            field,
                            value: resolve_slot(value, params, now)?,
                        }),
                        Clause::CompareNow { field, op } => {
                            Ok(BoundClause::CompareNow { field, op: *op })
                        }
                    })
                    .collect::<Result<Vec<_>, EvalError>>()?;
                (bound, None)
            }
        };

        Ok(Self {
            clauses,
            constant,
            now,
        })
    }

    pub fn matches(&self, row: &Row<'_>) -> bool {
        if let Some(constant) = self.constant {
            return constant;
        }

        self.clauses.iter().all(|clause| match clause {
            BoundClause::Equals { field, value } => {
                datums_equal(row.field(field).unwrap_or(&Datum::Null), value)
            }
            BoundClause::CompareNow { field, op } => {
                let Some(at) = row
                    .field(field)
                    .and_then(Datum::as_str)
                    .and_then(parse_timestamp)
                else {
                    return false;
                };
                match op {
                    TimeOp::Before => at < self.now,
                    TimeOp::AtOrBefore => at <= self.now,
                    TimeOp::After => at > self.now,
                    TimeOp::AtOrAfter => at >= self.now,
                }
            }
        })
    }
}

/// Resolves a slot against positional parameters.
pub fn resolve_slot(slot: &Slot, params: &[Datum], now: OffsetDateTime) -> Result<Datum, EvalError> {
    match slot {
        Slot::Param(i) => params.get(*i).cloned().ok_or(EvalError::ParameterCount {
            expected: i + 1,
            got: params.len(),
        }),
        Slot::Literal(d) => Ok(d.clone()),
        Slot::Now => Ok(Datum::String(format_timestamp(now))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Record;
    use crate::planner::Side;
    use time::Duration;

    fn field(name: &str) -> FieldRef {
        FieldRef {
            side: Side::Base,
            name: name.to_string(),
        }
    }

    fn record(pairs: &[(&str, Datum)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_equality_conjunction() {
        let predicate = Predicate::Conjunction(vec![
            Clause::Equals {
                field: field("proposal_id"),
                value: Slot::Param(0),
            },
            Clause::Equals {
                field: field("user_id"),
                value: Slot::Param(1),
            },
        ]);
        let params = [Datum::from("p1"), Datum::from("u1")];
        let bound =
            BoundPredicate::bind(&predicate, &params, OffsetDateTime::now_utc(), Fallback::MatchNothing)
                .unwrap();

        let hit = record(&[("proposal_id", "p1".into()), ("user_id", "u1".into())]);
        let miss = record(&[("proposal_id", "p1".into()), ("user_id", "u2".into())]);
        assert!(bound.matches(&Row::single(&hit)));
        assert!(!bound.matches(&Row::single(&miss)));
    }

    #[test]
    fn test_compare_now() {
        let now = OffsetDateTime::now_utc();
        let predicate = Predicate::Conjunction(vec![Clause::CompareNow {
            field: field("expires_at"),
            op: TimeOp::After,
        }]);
        let bound = BoundPredicate::bind(&predicate, &[], now, Fallback::MatchNothing).unwrap();

        let live = record(&[(
            "expires_at",
            Datum::String(format_timestamp(now + Duration::days(7))),
        )]);
        let expired = record(&[(
            "expires_at",
            Datum::String(format_timestamp(now - Duration::days(1))),
        )]);
        let garbage = record(&[("expires_at", "soon".into())]);

        assert!(bound.matches(&Row::single(&live)));
        assert!(!bound.matches(&Row::single(&expired)));
        assert!(!bound.matches(&Row::single(&garbage)));
        assert!(!bound.matches(&Row::single(&Record::new())));
    }

    #[test]
    fn test_unsupported_fallback() {
        let predicate = Predicate::Unsupported("a > ?".to_string());
        let row = Record::new();
        let now = OffsetDateTime::now_utc();

        let nothing = BoundPredicate::bind(&predicate, &[], now, Fallback::MatchNothing).unwrap();
        let everything =
            BoundPredicate::bind(&predicate, &[], now, Fallback::MatchEverything).unwrap();
        assert!(!nothing.matches(&Row::single(&row)));
        assert!(everything.matches(&Row::single(&row)));
    }

    #[test]
    fn test_missing_parameter() {
        let predicate = Predicate::Conjunction(vec![Clause::Equals {
            field: field("id"),
            value: Slot::Param(0),
        }]);
        let result =
            BoundPredicate::bind(&predicate, &[], OffsetDateTime::now_utc(), Fallback::MatchNothing);
        assert_eq!(
            result.err(),
            Some(EvalError::ParameterCount {
                expected: 1,
                got: 0
            })
        );
    }
}
