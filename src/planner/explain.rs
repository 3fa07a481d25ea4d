use crate::planner::{
    Clause, FieldRef, Plan, PlanNode, Predicate, ProjectItem, SelectPlan, Side, Slot,
};
use std::fmt;

/// Represents a complete explanation of a query plan
#[derive(Debug)]
pub struct PlanExplanation {
    pub nodes: Vec<ExplanationNode>,
    pub param_count: usize,
}

/// Represents a single node in the plan explanation
#[derive(Debug)]
pub struct ExplanationNode {
    pub operation: String,
    pub properties: Vec<(String, String)>,
    pub depth: usize,
}

impl PlanExplanation {
    pub fn new(plan: &Plan) -> Self {
        let mut nodes = Vec::new();
        explain_node(&plan.node, &mut nodes);

        Self {
            nodes,
            param_count: plan.param_count,
        }
    }
}

impl fmt::Display for PlanExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query Plan:")?;
        writeln!(f, "Parameters: {}", self.param_count)?;
        writeln!(f, "{}", "-".repeat(80))?;

        for node in &self.nodes {
            let indent = "  ".repeat(node.depth);
            writeln!(f, "{indent}{}", node.operation)?;

            for (key, value) in &node.properties {
                writeln!(f, "{indent}  {key}: {value}")?;
            }
        }

        Ok(())
    }
}

fn push(nodes: &mut Vec<ExplanationNode>, operation: &str, properties: Vec<(&str, String)>) {
    let depth = nodes.len();
    nodes.push(ExplanationNode {
        operation: operation.to_string(),
        properties: properties
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        depth,
    });
}

fn explain_node(node: &PlanNode, nodes: &mut Vec<ExplanationNode>) {
    match node {
        PlanNode::Insert { table, fields } => push(
            nodes,
            "Insert",
            vec![
                ("table", table.to_string()),
                (
                    "fields",
                    fields
                        .iter()
                        .map(|(name, slot)| format!("{name} <- {}", describe_slot(slot)))
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
            ],
        ),
        PlanNode::Update {
            table,
            assignments,
            predicate,
        } => {
            push(
                nodes,
                "Update",
                vec![(
                    "set",
                    assignments
                        .iter()
                        .map(|(name, slot)| format!("{name} <- {}", describe_slot(slot)))
                        .collect::<Vec<_>>()
                        .join(", "),
                )],
            );
            push_filter(nodes, predicate);
            push(nodes, "TableScan", vec![("table", table.to_string())]);
        }
        PlanNode::Delete { table, predicate } => {
            push(nodes, "Delete", Vec::new());
            push_filter(nodes, predicate);
            push(nodes, "TableScan", vec![("table", table.to_string())]);
        }
        PlanNode::Select(select) => explain_select(select, nodes),
        PlanNode::Unrecognized { reason } => {
            push(nodes, "NoOp", vec![("reason", reason.clone())]);
        }
    }
}

fn explain_select(select: &SelectPlan, nodes: &mut Vec<ExplanationNode>) {
    push(
        nodes,
        "Project",
        vec![(
            "columns",
            select
                .projection
                .iter()
                .map(|item| match item {
                    ProjectItem::Everything => "*".to_string(),
                    ProjectItem::AllOf(side) => format!("{}.*", describe_side(*side)),
                    ProjectItem::Field(field) => describe_field(field),
                })
                .collect::<Vec<_>>()
                .join(", "),
        )],
    );
    if let Some(limit) = select.limit {
        push(nodes, "Limit", vec![("count", limit.to_string())]);
    }
    if let Some(order) = &select.order_by {
        push(
            nodes,
            "Sort",
            vec![
                ("field", describe_field(&order.field)),
                (
                    "direction",
                    if order.ascending { "ASC" } else { "DESC" }.to_string(),
                ),
            ],
        );
    }
    push_filter(nodes, &select.predicate);
    if let Some(join) = &select.join {
        push(
            nodes,
            "Join",
            vec![
                ("table", join.table.to_string()),
                (
                    "on",
                    format!("base.{} = joined.{}", join.base_key, join.joined_key),
                ),
            ],
        );
    }
    push(nodes, "TableScan", vec![("table", select.table.to_string())]);
}

fn push_filter(nodes: &mut Vec<ExplanationNode>, predicate: &Predicate) {
    match predicate {
        Predicate::Always => {}
        Predicate::Conjunction(clauses) => push(
            nodes,
            "Filter",
            vec![(
                "predicate",
                clauses
                    .iter()
                    .map(describe_clause)
                    .collect::<Vec<_>>()
                    .join(" AND "),
            )],
        ),
        Predicate::Unsupported(clause) => {
            push(nodes, "Filter", vec![("unsupported", clause.clone())]);
        }
    }
}

fn describe_clause(clause: &Clause) -> String {
    match clause {
        Clause::Equals { field, value } => {
            format!("{} = {}", describe_field(field), describe_slot(value))
        }
        Clause::CompareNow { field, op } => format!("{} {} now", describe_field(field), op.as_str()),
    }
}

fn describe_slot(slot: &Slot) -> String {
    match slot {
        Slot::Param(i) => format!("${}", i + 1),
        Slot::Literal(d) => d.to_string(),
        Slot::Now => "now".to_string(),
    }
}

const fn describe_side(side: Side) -> &'static str {
    match side {
        Side::Base => "base",
        Side::Joined => "joined",
    }
}

fn describe_field(field: &FieldRef) -> String {
    format!("{}.{}", describe_side(field.side), field.name)
}
