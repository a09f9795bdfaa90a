//! Plan trees, the rewrite driver, and rule-based conversions.
//!
//! A plan is a pure tree of [`PlanNode`]s: nodes own their children, and
//! rewrites construct new trees from clones rather than editing shared
//! structure. Node behavior is a tagged [`PlanOp`] variant dispatched
//! with `match` — there is no inheritance hierarchy to mirror.

pub mod optimizer;
pub mod predicate;

#[cfg(test)]
mod tests;

use crate::catalog::OutputSchema;
use crate::exec::batch::Field;
use crate::exec::expr::Expr;
use crate::storage::RangeBound;

use predicate::{PredicateVec, TableBitset};

// ------------------------------------------------------------------------------------------------
// Plan nodes
// ------------------------------------------------------------------------------------------------

/// Operator variant of a plan node.
#[derive(Debug, Clone)]
pub enum PlanOp {
    /// Full-table scan.
    SeqScan { table: String, table_id: usize },
    /// Bounded scan over the primary key.
    RangeScan {
        table: String,
        table_id: usize,
        lo: RangeBound,
        hi: RangeBound,
    },
    /// Expression projection.
    Project { exprs: Vec<Expr> },
    /// Row filter; the predicate lives on the node.
    Filter,
    /// Grouped aggregation. Carried in plan trees; executed outside the
    /// vectorized core.
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<Expr>,
    },
    /// Nested-loop join.
    Join,
    /// Hash join with per-side bucket-key expressions.
    HashJoin {
        left_hash: Vec<Expr>,
        right_hash: Vec<Expr>,
    },
    /// Row insertion; the child produces the rows.
    Insert { table: String },
    /// Row deletion; the child produces the doomed rows.
    Delete { table: String },
    /// Row update; the child produces the rows, `sets` the replacements.
    Update {
        table: String,
        sets: Vec<(usize, Expr)>,
    },
    /// Literal row values.
    Print { rows: Vec<Vec<Field>> },
    /// Optional wrapper applying predicate transfer before execution.
    PredicateTransfer,
}

/// One node of a plan tree.
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub op: PlanOp,
    pub child: Option<Box<PlanNode>>,
    pub child2: Option<Box<PlanNode>>,
    pub output_schema: OutputSchema,
    pub table_bitset: TableBitset,
    pub predicate: PredicateVec,
    /// Estimated cost filled in by the planner; 0 when not costed.
    pub cost: f64,
}

impl PlanNode {
    fn leaf(op: PlanOp, output_schema: OutputSchema, table_bitset: TableBitset) -> Self {
        Self {
            op,
            child: None,
            child2: None,
            output_schema,
            table_bitset,
            predicate: PredicateVec::new(),
            cost: 0.0,
        }
    }

    /// Sequential scan over a base table.
    pub fn seq_scan(table: impl Into<String>, table_id: usize, schema: OutputSchema) -> Self {
        Self::leaf(
            PlanOp::SeqScan {
                table: table.into(),
                table_id,
            },
            schema,
            TableBitset::single(table_id),
        )
    }

    /// Range scan over a base table's primary key.
    pub fn range_scan(
        table: impl Into<String>,
        table_id: usize,
        schema: OutputSchema,
        lo: RangeBound,
        hi: RangeBound,
    ) -> Self {
        Self::leaf(
            PlanOp::RangeScan {
                table: table.into(),
                table_id,
                lo,
                hi,
            },
            schema,
            TableBitset::single(table_id),
        )
    }

    /// Literal values node.
    pub fn values(rows: Vec<Vec<Field>>, schema: OutputSchema) -> Self {
        Self::leaf(PlanOp::Print { rows }, schema, TableBitset::empty())
    }

    /// Nested-loop join of two subtrees.
    pub fn join(left: PlanNode, right: PlanNode, predicate: PredicateVec) -> Self {
        let output_schema = OutputSchema::concat(&left.output_schema, &right.output_schema);
        let table_bitset = left.table_bitset.union(right.table_bitset);
        Self {
            op: PlanOp::Join,
            child: Some(Box::new(left)),
            child2: Some(Box::new(right)),
            output_schema,
            table_bitset,
            predicate,
            cost: 0.0,
        }
    }

    /// Filter over a subtree.
    pub fn filter(child: PlanNode, predicate: PredicateVec) -> Self {
        let output_schema = child.output_schema.clone();
        let table_bitset = child.table_bitset;
        Self {
            op: PlanOp::Filter,
            child: Some(Box::new(child)),
            child2: None,
            output_schema,
            table_bitset,
            predicate,
            cost: 0.0,
        }
    }

    /// Projection over a subtree.
    pub fn project(child: PlanNode, exprs: Vec<Expr>, output_schema: OutputSchema) -> Self {
        let table_bitset = child.table_bitset;
        Self {
            op: PlanOp::Project { exprs },
            child: Some(Box::new(child)),
            child2: None,
            output_schema,
            table_bitset,
            predicate: PredicateVec::new(),
            cost: 0.0,
        }
    }

    /// Insert into `table`, rows produced by `child`.
    pub fn insert(table: impl Into<String>, child: PlanNode) -> Self {
        let table_bitset = child.table_bitset;
        Self {
            op: PlanOp::Insert {
                table: table.into(),
            },
            child: Some(Box::new(child)),
            child2: None,
            output_schema: OutputSchema::default(),
            table_bitset,
            predicate: PredicateVec::new(),
            cost: 0.0,
        }
    }

    /// Delete from `table`, doomed rows produced by `child`.
    pub fn delete(table: impl Into<String>, child: PlanNode) -> Self {
        let table_bitset = child.table_bitset;
        Self {
            op: PlanOp::Delete {
                table: table.into(),
            },
            child: Some(Box::new(child)),
            child2: None,
            output_schema: OutputSchema::default(),
            table_bitset,
            predicate: PredicateVec::new(),
            cost: 0.0,
        }
    }

    /// Whether this node is a DML statement.
    pub fn is_dml(&self) -> bool {
        matches!(
            self.op,
            PlanOp::Insert { .. } | PlanOp::Delete { .. } | PlanOp::Update { .. }
        )
    }
}

// ------------------------------------------------------------------------------------------------
// Rewrite driver
// ------------------------------------------------------------------------------------------------

/// A plan rewrite rule.
pub trait OptRule {
    /// Whether the rule applies at this node.
    fn matches(&self, plan: &PlanNode) -> bool;

    /// Transforms the node. Only called when [`matches`](Self::matches)
    /// returned true.
    fn transform(&self, plan: PlanNode) -> PlanNode;
}

/// Applies `rules` top-down: at each node the first matching rule
/// transforms it and no further rule is tried there in this pass; the
/// driver then recurses into the (possibly new) children.
pub fn apply_rules(mut plan: PlanNode, rules: &[Box<dyn OptRule>]) -> PlanNode {
    for rule in rules {
        if rule.matches(&plan) {
            plan = rule.transform(plan);
            break;
        }
    }
    if let Some(child) = plan.child.take() {
        plan.child = Some(Box::new(apply_rules(*child, rules)));
    }
    if let Some(child2) = plan.child2.take() {
        plan.child2 = Some(Box::new(apply_rules(*child2, rules)));
    }
    plan
}

// ------------------------------------------------------------------------------------------------
// ConvertToHashJoinRule
// ------------------------------------------------------------------------------------------------

/// Converts a nested-loop join into a hash join when its predicate holds
/// an equality clause straddling the two children. The full predicate is
/// kept as the residual: the hash is advisory, the join condition remains
/// authoritative.
pub struct ConvertToHashJoinRule;

impl ConvertToHashJoinRule {
    fn straddling(
        plan: &PlanNode,
    ) -> Option<(Vec<Expr>, Vec<Expr>)> {
        let left_bits = plan.child.as_ref()?.table_bitset;
        let right_bits = plan.child2.as_ref()?.table_bitset;

        let mut left_hash = Vec::new();
        let mut right_hash = Vec::new();
        for element in plan.predicate.elements() {
            if !element.is_eq() || element.left.is_empty() || element.right.is_empty() {
                continue;
            }
            if element.check_left(left_bits) && element.check_right(right_bits) {
                left_hash.push(element.lhs().clone());
                right_hash.push(element.rhs().clone());
            } else if element.check_left(right_bits) && element.check_right(left_bits) {
                left_hash.push(element.rhs().clone());
                right_hash.push(element.lhs().clone());
            }
        }
        (!left_hash.is_empty()).then_some((left_hash, right_hash))
    }
}

impl OptRule for ConvertToHashJoinRule {
    fn matches(&self, plan: &PlanNode) -> bool {
        matches!(plan.op, PlanOp::Join) && Self::straddling(plan).is_some()
    }

    fn transform(&self, mut plan: PlanNode) -> PlanNode {
        if let Some((left_hash, right_hash)) = Self::straddling(&plan) {
            plan.op = PlanOp::HashJoin {
                left_hash,
                right_hash,
            };
        }
        plan
    }
}
