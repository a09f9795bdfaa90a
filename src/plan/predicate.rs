//! Table bitsets and conjunctive predicate decomposition.
//!
//! A predicate arriving at a join is decomposed on `AND` into a
//! [`PredicateVec`] of binary clauses. Each clause keeps the table bitsets
//! of its left and right expressions, which is all the join-order planner
//! needs: an equality clause whose sides land on opposite halves of a
//! partition makes that partition hash-joinable.

use crate::catalog::OutputSchema;
use crate::exec::batch::Field;
use crate::exec::expr::{Expr, OpType};

// ------------------------------------------------------------------------------------------------
// TableBitset
// ------------------------------------------------------------------------------------------------

/// Bitmask over base tables (bit `i` = table id `i`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableBitset(pub u64);

impl TableBitset {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn single(table_id: usize) -> Self {
        Self(1u64 << table_id)
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every table in `self` is also in `other`.
    pub fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

// ------------------------------------------------------------------------------------------------
// PredicateElement
// ------------------------------------------------------------------------------------------------

/// One binary condition plus the table bitsets of each side.
#[derive(Debug, Clone)]
pub struct PredicateElement {
    /// The clause; always a binary comparison after decomposition.
    pub expr: Expr,
    /// Tables referenced by the left operand.
    pub left: TableBitset,
    /// Tables referenced by the right operand.
    pub right: TableBitset,
}

impl PredicateElement {
    /// Whether the clause's operator is equality.
    pub fn is_eq(&self) -> bool {
        matches!(&self.expr, Expr::Binary { op: OpType::Eq, .. })
    }

    /// Whether `v` contains every table of the left operand.
    pub fn check_left(&self, v: TableBitset) -> bool {
        self.left.is_subset_of(v)
    }

    /// Whether `v` contains every table of the right operand.
    pub fn check_right(&self, v: TableBitset) -> bool {
        self.right.is_subset_of(v)
    }

    /// Left operand of the clause.
    pub fn lhs(&self) -> &Expr {
        match &self.expr {
            Expr::Binary { lhs, .. } => lhs,
            other => other,
        }
    }

    /// Right operand of the clause.
    pub fn rhs(&self) -> &Expr {
        match &self.expr {
            Expr::Binary { rhs, .. } => rhs,
            other => other,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PredicateVec
// ------------------------------------------------------------------------------------------------

/// An ordered set of clauses whose conjunction equals the original
/// predicate.
#[derive(Debug, Clone, Default)]
pub struct PredicateVec {
    elements: Vec<PredicateElement>,
}

impl PredicateVec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decomposes `expr` on `AND`. Binary comparison atoms become
    /// elements directly; any other atom `e` (an `OR`, a bare column, an
    /// arithmetic expression) is wrapped as `e ≠ 0` with an empty
    /// right-side bitset.
    pub fn create(expr: &Expr) -> Self {
        let mut vec = Self::new();
        split_and(expr, &mut vec.elements);
        vec
    }

    /// Reassembles the conjunction; `None` when there are no clauses.
    pub fn gen_expr(&self) -> Option<Expr> {
        let mut iter = self.elements.iter();
        let first = iter.next()?.expr.clone();
        Some(iter.fold(first, |acc, e| {
            Expr::binary(OpType::And, acc, e.expr.clone())
        }))
    }

    pub fn elements(&self) -> &[PredicateElement] {
        &self.elements
    }

    pub fn push(&mut self, element: PredicateElement) {
        self.elements.push(element);
    }

    /// Appends all clauses of `other`.
    pub fn append(&mut self, other: PredicateVec) {
        self.elements.extend(other.elements);
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Rewrites every clause through a projection: each column reference
    /// resolved by `schema` is substituted with the projection expression
    /// at the same position, and both side bitsets are recomputed.
    ///
    /// Used when a predicate is pushed through a node that replaces its
    /// input columns with computed expressions.
    pub fn apply_exprs(&mut self, input_exprs: &[Expr], schema: &OutputSchema) {
        for element in &mut self.elements {
            element.expr = substitute(&element.expr, input_exprs, schema);
            match &element.expr {
                Expr::Binary { lhs, rhs, .. } => {
                    element.left = lhs.tables();
                    element.right = rhs.tables();
                }
                other => {
                    element.left = other.tables();
                    element.right = TableBitset::empty();
                }
            }
        }
    }
}

fn substitute(expr: &Expr, input_exprs: &[Expr], schema: &OutputSchema) -> Expr {
    match expr {
        Expr::Column {
            table_id, column, ..
        } => match schema.position(*table_id, *column) {
            Some(pos) if pos < input_exprs.len() => input_exprs[pos].clone(),
            _ => expr.clone(),
        },
        Expr::Literal(_) => expr.clone(),
        Expr::Binary { op, lhs, rhs } => Expr::binary(
            *op,
            substitute(lhs, input_exprs, schema),
            substitute(rhs, input_exprs, schema),
        ),
    }
}

fn split_and(expr: &Expr, out: &mut Vec<PredicateElement>) {
    match expr {
        Expr::Binary {
            op: OpType::And,
            lhs,
            rhs,
        } => {
            split_and(lhs, out);
            split_and(rhs, out);
        }
        Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
            out.push(PredicateElement {
                left: lhs.tables(),
                right: rhs.tables(),
                expr: expr.clone(),
            });
        }
        other => {
            let wrapped = Expr::binary(
                OpType::Neq,
                other.clone(),
                Expr::literal(Field::Int(0)),
            );
            out.push(PredicateElement {
                left: other.tables(),
                right: TableBitset::empty(),
                expr: wrapped,
            });
        }
    }
}
