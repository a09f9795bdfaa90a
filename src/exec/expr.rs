//! Expression trees and vectorized evaluation.
//!
//! The crate is not a full expression compiler — the SQL front-end is an
//! external collaborator — but the operators and planner need a working
//! evaluator for column references, literals, and binary operations.
//! Column references carry their base-table identity `(table_id, column)`
//! and are resolved positionally against the evaluating operator's
//! [`OutputSchema`], so the same expression evaluates correctly inside
//! any concatenated schema.
//!
//! Comparison and logical operators yield integer vectors (`0` / `1`),
//! matching the convention that a predicate result of zero masks a row
//! out.

use crate::catalog::{LogicalType, OutputSchema};
use crate::exec::batch::{Field, Vector};
use crate::exec::ExecError;
use crate::plan::predicate::TableBitset;

/// Binary operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

impl OpType {
    /// Whether this operator is a comparison (yields 0/1).
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Neq | Self::Lt | Self::Gt | Self::Leq | Self::Geq
        )
    }

    /// Whether this operator is a logical connective.
    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// An expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Reference to a base-table column, resolved against the evaluating
    /// operator's output schema.
    Column {
        table_id: usize,
        column: usize,
        ty: LogicalType,
    },
    /// A literal value.
    Literal(Field),
    /// A binary operation.
    Binary {
        op: OpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn column(table_id: usize, column: usize, ty: LogicalType) -> Self {
        Self::Column {
            table_id,
            column,
            ty,
        }
    }

    pub fn literal(field: Field) -> Self {
        Self::Literal(field)
    }

    pub fn binary(op: OpType, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Result type of this expression.
    pub fn ty(&self) -> LogicalType {
        match self {
            Self::Column { ty, .. } => *ty,
            Self::Literal(field) => field.ty(),
            Self::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    LogicalType::Int
                } else if lhs.ty() == LogicalType::Float || rhs.ty() == LogicalType::Float {
                    LogicalType::Float
                } else {
                    lhs.ty()
                }
            }
        }
    }

    /// Bitset of base tables referenced anywhere in this expression.
    pub fn tables(&self) -> TableBitset {
        match self {
            Self::Column { table_id, .. } => TableBitset::single(*table_id),
            Self::Literal(_) => TableBitset::empty(),
            Self::Binary { lhs, rhs, .. } => lhs.tables().union(rhs.tables()),
        }
    }

    /// Evaluates over a batch's columns, producing one value per row in
    /// `0..count`. The selection bitmap is not consulted; masked rows
    /// produce values that are simply never read.
    pub fn eval(
        &self,
        schema: &OutputSchema,
        cols: &[Vector],
        count: usize,
    ) -> Result<Vector, ExecError> {
        match self {
            Self::Column {
                table_id, column, ..
            } => {
                let pos = schema.position(*table_id, *column).ok_or_else(|| {
                    ExecError::Expression(format!(
                        "column ({table_id}, {column}) not present in input schema"
                    ))
                })?;
                Ok(cols[pos].clone())
            }
            Self::Literal(field) => Ok(Vector::constant(field.clone(), count)),
            Self::Binary { op, lhs, rhs } => {
                let left = lhs.eval(schema, cols, count)?;
                let right = rhs.eval(schema, cols, count)?;
                eval_binary(*op, &left, &right, count)
            }
        }
    }

    /// Evaluates against a single row.
    pub fn eval_row(&self, schema: &OutputSchema, row: &[Field]) -> Result<Field, ExecError> {
        let cols: Vec<Vector> = row
            .iter()
            .map(|field| Vector::constant(field.clone(), 1))
            .collect();
        let result = self.eval(schema, &cols, 1)?;
        Ok(result.get(0).clone())
    }
}

fn eval_binary(op: OpType, left: &Vector, right: &Vector, count: usize) -> Result<Vector, ExecError> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(apply_op(op, left.get(i), right.get(i))?);
    }
    let ty = out.first().map_or(LogicalType::Int, Field::ty);
    Ok(Vector::from_values(ty, out))
}

fn apply_op(op: OpType, l: &Field, r: &Field) -> Result<Field, ExecError> {
    use std::cmp::Ordering;

    if op.is_logical() {
        let l = l.as_int()? != 0;
        let r = r.as_int()? != 0;
        let v = match op {
            OpType::And => l && r,
            OpType::Or => l || r,
            _ => unreachable!(),
        };
        return Ok(Field::Int(v as i64));
    }

    if op.is_comparison() {
        let ord = match (l, r) {
            (Field::Str(a), Field::Str(b)) => a.as_ref().cmp(b.as_ref()),
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            _ => {
                let (a, b) = (l.as_f64()?, r.as_f64()?);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        };
        let v = match op {
            OpType::Eq => ord == Ordering::Equal,
            OpType::Neq => ord != Ordering::Equal,
            OpType::Lt => ord == Ordering::Less,
            OpType::Gt => ord == Ordering::Greater,
            OpType::Leq => ord != Ordering::Greater,
            OpType::Geq => ord != Ordering::Less,
            _ => unreachable!(),
        };
        return Ok(Field::Int(v as i64));
    }

    // Arithmetic. Integer pairs stay integer; anything else goes through
    // floats.
    match (l, r) {
        (Field::Int(a), Field::Int(b)) => {
            let v = match op {
                OpType::Add => a.wrapping_add(*b),
                OpType::Sub => a.wrapping_sub(*b),
                OpType::Mul => a.wrapping_mul(*b),
                OpType::Div => {
                    if *b == 0 {
                        return Err(ExecError::Expression("integer division by zero".into()));
                    }
                    a.wrapping_div(*b)
                }
                _ => unreachable!(),
            };
            Ok(Field::Int(v))
        }
        _ => {
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            let v = match op {
                OpType::Add => a + b,
                OpType::Sub => a - b,
                OpType::Mul => a * b,
                OpType::Div => a / b,
                _ => unreachable!(),
            };
            Ok(Field::Float(v))
        }
    }
}
