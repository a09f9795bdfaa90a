#[cfg(test)]
mod tests {
    use crate::catalog::LogicalType;
    use crate::exec::batch::Field;
    use crate::exec::expr::{Expr, OpType};
    use crate::plan::predicate::{PredicateVec, TableBitset};

    fn col(table: usize, column: usize) -> Expr {
        Expr::column(table, column, LogicalType::Int)
    }

    /// `a = b AND c > 0` splits into two clauses: the equality straddles
    /// the tables of `a` and `b`, the range clause does not.
    #[test]
    fn conjunction_decomposes_into_clauses() {
        let expr = Expr::binary(
            OpType::And,
            Expr::binary(OpType::Eq, col(0, 0), col(1, 0)),
            Expr::binary(OpType::Gt, col(0, 1), Expr::literal(Field::Int(0))),
        );
        let vec = PredicateVec::create(&expr);
        assert_eq!(vec.len(), 2);

        let eq = &vec.elements()[0];
        assert!(eq.is_eq());
        assert_eq!(eq.left, TableBitset::single(0));
        assert_eq!(eq.right, TableBitset::single(1));

        let range = &vec.elements()[1];
        assert!(!range.is_eq());
        assert_eq!(range.left, TableBitset::single(0));
        assert_eq!(range.right, TableBitset::empty());
    }

    #[test]
    fn non_binary_atoms_are_wrapped_as_neq_zero() {
        // A bare disjunction is one atom: it becomes `(x OR y) ≠ 0` with
        // an empty right-side bitset.
        let expr = Expr::binary(
            OpType::Or,
            Expr::binary(OpType::Eq, col(0, 0), Expr::literal(Field::Int(1))),
            Expr::binary(OpType::Eq, col(1, 0), Expr::literal(Field::Int(2))),
        );
        let vec = PredicateVec::create(&expr);
        assert_eq!(vec.len(), 1);

        let wrapped = &vec.elements()[0];
        assert!(matches!(
            &wrapped.expr,
            Expr::Binary { op: OpType::Neq, .. }
        ));
        assert_eq!(
            wrapped.left,
            TableBitset::single(0).union(TableBitset::single(1))
        );
        assert_eq!(wrapped.right, TableBitset::empty());
    }

    #[test]
    fn nested_ands_flatten() {
        let expr = Expr::binary(
            OpType::And,
            Expr::binary(
                OpType::And,
                Expr::binary(OpType::Eq, col(0, 0), col(1, 0)),
                Expr::binary(OpType::Lt, col(1, 1), Expr::literal(Field::Int(5))),
            ),
            Expr::binary(OpType::Geq, col(2, 0), Expr::literal(Field::Int(3))),
        );
        let vec = PredicateVec::create(&expr);
        assert_eq!(vec.len(), 3);
    }

    #[test]
    fn gen_expr_rebuilds_the_conjunction() {
        let expr = Expr::binary(
            OpType::And,
            Expr::binary(OpType::Eq, col(0, 0), col(1, 0)),
            Expr::binary(OpType::Gt, col(0, 1), Expr::literal(Field::Int(0))),
        );
        let vec = PredicateVec::create(&expr);
        let rebuilt = vec.gen_expr().unwrap();
        // Re-splitting the rebuilt expression yields the same clauses.
        assert_eq!(PredicateVec::create(&rebuilt).len(), 2);

        assert!(PredicateVec::new().gen_expr().is_none());
    }

    #[test]
    fn containment_checks() {
        let expr = Expr::binary(OpType::Eq, col(0, 0), col(2, 0));
        let vec = PredicateVec::create(&expr);
        let e = &vec.elements()[0];

        let both = TableBitset::single(0).union(TableBitset::single(2));
        assert!(e.check_left(both));
        assert!(e.check_right(both));
        assert!(e.check_left(TableBitset::single(0)));
        assert!(!e.check_left(TableBitset::single(2)));
        assert!(!e.check_right(TableBitset::single(0)));
    }

    #[test]
    fn append_concatenates() {
        let a = PredicateVec::create(&Expr::binary(OpType::Eq, col(0, 0), col(1, 0)));
        let mut b = PredicateVec::create(&Expr::binary(OpType::Lt, col(1, 0), col(2, 0)));
        b.append(a);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn apply_exprs_substitutes_column_refs() {
        use crate::catalog::{OutputColumn, OutputSchema};

        // Predicate over table 0's column 0; the projection replaces that
        // column with a column of table 5.
        let mut vec = PredicateVec::create(&Expr::binary(
            OpType::Eq,
            col(0, 0),
            Expr::literal(Field::Int(1)),
        ));
        let schema = OutputSchema::new(vec![OutputColumn {
            name: "x".into(),
            ty: LogicalType::Int,
            table_id: 0,
            column: 0,
        }]);
        vec.apply_exprs(&[col(5, 2)], &schema);

        let e = &vec.elements()[0];
        assert_eq!(e.left, TableBitset::single(5));
        assert_eq!(e.right, TableBitset::empty());
        assert!(matches!(
            e.lhs(),
            Expr::Column { table_id: 5, column: 2, .. }
        ));
    }
}
