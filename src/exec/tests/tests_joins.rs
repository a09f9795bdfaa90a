#[cfg(test)]
mod tests {
    use rand::Rng;

    use crate::catalog::{LogicalType, OutputColumn, OutputSchema};
    use crate::exec::batch::Field;
    use crate::exec::executor::VecExecutor;
    use crate::exec::expr::{Expr, OpType};
    use crate::exec::hash_join::HashJoinExec;
    use crate::exec::join::NestedLoopJoinExec;
    use crate::exec::scan::ValuesExec;

    fn table_schema(table_id: usize, prefix: &str) -> OutputSchema {
        OutputSchema::new(vec![
            OutputColumn {
                name: format!("{prefix}_key"),
                ty: LogicalType::Int,
                table_id,
                column: 0,
            },
            OutputColumn {
                name: format!("{prefix}_payload"),
                ty: LogicalType::String,
                table_id,
                column: 1,
            },
        ])
    }

    fn values(rows: Vec<Vec<Field>>, schema: &OutputSchema, batch: usize) -> Box<dyn VecExecutor> {
        Box::new(ValuesExec::new(rows, schema.clone(), batch))
    }

    fn eq_predicate() -> Expr {
        Expr::binary(
            OpType::Eq,
            Expr::column(0, 0, LogicalType::Int),
            Expr::column(1, 0, LogicalType::Int),
        )
    }

    fn drain(executor: &mut dyn VecExecutor) -> Vec<Vec<Field>> {
        executor.init().unwrap();
        let mut rows = Vec::new();
        loop {
            let batch = executor.next().unwrap();
            if batch.is_empty() {
                break;
            }
            for i in batch.selected_rows() {
                rows.push(batch.row(i));
            }
        }
        rows
    }

    fn sort_rows(mut rows: Vec<Vec<Field>>) -> Vec<Vec<Field>> {
        rows.sort_by_key(|row| {
            (
                row[0].as_int().unwrap(),
                row[1].as_str().unwrap().to_string(),
                row[2].as_int().unwrap(),
                row[3].as_str().unwrap().to_string(),
            )
        });
        rows
    }

    fn random_rows(count: usize, key_space: i64, prefix: &str) -> Vec<Vec<Field>> {
        let mut rng = rand::rng();
        (0..count)
            .map(|i| {
                vec![
                    Field::Int(rng.random_range(0..key_space)),
                    Field::str(format!("{prefix}{i}")),
                ]
            })
            .collect()
    }

    /// Hash join and nested-loop join must produce the same multiset of
    /// rows for any equality join.
    #[test]
    fn hash_join_matches_nested_loop() {
        let left_schema = table_schema(0, "l");
        let right_schema = table_schema(1, "r");
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        // Duplicate keys on both sides exercise bucket chains.
        let left_rows = random_rows(60, 10, "L");
        let right_rows = random_rows(80, 10, "R");

        // Small batches force buffering and resume paths.
        let batch = 7;
        let mut nl = NestedLoopJoinExec::new(
            values(left_rows.clone(), &left_schema, batch),
            values(right_rows.clone(), &right_schema, batch),
            Some(eq_predicate()),
            out_schema.clone(),
            batch,
        );
        let mut hj = HashJoinExec::new(
            values(left_rows, &left_schema, batch),
            values(right_rows, &right_schema, batch),
            Some(eq_predicate()),
            vec![Expr::column(0, 0, LogicalType::Int)],
            vec![Expr::column(1, 0, LogicalType::Int)],
            left_schema,
            right_schema,
            out_schema,
            batch,
        );

        let nl_rows = sort_rows(drain(&mut nl));
        let hj_rows = sort_rows(drain(&mut hj));
        assert_eq!(nl_rows.len(), hj_rows.len());
        assert_eq!(nl_rows, hj_rows);
    }

    #[test]
    fn nested_loop_without_predicate_is_a_cross_product() {
        let left_schema = table_schema(0, "l");
        let right_schema = table_schema(1, "r");
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        let left_rows = random_rows(9, 100, "L");
        let right_rows = random_rows(5, 100, "R");

        let mut nl = NestedLoopJoinExec::new(
            values(left_rows, &left_schema, 4),
            values(right_rows, &right_schema, 4),
            None,
            out_schema,
            4,
        );
        assert_eq!(drain(&mut nl).len(), 45);
    }

    #[test]
    fn nested_loop_yields_full_batches_and_resumes() {
        let left_schema = table_schema(0, "l");
        let right_schema = table_schema(1, "r");
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        // All keys equal: every pair matches, 20 × 20 = 400 output rows.
        let rows = |prefix: &str| -> Vec<Vec<Field>> {
            (0..20)
                .map(|i| vec![Field::Int(1), Field::str(format!("{prefix}{i}"))])
                .collect()
        };

        let batch = 16;
        let mut nl = NestedLoopJoinExec::new(
            values(rows("L"), &left_schema, batch),
            values(rows("R"), &right_schema, batch),
            Some(eq_predicate()),
            out_schema,
            batch,
        );
        nl.init().unwrap();

        let mut total = 0;
        let mut batches = Vec::new();
        loop {
            let b = nl.next().unwrap();
            if b.is_empty() {
                break;
            }
            total += b.size();
            batches.push(b.size());
        }
        assert_eq!(total, 400);
        // Every batch except possibly the last is exactly full.
        for size in &batches[..batches.len() - 1] {
            assert_eq!(*size, batch);
        }
    }

    #[test]
    fn hash_join_empty_sides() {
        let left_schema = table_schema(0, "l");
        let right_schema = table_schema(1, "r");
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        let mut empty_build = HashJoinExec::new(
            values(Vec::new(), &left_schema, 4),
            values(random_rows(5, 3, "R"), &right_schema, 4),
            Some(eq_predicate()),
            vec![Expr::column(0, 0, LogicalType::Int)],
            vec![Expr::column(1, 0, LogicalType::Int)],
            left_schema.clone(),
            right_schema.clone(),
            out_schema.clone(),
            4,
        );
        assert!(drain(&mut empty_build).is_empty());

        let mut empty_probe = HashJoinExec::new(
            values(random_rows(5, 3, "L"), &left_schema, 4),
            values(Vec::new(), &right_schema, 4),
            Some(eq_predicate()),
            vec![Expr::column(0, 0, LogicalType::Int)],
            vec![Expr::column(1, 0, LogicalType::Int)],
            left_schema,
            right_schema,
            out_schema,
            4,
        );
        assert!(drain(&mut empty_probe).is_empty());
    }

    #[test]
    fn hash_join_residual_predicate_filters_collisions() {
        let left_schema = table_schema(0, "l");
        let right_schema = table_schema(1, "r");
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        let left_rows = vec![
            vec![Field::Int(1), Field::str("a")],
            vec![Field::Int(2), Field::str("b")],
        ];
        let right_rows = vec![
            vec![Field::Int(1), Field::str("x")],
            vec![Field::Int(3), Field::str("y")],
        ];

        let mut hj = HashJoinExec::new(
            values(left_rows, &left_schema, 4),
            values(right_rows, &right_schema, 4),
            Some(eq_predicate()),
            vec![Expr::column(0, 0, LogicalType::Int)],
            vec![Expr::column(1, 0, LogicalType::Int)],
            left_schema,
            right_schema,
            out_schema,
            4,
        );
        let rows = drain(&mut hj);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Field::Int(1));
        assert_eq!(rows[0][2], Field::Int(1));
    }

    #[test]
    fn string_and_float_keys_hash_consistently() {
        let schema_of = |table_id| {
            OutputSchema::new(vec![OutputColumn {
                name: "k".into(),
                ty: LogicalType::String,
                table_id,
                column: 0,
            }])
        };
        let left_schema = schema_of(0);
        let right_schema = schema_of(1);
        let out_schema = OutputSchema::concat(&left_schema, &right_schema);

        let rows = vec![
            vec![Field::str("alpha")],
            vec![Field::str("beta")],
            vec![Field::str("gamma")],
        ];
        let predicate = Expr::binary(
            OpType::Eq,
            Expr::column(0, 0, LogicalType::String),
            Expr::column(1, 0, LogicalType::String),
        );

        let mut hj = HashJoinExec::new(
            values(rows.clone(), &left_schema, 2),
            values(rows, &right_schema, 2),
            Some(predicate),
            vec![Expr::column(0, 0, LogicalType::String)],
            vec![Expr::column(1, 0, LogicalType::String)],
            left_schema,
            right_schema,
            out_schema,
            2,
        );
        // Self-join on distinct strings: exactly one match per row.
        assert_eq!(drain(&mut hj).len(), 3);
    }
}
