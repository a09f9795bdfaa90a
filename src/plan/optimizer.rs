//! Cost-based join-order planner.
//!
//! Bottom-up dynamic programming over the subset lattice of base tables.
//! For every table subset `S` (as a bitmask over leaf positions) the
//! planner records the cheapest way to join `S` out of its splits
//! `(T, S \ T)`:
//!
//! - a split with an equality predicate straddling it may use a hash
//!   join: `min(scan·|T|·|S\T|, hj·(|T|+|S\T|) + scan·|S|)`;
//! - otherwise the split pays the Cartesian nested-loop term
//!   `scan·|T|·|S\T|`;
//! - leaves cost `scan · cardinality`.
//!
//! Cardinalities come from user-supplied hints keyed by table-name sets
//! when present, otherwise from catalog row counts (subsets without a
//! hint fall back to the product of their members — a Cartesian upper
//! bound).
//!
//! The planner runs only when the root is a projection or aggregation
//! over a pure join/scan subtree of at most 20 tables with statistics or
//! hints for every base table. Reconstruction clones the original leaf
//! plans and attaches each predicate at the shallowest join where both
//! of its sides are available.

use tracing::debug;

use crate::catalog::Catalog;
use crate::options::{ExecOptions, OptimizerOptions};
use crate::plan::predicate::{PredicateElement, PredicateVec, TableBitset};
use crate::plan::{apply_rules, ConvertToHashJoinRule, OptRule, PlanNode, PlanOp};

/// Table-count sentinel for nodes that must veto cost-based planning
/// (values clauses and other non-relational leaves).
const VETO_TABLE_COUNT: usize = 10_000;

/// Max base tables the subset DP will enumerate.
const MAX_DP_TABLES: usize = 20;

/// Entry point: cost-based join ordering, rule-based hash-join
/// conversion, and the optional predicate-transfer wrapper.
pub struct CostBasedOptimizer;

impl CostBasedOptimizer {
    pub fn optimize(
        mut plan: PlanNode,
        catalog: &Catalog,
        opts: &OptimizerOptions,
        exec: &ExecOptions,
    ) -> PlanNode {
        if opts.enable_cost_based && check_condition(&plan, catalog, opts) {
            plan = dp_join_order(plan, catalog, opts);
        }

        let rules: Vec<Box<dyn OptRule>> = vec![Box::new(ConvertToHashJoinRule)];
        plan = apply_rules(plan, &rules);

        if exec.enable_predicate_transfer && !plan.is_dml() {
            let output_schema = plan.output_schema.clone();
            let table_bitset = plan.table_bitset;
            plan = PlanNode {
                op: PlanOp::PredicateTransfer,
                child: Some(Box::new(plan)),
                child2: None,
                output_schema,
                table_bitset,
                predicate: PredicateVec::new(),
                cost: 0.0,
            };
        }
        plan
    }
}

// ------------------------------------------------------------------------------------------------
// Preconditions
// ------------------------------------------------------------------------------------------------

fn table_count(plan: &PlanNode) -> usize {
    match &plan.op {
        PlanOp::Print { .. } => VETO_TABLE_COUNT,
        PlanOp::SeqScan { .. } | PlanOp::RangeScan { .. } => 1,
        _ => {
            let mut count = 0;
            if let Some(child) = &plan.child {
                count += table_count(child);
            }
            if let Some(child2) = &plan.child2 {
                count += table_count(child2);
            }
            count
        }
    }
}

fn all_joins(plan: &PlanNode) -> bool {
    match &plan.op {
        PlanOp::SeqScan { .. } | PlanOp::RangeScan { .. } => true,
        PlanOp::Join => {
            plan.child.as_deref().is_some_and(all_joins)
                && plan.child2.as_deref().is_some_and(all_joins)
        }
        _ => false,
    }
}

fn has_stats(plan: &PlanNode, catalog: &Catalog) -> bool {
    match &plan.op {
        PlanOp::SeqScan { table, .. } | PlanOp::RangeScan { table, .. } => {
            catalog.stats(table).is_some()
        }
        PlanOp::Join => {
            plan.child
                .as_deref()
                .is_some_and(|c| has_stats(c, catalog))
                && plan
                    .child2
                    .as_deref()
                    .is_some_and(|c| has_stats(c, catalog))
        }
        _ => false,
    }
}

/// Cost-based planning requires: a Project or Aggregate root over a pure
/// join/scan subtree, at most [`MAX_DP_TABLES`] tables, and cardinality
/// information for every base table.
fn check_condition(plan: &PlanNode, catalog: &Catalog, opts: &OptimizerOptions) -> bool {
    if table_count(plan) > MAX_DP_TABLES {
        return false;
    }
    if !matches!(plan.op, PlanOp::Project { .. } | PlanOp::Aggregate { .. }) {
        return false;
    }
    let Some(child) = plan.child.as_deref() else {
        return false;
    };
    if !all_joins(child) {
        return false;
    }
    opts.true_cardinality_hints.is_some() || has_stats(child, catalog)
}

// ------------------------------------------------------------------------------------------------
// Leaf and predicate extraction
// ------------------------------------------------------------------------------------------------

fn dfs_collect(
    plan: &PlanNode,
    elements: &mut Vec<PredicateElement>,
    names: &mut Vec<String>,
    leaves: &mut Vec<PlanNode>,
) {
    match &plan.op {
        PlanOp::SeqScan { table, .. } | PlanOp::RangeScan { table, .. } => {
            names.push(table.clone());
            leaves.push(plan.clone());
            return;
        }
        _ => {}
    }
    if let Some(child) = &plan.child {
        dfs_collect(child, elements, names, leaves);
    }
    if let Some(child2) = &plan.child2 {
        dfs_collect(child2, elements, names, leaves);
    }
    if matches!(plan.op, PlanOp::Join) {
        elements.extend(plan.predicate.elements().iter().cloned());
    }
}

// ------------------------------------------------------------------------------------------------
// Subset DP
// ------------------------------------------------------------------------------------------------

fn dp_join_order(mut plan: PlanNode, catalog: &Catalog, opts: &OptimizerOptions) -> PlanNode {
    let Some(child) = plan.child.take() else {
        return plan;
    };

    let mut elements = Vec::new();
    let mut names = Vec::new();
    let mut leaves = Vec::new();
    dfs_collect(&child, &mut elements, &mut names, &mut leaves);

    let n = leaves.len();
    if n == 0 || n > MAX_DP_TABLES {
        plan.child = Some(child);
        return plan;
    }
    let full = 1usize << n;

    // Union table bitset of every subset mask, built incrementally from
    // each mask's lowest set bit.
    let mut set = vec![TableBitset::empty(); full];
    for mask in 1..full {
        let low = mask.trailing_zeros() as usize;
        set[mask] = set[mask & (mask - 1)].union(leaves[low].table_bitset);
    }

    // Cardinalities: hints first, then catalog row counts for single
    // tables, then member products for unhinted subsets.
    let mut sz = vec![0.0f64; full];
    if let Some(hints) = &opts.true_cardinality_hints {
        for (hint_names, card) in hints {
            let mut mask = 0usize;
            let mut resolved = true;
            for name in hint_names {
                match names.iter().position(|n| n == name) {
                    Some(pos) => mask |= 1 << pos,
                    None => {
                        resolved = false;
                        break;
                    }
                }
            }
            if resolved && mask != 0 {
                sz[mask] = *card;
            }
        }
    }
    for (i, name) in names.iter().enumerate() {
        if sz[1 << i] == 0.0 {
            sz[1 << i] = catalog.stats(name).map_or(1.0, |s| s.row_count.max(1.0));
        }
    }
    for mask in 1..full {
        if mask.count_ones() >= 2 && sz[mask] == 0.0 {
            let low = mask.trailing_zeros() as usize;
            sz[mask] = sz[mask & (mask - 1)] * sz[1 << low];
        }
    }

    let scan_cost = opts.scan_cost;
    let hash_join_cost = opts.hash_join_cost;

    let mut dp = vec![f64::INFINITY; full];
    // `None` marks an uncomputed subset; a plain zero would collide with
    // a legitimate split value.
    let mut choose: Vec<Option<usize>> = vec![None; full];
    for i in 0..n {
        dp[1 << i] = scan_cost * sz[1 << i];
    }

    for s in 1..full {
        if s.count_ones() < 2 {
            continue;
        }
        let mut t = (s - 1) & s;
        while t > 0 && t >= s / 2 {
            let rest = s & !t;
            let mut cost = dp[t] + dp[rest];

            let can_hj = elements.iter().any(|e| {
                e.is_eq()
                    && ((e.check_left(set[t])
                        && e.check_right(set[rest])
                        && !e.check_right(set[t])
                        && !e.check_left(set[rest]))
                        || (e.check_left(set[rest])
                            && e.check_right(set[t])
                            && !e.check_right(set[rest])
                            && !e.check_left(set[t])))
            });

            cost += if can_hj {
                (scan_cost * sz[t] * sz[rest])
                    .min(hash_join_cost * (sz[t] + sz[rest]) + scan_cost * sz[s])
            } else {
                scan_cost * sz[t] * sz[rest]
            };

            if choose[s].is_none() || cost < dp[s] {
                dp[s] = cost;
                choose[s] = Some(t);
            }
            t = (t - 1) & s;
        }
    }

    let all = full - 1;
    debug!(tables = n, cost = dp[all], "join-order DP complete");
    plan.child = Some(Box::new(generate(all, &leaves, &choose, &set, &elements)));
    plan.cost = dp[all];
    plan
}

/// Rebuilds the join tree for subset `s` from the DP tables. Each
/// predicate attaches at the shallowest join where both of its sides
/// become available.
fn generate(
    s: usize,
    leaves: &[PlanNode],
    choose: &[Option<usize>],
    set: &[TableBitset],
    elements: &[PredicateElement],
) -> PlanNode {
    if s.count_ones() == 1 {
        return leaves[s.trailing_zeros() as usize].clone();
    }

    let t = choose[s].unwrap_or_else(|| {
        // Unreachable for any subset the DP visited; fall back to the
        // lowest bit so a malformed table still yields a tree.
        s & s.wrapping_neg()
    });
    let left = generate(t, leaves, choose, set, elements);
    let right = generate(s & !t, leaves, choose, set, elements);

    let mut predicate = PredicateVec::new();
    for element in elements {
        let applies_here = element.check_left(set[s]) && element.check_right(set[s]);
        let in_left = element.check_left(left.table_bitset) && element.check_right(left.table_bitset);
        let in_right =
            element.check_left(right.table_bitset) && element.check_right(right.table_bitset);
        if applies_here && !in_left && !in_right {
            predicate.push(element.clone());
        }
    }

    PlanNode::join(left, right, predicate)
}
