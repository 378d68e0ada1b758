//! Table aliases used in generated statements.
//!
//! ```text
//! PlayerStats                 player_stats
//! nested level n              player_stats_inner_<n>   (0 = directly under the outermost)
//! page total wrapper          player_stats_page_total
//! join                        <parent alias>_<join>    (assigned by the resolver)
//! ```

/// Alias of the subquery feeding the level at `depth` (outermost is 0).
pub fn subquery_alias(root: &str, depth: usize) -> String {
    format!("{}_inner_{}", root, depth)
}

pub fn page_total_alias(root: &str) -> String {
    format!("{}_page_total", root)
}
