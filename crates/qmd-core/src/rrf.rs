//! Reciprocal Rank Fusion (§4.6.3 step 3).
//!
//! A rank-based multi-list combiner: a document at 1-based rank `r` in a
//! list with weight `w` contributes `w / (k + r)` to its fused score.
//! Scores accumulate across every list the document appears in. This is
//! pure rank arithmetic — the lists' own raw scores never enter the
//! fusion, only their order.

use std::collections::HashMap;
use std::hash::Hash;

/// The RRF damping constant from §4.6.3.
pub const RRF_K: f64 = 60.0;

/// One ranked input list and its fusion weight.
pub struct WeightedList<T> {
    /// Items in descending-relevance order (rank 1 first).
    pub items: Vec<T>,
    pub weight: f64,
}

impl<T> WeightedList<T> {
    pub fn new(items: Vec<T>, weight: f64) -> Self {
        Self { items, weight }
    }
}

/// Fuse several weighted ranked lists into one descending-score list.
pub fn reciprocal_rank_fusion<T>(lists: &[WeightedList<T>]) -> Vec<(T, f64)>
where
    T: Eq + Hash + Clone,
{
    let mut scores: HashMap<T, f64> = HashMap::new();
    for list in lists {
        for (i, item) in list.items.iter().enumerate() {
            let rank = (i + 1) as f64;
            *scores.entry(item.clone()).or_insert(0.0) += list.weight / (RRF_K + rank);
        }
    }
    let mut fused: Vec<(T, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Divide every score by the top score (§4.6.3 step 4). A no-op on an
/// empty or all-zero input.
pub fn normalize_by_top<T>(fused: &mut [(T, f64)]) {
    if let Some((_, top)) = fused.first() {
        let top = *top;
        if top > 0.0 {
            for (_, score) in fused.iter_mut() {
                *score /= top;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_d_multi_list_hit_wins() {
        let l1 = WeightedList::new(vec!["a", "b"], 1.0);
        let l2 = WeightedList::new(vec!["b", "c"], 1.0);
        let fused = reciprocal_rank_fusion(&[l1, l2]);
        assert_eq!(fused[0].0, "b");
    }

    #[test]
    fn monotonicity_property() {
        // "a" outranks "b" in every list it shares with "b".
        let l1 = WeightedList::new(vec!["a", "b", "c"], 1.0);
        let l2 = WeightedList::new(vec!["a", "x", "b"], 2.0);
        let fused = reciprocal_rank_fusion(&[l1, l2]);
        let score_of = |doc: &str| fused.iter().find(|(d, _)| *d == doc).map(|(_, s)| *s).unwrap();
        assert!(score_of("a") > score_of("b"));
    }

    #[test]
    fn normalize_scales_top_to_one() {
        let mut fused = vec![("a", 0.4), ("b", 0.2)];
        normalize_by_top(&mut fused);
        assert!((fused[0].1 - 1.0).abs() < 1e-9);
        assert!((fused[1].1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_list_preserves_rank_order() {
        let l1 = WeightedList::new(vec![1, 2, 3], 1.0);
        let fused = reciprocal_rank_fusion(&[l1]);
        assert_eq!(fused.iter().map(|(d, _)| *d).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
