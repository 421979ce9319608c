// Structural DOM similarity
//
// Trees are compared position by position: children are paired by index,
// there is no insertion/deletion alignment search.

use crate::model::{DomChild, DomNode, DomTree, clamp_unit};
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_DECAY: f64 = 100.0;
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Cost charged when a paired child is not an element on one side.
const TYPE_MISMATCH_COST: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomComparator {
    /// Sensitivity of the distance-to-similarity mapping.
    pub decay: f64,
    /// Node pairs deeper than this contribute nothing.
    pub max_depth: usize,
}

impl Default for DomComparator {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DomComparator {
    pub fn new(decay: f64, max_depth: usize) -> Self {
        Self { decay, max_depth }
    }

    /// Positional structural distance between two trees.
    pub fn distance(&self, test: &DomNode, reference: &DomNode) -> u64 {
        positional_distance(test, reference, 0, self.max_depth)
    }

    /// `exp(-distance / decay)`, in `(0, 1]`.
    pub fn similarity(&self, test: &DomNode, reference: &DomNode) -> f64 {
        let distance = self.distance(test, reference);
        let score = clamp_unit((-(distance as f64) / self.decay).exp());
        debug!("DOM distance={} similarity={:.4}", distance, score);
        score
    }

    pub fn score_trees(&self, test: &DomTree, reference: &DomTree) -> f64 {
        self.similarity(&test.root, &reference.root)
    }

    /// Load two DOM artifacts and score them. Any load or parse failure
    /// yields `0.0`.
    pub fn score_files(&self, test: &Path, reference: &Path) -> f64 {
        let trees = DomTree::load(test).and_then(|t| Ok((t, DomTree::load(reference)?)));

        match trees {
            Ok((test_tree, reference_tree)) => self.score_trees(&test_tree, &reference_tree),
            Err(e) => {
                warn!(
                    "DOM scoring failed for {} vs {}: {}",
                    test.display(),
                    reference.display(),
                    e
                );
                0.0
            }
        }
    }
}

fn positional_distance(a: &DomNode, b: &DomNode, depth: usize, max_depth: usize) -> u64 {
    if depth > max_depth {
        return 0;
    }

    let tag_cost = u64::from(a.tag.to_uppercase() != b.tag.to_uppercase());
    let structural = a.children.len().abs_diff(b.children.len()) as u64;

    let paired: u64 = a
        .children
        .iter()
        .zip(b.children.iter())
        .map(|pair| match pair {
            (DomChild::Element(x), DomChild::Element(y)) => {
                positional_distance(x, y, depth + 1, max_depth)
            }
            _ => TYPE_MISMATCH_COST,
        })
        .sum();

    tag_cost + structural + paired
}

/// Score two trees with the default comparator.
pub fn dom_score(test: &DomNode, reference: &DomNode) -> f64 {
    DomComparator::default().similarity(test, reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_page() -> DomNode {
        DomNode::with_children(
            "body",
            vec![
                DomNode::with_children("header", vec![DomNode::new("img"), DomNode::new("nav")]),
                DomNode::with_children(
                    "form",
                    vec![DomNode::new("input"), DomNode::new("input"), DomNode::new("button")],
                ),
                DomNode::new("footer"),
            ],
        )
    }

    fn chain(depth: usize) -> DomNode {
        chain_with_leaf(depth, "div")
    }

    fn chain_with_leaf(depth: usize, leaf: &str) -> DomNode {
        let mut node = DomNode::new(leaf);
        for _ in 1..depth {
            node = DomNode::with_children("div", vec![node]);
        }
        node
    }

    #[test]
    fn test_identical_trees_score_one() {
        let tree = login_page();
        assert_eq!(DomComparator::default().distance(&tree, &tree), 0);
        assert_eq!(dom_score(&tree, &tree), 1.0);
    }

    #[test]
    fn test_tag_comparison_is_case_insensitive() {
        let a = DomNode { tag: "div".to_string(), children: vec![] };
        let b = DomNode { tag: "DIV".to_string(), children: vec![] };
        assert_eq!(DomComparator::default().distance(&a, &b), 0);
    }

    #[test]
    fn test_tag_mismatch_costs_one() {
        let a = DomNode::new("div");
        let b = DomNode::new("span");
        assert_eq!(DomComparator::default().distance(&a, &b), 1);
    }

    #[test]
    fn test_unmatched_children_counted_not_recursed() {
        let a = DomNode::with_children("body", vec![DomNode::new("div")]);
        let b = DomNode::with_children(
            "body",
            vec![
                DomNode::new("div"),
                // deep subtree beyond the shorter list only costs 1
                chain(10),
                DomNode::new("p"),
            ],
        );
        assert_eq!(DomComparator::default().distance(&a, &b), 2);
    }

    #[test]
    fn test_opaque_child_costs_one() {
        let a = DomNode {
            tag: "DIV".to_string(),
            children: vec![DomChild::Opaque, DomChild::Element(DomNode::new("p"))],
        };
        let b = DomNode::with_children("div", vec![DomNode::new("span"), DomNode::new("p")]);
        assert_eq!(DomComparator::default().distance(&a, &b), 1);
        assert_eq!(DomComparator::default().distance(&a, &a), 1);
    }

    #[test]
    fn test_distance_sums_over_tree() {
        let a = login_page();
        let b = DomNode::with_children(
            "body",
            vec![
                DomNode::with_children("header", vec![DomNode::new("img")]),
                DomNode::with_children("form", vec![DomNode::new("input"), DomNode::new("a")]),
                DomNode::new("div"),
            ],
        );
        // header: 1 missing child; form: 1 missing child + INPUT/A; footer/div: 1
        assert_eq!(DomComparator::default().distance(&a, &b), 4);
        let expected = (-4.0f64 / 100.0).exp();
        assert!((dom_score(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_symmetric() {
        let a = login_page();
        let b = DomNode::with_children("body", vec![DomNode::new("form"), chain(5)]);
        assert_eq!(dom_score(&a, &b), dom_score(&b, &a));
    }

    #[test]
    fn test_bounded() {
        let a = chain(3);
        let mut wide = DomNode::new("body");
        for _ in 0..5000 {
            wide.children.push(DomChild::Opaque);
        }
        let score = dom_score(&a, &wide);
        assert!(score >= 0.0 && score <= 1.0);
    }

    #[test]
    fn test_depth_cap() {
        let comparator = DomComparator::default();
        let a = chain(400);
        // only the deepest node differs, far below the cap
        let b = chain_with_leaf(400, "span");

        assert_eq!(comparator.distance(&a, &b), 0);
        assert_eq!(comparator.distance(&a, &b), comparator.distance(&a, &b));
    }

    #[test]
    fn test_depth_cap_counts_levels_up_to_limit() {
        let comparator = DomComparator::new(100.0, 2);
        // depths 0,1,2 are compared; depth 3 is ignored
        let a = chain(4);
        let mut b = chain(4);
        if let Some(DomChild::Element(level1)) = b.children.first_mut() {
            level1.tag = "P".to_string();
        }
        assert_eq!(comparator.distance(&a, &b), 1);
    }

    #[test]
    fn test_score_files_failure_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, r#"{"title": "x", "dom": {"tag": "BODY", "children": []}}"#).unwrap();
        std::fs::write(&bad, "not json").unwrap();

        let comparator = DomComparator::default();
        assert_eq!(comparator.score_files(&good, &bad), 0.0);
        assert_eq!(comparator.score_files(&good, &dir.path().join("missing.json")), 0.0);
        assert_eq!(comparator.score_files(&good, &good), 1.0);
    }
}
