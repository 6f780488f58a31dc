//! Structural invariants and behavioral laws, checked over generated
//! workloads.

use itertools::Itertools;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use persistent_rtree::{BoundingBox, Entry, Node, Point, RTree};

/// Recursively checks the structural invariants of a subtree and returns
/// its height.
///
/// - every box is the minimum cover of its children (exact equality holds
///   because covers are pure min/max folds);
/// - leaves hold at most `M` entries, and at least one unless they are the
///   root;
/// - branches hold between 2 and `M` children, all of equal height;
/// - every entry lies inside every ancestor box.
fn check_node<A, const M: usize>(node: &Node<A, M>, is_root: bool) -> usize {
    match node {
        Node::Leaf { children, bbox } => {
            assert!(children.len() <= M, "leaf over fan-out bound");
            if !is_root {
                assert!(!children.is_empty(), "non-root leaf is empty");
            }
            let cover = children
                .iter()
                .fold(BoundingBox::EMPTY, |b, e| b.expand(&e.pt.to_bbox()));
            assert_eq!(*bbox, cover, "leaf box is not the minimum cover");
            for entry in children {
                assert!(bbox.contains_point(&entry.pt));
            }
            1
        }
        Node::Branch { children, bbox } => {
            assert!(children.len() >= 2, "undersized branch survived");
            assert!(children.len() <= M, "branch over fan-out bound");
            let cover = children
                .iter()
                .fold(BoundingBox::EMPTY, |b, c| b.expand(&c.bbox()));
            assert_eq!(*bbox, cover, "branch box is not the minimum cover");
            let heights: Vec<usize> = children
                .iter()
                .map(|child| check_node(child.as_ref(), false))
                .collect();
            assert!(
                heights.iter().all_equal(),
                "leaves at different depths: {heights:?}"
            );
            1 + heights[0]
        }
    }
}

fn check_invariants<A, const M: usize>(tree: &RTree<A, M>)
where
    A: Clone + PartialEq,
{
    check_node(tree.root(), true);
    assert_eq!(tree.root().len(), tree.size());
}

type Raw = (f32, f32, u32);

fn to_entry(&(x, y, v): &Raw) -> Entry<u32> {
    Entry::new(Point::new(x, y), v)
}

fn build_tree(raw: &[Raw], seed: u64) -> RTree<u32, 4> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tree: RTree<u32, 4> = RTree::new();
    for r in raw {
        tree = tree.insert_with(&mut rng, to_entry(r));
    }
    tree
}

/// Multiset fingerprint of a tree's entries, comparable across versions.
fn fingerprint<const M: usize>(tree: &RTree<u32, M>) -> Vec<(u32, u32, u32)> {
    tree.iter()
        .map(|e| (e.pt.x.to_bits(), e.pt.y.to_bits(), e.value))
        .sorted_unstable()
        .collect()
}

fn raw_entries() -> impl Strategy<Value = Vec<Raw>> {
    prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0, 0u32..5), 1..60)
}

proptest! {
    #[test]
    fn insert_then_contains(raw in raw_entries(), seed in any::<u64>()) {
        let tree = build_tree(&raw, seed);
        check_invariants(&tree);
        prop_assert_eq!(tree.size(), raw.len());
        for r in &raw {
            prop_assert!(tree.contains(&to_entry(r)));
        }
    }

    #[test]
    fn count_equals_search_len(
        raw in raw_entries(),
        seed in any::<u64>(),
        corners in ((-120.0f32..120.0, -120.0f32..120.0), (-120.0f32..120.0, -120.0f32..120.0)),
    ) {
        let tree = build_tree(&raw, seed);
        let ((x1, y1), (x2, y2)) = corners;
        let space = BoundingBox::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2));

        let found = tree.search(&space);
        prop_assert_eq!(tree.count(&space), found.len());
        for entry in &found {
            prop_assert!(space.contains_point(&entry.pt));
        }

        let expected = raw
            .iter()
            .filter(|&&(x, y, _)| space.contains_point(&Point::new(x, y)))
            .count();
        prop_assert_eq!(found.len(), expected);
    }

    #[test]
    fn remove_keeps_the_rest(
        raw in raw_entries(),
        seed in any::<u64>(),
        pick in any::<prop::sample::Index>(),
    ) {
        let tree = build_tree(&raw, seed);
        let victim = to_entry(pick.get(&raw));

        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        let removed = tree.remove_with(&mut rng, &victim);

        check_invariants(&removed);
        prop_assert_eq!(removed.size(), tree.size() - 1);

        // Exactly one occurrence of the victim is gone.
        let mut expected = fingerprint(&tree);
        let key = (victim.pt.x.to_bits(), victim.pt.y.to_bits(), victim.value);
        let at = expected.iter().position(|&k| k == key).unwrap();
        expected.remove(at);
        prop_assert_eq!(fingerprint(&removed), expected);

        // The original version is untouched.
        prop_assert_eq!(tree.size(), raw.len());
        prop_assert!(tree.contains(&victim));
    }

    #[test]
    fn remove_absent_changes_nothing(raw in raw_entries(), seed in any::<u64>()) {
        let tree = build_tree(&raw, seed);
        // Generated coordinates stay inside (-100, 100).
        let absent = Entry::new(Point::new(500.0, 500.0), 0);
        let same = tree.remove(&absent);
        prop_assert_eq!(same.size(), tree.size());
        prop_assert_eq!(fingerprint(&same), fingerprint(&tree));
    }

    #[test]
    fn drain_everything(raw in raw_entries(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tree = build_tree(&raw, seed);
        for r in &raw {
            tree = tree.remove_with(&mut rng, &to_entry(r));
            check_invariants(&tree);
        }
        prop_assert!(tree.is_empty());
        prop_assert_eq!(tree.iter().count(), 0);
    }

    #[test]
    fn nearest_k_matches_brute_force(
        raw in raw_entries(),
        seed in any::<u64>(),
        qx in -120.0f32..120.0,
        qy in -120.0f32..120.0,
        k in 0usize..12,
    ) {
        let tree = build_tree(&raw, seed);
        let query = Point::new(qx, qy);

        let found = tree.nearest_k(&query, k);
        prop_assert_eq!(found.len(), k.min(raw.len()));

        let brute: Vec<f32> = raw
            .iter()
            .map(|&(x, y, _)| Point::new(x, y).distance(&query))
            .sorted_unstable_by(|a, b| a.partial_cmp(b).unwrap())
            .take(k)
            .collect();

        let distances: Vec<f32> = found.iter().map(|&(d, _)| d).collect();
        prop_assert_eq!(&distances, &brute);
        // Ascending, and each reported distance is the real one.
        for (d, entry) in &found {
            prop_assert_eq!(*d, entry.pt.distance(&query));
        }
    }

    #[test]
    fn nearest_is_first_of_nearest_k(
        raw in raw_entries(),
        seed in any::<u64>(),
        qx in -120.0f32..120.0,
        qy in -120.0f32..120.0,
    ) {
        let tree = build_tree(&raw, seed);
        let query = Point::new(qx, qy);

        let nearest = tree.nearest(&query);
        let top = tree.nearest_k(&query, 1);
        prop_assert!(nearest.is_some());
        prop_assert_eq!(nearest.map(|(d, _)| d), top.first().map(|&(d, _)| d));
    }

    #[test]
    fn default_fan_out_handles_bulk(raw in prop::collection::vec((-100.0f32..100.0, -100.0f32..100.0, 0u32..5), 1..300), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tree: RTree<u32> = RTree::new();
        for r in &raw {
            tree = tree.insert_with(&mut rng, to_entry(r));
        }
        check_node(tree.root(), true);
        prop_assert_eq!(tree.size(), raw.len());
        prop_assert_eq!(tree.count(&BoundingBox::new(-100.0, -100.0, 100.0, 100.0)), raw.len());
    }
}
