//! Linear-seed node splitting.
//!
//! When an insert pushes a node past its fan-out bound, the overfull child
//! sequence is partitioned into two balanced groups. Split quality drives
//! query performance for the lifetime of the affected subtree, so the
//! partition tries to keep the two covering boxes small and disjoint: two
//! seed members are picked at the extremes of the most separated axis, and
//! every other member joins the group it enlarges least.

use std::sync::Arc;

use rand::Rng;

use crate::bounding_box::BoundingBox;
use crate::entry::Entry;
use crate::node::Node;

/// Anything the splitter can partition: leaf entries or branch children.
pub(crate) trait Bounded {
    fn bounds(&self) -> BoundingBox;
}

impl<A> Bounded for Entry<A> {
    fn bounds(&self) -> BoundingBox {
        self.pt.to_bbox()
    }
}

impl<A, const MAX_ENTRIES: usize> Bounded for Arc<Node<A, MAX_ENTRIES>> {
    fn bounds(&self) -> BoundingBox {
        self.bbox()
    }
}

/// Partitions an overfull member sequence into two groups with their
/// covering boxes.
///
/// Each group ends up with at least one member, and with at least two
/// whenever the input is large enough to allow it. The concatenation of the
/// two groups is a permutation of the input. The random generator only
/// breaks exact enlargement-and-area ties.
pub(crate) fn split<M: Bounded, R: Rng>(
    mut members: Vec<M>,
    rng: &mut R,
) -> ((Vec<M>, BoundingBox), (Vec<M>, BoundingBox)) {
    debug_assert!(members.len() >= 3, "split requires an overfull sequence");

    let (left, right) = pick_seeds(&members);
    debug_assert!(left != right, "seeds must be distinct members");

    // Remove the larger index first so the smaller one stays valid.
    let (lo, hi) = if left < right { (left, right) } else { (right, left) };
    let hi_seed = members.remove(hi);
    let lo_seed = members.remove(lo);
    let (seed1, seed2) = if left < right {
        (lo_seed, hi_seed)
    } else {
        (hi_seed, lo_seed)
    };

    let mut bbox1 = seed1.bounds();
    let mut bbox2 = seed2.bounds();
    let mut group1 = vec![seed1];
    let mut group2 = vec![seed2];

    while let Some(member) = members.pop() {
        if group1.len() >= 2 && group2.len() + members.len() + 1 <= 2 {
            // Everything left fits into group 2 without starving it.
            bbox2 = bbox2.expand(&member.bounds());
            group2.push(member);
            while let Some(rest) = members.pop() {
                bbox2 = bbox2.expand(&rest.bounds());
                group2.push(rest);
            }
        } else if group2.len() >= 2 && group1.len() + members.len() + 1 <= 2 {
            bbox1 = bbox1.expand(&member.bounds());
            group1.push(member);
            while let Some(rest) = members.pop() {
                bbox1 = bbox1.expand(&rest.bounds());
                group1.push(rest);
            }
        } else {
            let bounds = member.bounds();
            let enlarge1 = bbox1.expand_area(&bounds);
            let enlarge2 = bbox2.expand_area(&bounds);
            let to_group1 = if enlarge1 < enlarge2 {
                true
            } else if enlarge2 < enlarge1 {
                false
            } else {
                let area1 = bbox1.expand(&bounds).area();
                let area2 = bbox2.expand(&bounds).area();
                if area1 < area2 {
                    true
                } else if area2 < area1 {
                    false
                } else {
                    rng.random::<bool>()
                }
            };
            if to_group1 {
                bbox1 = bbox1.expand(&bounds);
                group1.push(member);
            } else {
                bbox2 = bbox2.expand(&bounds);
                group2.push(member);
            }
        }
    }

    debug_assert!(!group1.is_empty() && !group2.is_empty());
    ((group1, bbox1), (group2, bbox2))
}

/// Picks the two seed indices with the linear heuristic: on each axis,
/// normalize the gap between the highest lower bound and the lowest upper
/// bound by the total span, then take the extremes of the wider axis.
fn pick_seeds<M: Bounded>(members: &[M]) -> (usize, usize) {
    let (sep_x, left_x, right_x) = axis_separation(members, |b| (b.min_x, b.max_x));
    let (sep_y, left_y, right_y) = axis_separation(members, |b| (b.min_y, b.max_y));

    let (left, right) = if sep_x >= sep_y {
        (left_x, right_x)
    } else {
        (left_y, right_y)
    };

    // One member can own both extremes when its interval nests inside all
    // the others; degrade to the same pair the zero-span case uses.
    if left == right {
        (0, 1)
    } else {
        (left, right)
    }
}

/// Normalized separation on one axis, with the indices of the member
/// holding the minimum upper bound (`left`) and the member holding the
/// maximum lower bound (`right`).
fn axis_separation<M: Bounded>(
    members: &[M],
    project: impl Fn(&BoundingBox) -> (f32, f32),
) -> (f32, usize, usize) {
    let mut min_lower = f32::INFINITY;
    let mut max_lower = f32::NEG_INFINITY;
    let mut min_upper = f32::INFINITY;
    let mut max_upper = f32::NEG_INFINITY;
    let mut left = 0;
    let mut right = 0;

    for (i, member) in members.iter().enumerate() {
        let (lower, upper) = project(&member.bounds());
        if lower < min_lower {
            min_lower = lower;
        }
        if lower > max_lower {
            max_lower = lower;
            right = i;
        }
        if upper < min_upper {
            min_upper = upper;
            left = i;
        }
        if upper > max_upper {
            max_upper = upper;
        }
    }

    let span = max_upper - min_lower;
    if span > 0.0 {
        ((max_lower - min_upper) / span, left, right)
    } else {
        (0.0, 0, 1)
    }
}
