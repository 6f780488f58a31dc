//! The recursive node algebra: leaves of entries, branches of shared
//! subtrees, and the insert/remove/query algorithms over them.
//!
//! Nodes are immutable. Insert and remove build replacement nodes along the
//! affected path and reference every untouched subtree through its existing
//! [`Arc`], so old tree versions keep working unchanged and new versions
//! share all unmodified structure with them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::Arc;

use rand::Rng;
use smallvec::SmallVec;

use crate::bounding_box::BoundingBox;
use crate::entry::Entry;
use crate::geometry::Point;
use crate::joined::Joined;
use crate::split;

/// Default upper bound on a node's child count.
///
/// Splitting triggers strictly above this, so a freshly split pair holds
/// `DEFAULT_MAX_ENTRIES + 1` members between the two nodes.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// A tree node: either a leaf of entries or a branch of child nodes.
///
/// Invariants, maintained by every operation:
/// - `bbox` is the minimum covering box of the children (entry points for a
///   leaf, child boxes for a branch); the empty leaf carries
///   [`BoundingBox::EMPTY`].
/// - a branch always has at least one child, and never more than
///   `MAX_ENTRIES` children; only the root leaf may be empty.
#[derive(Debug, Clone)]
pub enum Node<A, const MAX_ENTRIES: usize = DEFAULT_MAX_ENTRIES> {
    Branch {
        children: Vec<Arc<Node<A, MAX_ENTRIES>>>,
        bbox: BoundingBox,
    },
    Leaf {
        children: Vec<Entry<A>>,
        bbox: BoundingBox,
    },
}

/// Outcome of inserting into a node.
#[derive(Debug)]
pub enum InsertResult<A, const MAX_ENTRIES: usize = DEFAULT_MAX_ENTRIES> {
    /// A single node of the same kind replaces the receiver.
    Replaced(Arc<Node<A, MAX_ENTRIES>>),
    /// The receiver overflowed; these siblings jointly replace it.
    Split(Vec<Arc<Node<A, MAX_ENTRIES>>>),
}

/// Outcome of removing an entry from a node.
#[derive(Debug)]
pub enum RemoveResult<A, const MAX_ENTRIES: usize = DEFAULT_MAX_ENTRIES> {
    /// The entry is not present in this subtree.
    NotFound,
    /// The entry was removed. The orphans are entries detached by underflow
    /// handling; the caller must reinsert them. `None` means the receiver
    /// dissolved entirely and its parent must drop it.
    Removed(Joined<Entry<A>>, Option<Arc<Node<A, MAX_ENTRIES>>>),
}

impl<A, const MAX_ENTRIES: usize> Node<A, MAX_ENTRIES> {
    /// The empty leaf, used as the root of an empty tree.
    pub fn empty_leaf() -> Self {
        Node::Leaf {
            children: Vec::new(),
            bbox: BoundingBox::EMPTY,
        }
    }

    /// The minimum covering box of this subtree.
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Node::Branch { bbox, .. } => *bbox,
            Node::Leaf { bbox, .. } => *bbox,
        }
    }

    /// Number of levels below and including this node. A leaf has height 1.
    pub fn height(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Branch { children, .. } => {
                1 + children.first().map_or(0, |child| child.height())
            }
        }
    }

    /// Total number of entries in this subtree.
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf { children, .. } => children.len(),
            Node::Branch { children, .. } => children.iter().map(|child| child.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Leaf { children, .. } => children.is_empty(),
            Node::Branch { .. } => false,
        }
    }

    /// Lazy in-order traversal over every entry in this subtree.
    ///
    /// Restartable: calling it again walks the subtree from the beginning.
    pub fn iter(&self) -> Entries<'_, A, MAX_ENTRIES> {
        let mut stack = SmallVec::new();
        stack.push(self);
        Entries {
            stack,
            leaf: Default::default(),
        }
    }

    /// Number of entries whose point lies inside `space`.
    ///
    /// Same pruning as [`search`](Self::search) without materializing the
    /// entries. Non-finite spaces count zero.
    pub fn count(&self, space: &BoundingBox) -> usize {
        if !space.is_finite() {
            return 0;
        }
        self.count_within(space)
    }

    fn count_within(&self, space: &BoundingBox) -> usize {
        match self {
            Node::Leaf { children, .. } => children
                .iter()
                .filter(|entry| space.contains_point(&entry.pt))
                .count(),
            Node::Branch { children, .. } => children
                .iter()
                .filter(|child| space.intersects(&child.bbox()))
                .map(|child| child.count_within(space))
                .sum(),
        }
    }
}

impl<A: Clone, const MAX_ENTRIES: usize> Node<A, MAX_ENTRIES> {
    /// Every entry at or below this node, materialized left to right.
    pub fn entries(&self) -> Vec<Entry<A>> {
        self.iter().cloned().collect()
    }

    /// Every entry whose point lies inside `space` (boundary included), in
    /// traversal order. Non-finite spaces yield nothing.
    pub fn search(&self, space: &BoundingBox) -> Vec<Entry<A>> {
        let mut out = Vec::new();
        if space.is_finite() {
            self.search_into(space, &mut out);
        }
        out
    }

    fn search_into(&self, space: &BoundingBox, out: &mut Vec<Entry<A>>) {
        match self {
            Node::Leaf { children, .. } => {
                for entry in children {
                    if space.contains_point(&entry.pt) {
                        out.push(entry.clone());
                    }
                }
            }
            Node::Branch { children, .. } => {
                for child in children {
                    if space.intersects(&child.bbox()) {
                        child.search_into(space, out);
                    }
                }
            }
        }
    }

    /// The closest entry strictly within distance `d0` of `pt`, with its
    /// distance. `None` when no entry qualifies.
    ///
    /// Branches are visited best-first by box distance; the scan stops at
    /// the first child whose box cannot beat the running minimum.
    pub fn nearest(&self, pt: &Point, d0: f32) -> Option<(f32, Entry<A>)> {
        let mut dist = d0;
        let mut best = None;
        match self {
            Node::Leaf { children, .. } => {
                for entry in children {
                    let d = entry.pt.distance(pt);
                    if d < dist {
                        dist = d;
                        best = Some((d, entry.clone()));
                    }
                }
            }
            Node::Branch { children, .. } => {
                for (box_dist, child) in by_box_distance(children, pt) {
                    if box_dist >= dist {
                        break;
                    }
                    if let Some((d, entry)) = child.nearest(pt, dist) {
                        dist = d;
                        best = Some((d, entry));
                    }
                }
            }
        }
        best
    }

    /// Accumulates the up-to-`k` closest entries strictly within `d0` of
    /// `pt` into `heap`, and returns the final pruning distance.
    ///
    /// The heap keeps its worst element on top. While it holds fewer than
    /// `k` entries the pruning distance stays at `d0`; each overflow pops
    /// the worst element and tightens the bound to its distance.
    pub fn nearest_k(
        &self,
        pt: &Point,
        k: usize,
        d0: f32,
        heap: &mut BinaryHeap<EntryDistance<A>>,
    ) -> f32 {
        let mut dist = d0;
        match self {
            Node::Leaf { children, .. } => {
                for entry in children {
                    let d = entry.pt.distance(pt);
                    if d < dist {
                        heap.push(EntryDistance {
                            distance: d,
                            entry: entry.clone(),
                        });
                        if heap.len() > k {
                            if let Some(worst) = heap.pop() {
                                dist = worst.distance;
                            }
                        }
                    }
                }
            }
            Node::Branch { children, .. } => {
                for (box_dist, child) in by_box_distance(children, pt) {
                    if box_dist >= dist {
                        break;
                    }
                    dist = child.nearest_k(pt, k, dist, heap);
                }
            }
        }
        dist
    }

    /// Inserts `entry` into this subtree, yielding either a replacement
    /// node or a split pair for the parent to absorb.
    ///
    /// Descent always follows the child whose box grows least to cover the
    /// new point, lowest index winning ties. `rng` only breaks exact ties
    /// in the split heuristic.
    pub fn insert<R: Rng>(&self, entry: Entry<A>, rng: &mut R) -> InsertResult<A, MAX_ENTRIES> {
        match self {
            Node::Leaf { children, bbox } => {
                let pt_bbox = entry.pt.to_bbox();
                let mut next = children.clone();
                next.push(entry);
                if next.len() <= MAX_ENTRIES {
                    InsertResult::Replaced(Arc::new(Node::Leaf {
                        bbox: bbox.expand(&pt_bbox),
                        children: next,
                    }))
                } else {
                    log::trace!("splitting leaf of {} entries", next.len());
                    let ((group1, bbox1), (group2, bbox2)) = split::split(next, rng);
                    InsertResult::Split(vec![
                        Arc::new(Node::Leaf {
                            children: group1,
                            bbox: bbox1,
                        }),
                        Arc::new(Node::Leaf {
                            children: group2,
                            bbox: bbox2,
                        }),
                    ])
                }
            }
            Node::Branch { children, bbox } => {
                debug_assert!(!children.is_empty(), "branch without children");
                let pt_bbox = entry.pt.to_bbox();
                let mut best = 0;
                let mut best_growth = f32::INFINITY;
                for (i, child) in children.iter().enumerate() {
                    let growth = child.bbox().expand_area(&pt_bbox);
                    if growth < best_growth {
                        best_growth = growth;
                        best = i;
                    }
                }

                match children[best].insert(entry, rng) {
                    InsertResult::Replaced(node) => {
                        // The replacement may cover more than the new point.
                        let next_bbox = bbox.expand(&node.bbox());
                        let mut next = children.clone();
                        next[best] = node;
                        InsertResult::Replaced(Arc::new(Node::Branch {
                            children: next,
                            bbox: next_bbox,
                        }))
                    }
                    InsertResult::Split(nodes) => {
                        let mut next_bbox = *bbox;
                        for node in &nodes {
                            next_bbox = next_bbox.expand(&node.bbox());
                        }
                        let mut next = children.clone();
                        next.remove(best);
                        next.extend(nodes);
                        if next.len() <= MAX_ENTRIES {
                            InsertResult::Replaced(Arc::new(Node::Branch {
                                children: next,
                                bbox: next_bbox,
                            }))
                        } else {
                            log::trace!("splitting branch of {} children", next.len());
                            let ((group1, bbox1), (group2, bbox2)) = split::split(next, rng);
                            InsertResult::Split(vec![
                                Arc::new(Node::Branch {
                                    children: group1,
                                    bbox: bbox1,
                                }),
                                Arc::new(Node::Branch {
                                    children: group2,
                                    bbox: bbox2,
                                }),
                            ])
                        }
                    }
                }
            }
        }
    }
}

impl<A: Clone + PartialEq, const MAX_ENTRIES: usize> Node<A, MAX_ENTRIES> {
    /// Removes `entry` from this subtree.
    ///
    /// Nodes that would underflow dissolve instead of rebalancing: a leaf
    /// keeps at least two entries, a branch at least two children, and
    /// anything detached in the process comes back as orphans for the
    /// caller to reinsert.
    pub fn remove(&self, entry: &Entry<A>) -> RemoveResult<A, MAX_ENTRIES> {
        match self {
            Node::Leaf { children, bbox } => {
                if !bbox.contains_point(&entry.pt) {
                    return RemoveResult::NotFound;
                }
                let Some(i) = children.iter().position(|candidate| candidate == entry) else {
                    return RemoveResult::NotFound;
                };
                match children.len() {
                    1 => RemoveResult::Removed(Joined::empty(), None),
                    2 => {
                        // Too small to keep: the survivor goes back through
                        // insertion rather than living in a one-entry leaf.
                        let survivor = children[1 - i].clone();
                        RemoveResult::Removed(Joined::singleton(survivor), None)
                    }
                    _ => {
                        let mut next = children.clone();
                        next.remove(i);
                        let next_bbox = contract(*bbox, &entry.pt.to_bbox(), || {
                            cover_entries(&next)
                        });
                        RemoveResult::Removed(
                            Joined::empty(),
                            Some(Arc::new(Node::Leaf {
                                children: next,
                                bbox: next_bbox,
                            })),
                        )
                    }
                }
            }
            Node::Branch { children, bbox } => {
                if !bbox.contains_point(&entry.pt) {
                    return RemoveResult::NotFound;
                }
                for (i, child) in children.iter().enumerate() {
                    match child.remove(entry) {
                        RemoveResult::NotFound => continue,
                        RemoveResult::Removed(orphans, None) => {
                            return match children.len() {
                                1 => RemoveResult::Removed(orphans, None),
                                2 => {
                                    // A one-child branch is never kept; the
                                    // sibling's subtree dissolves into
                                    // orphans with it.
                                    let sibling = Joined::wrap(children[1 - i].entries());
                                    log::debug!(
                                        "dissolving two-child branch, {} entries to reinsert",
                                        sibling.len()
                                    );
                                    RemoveResult::Removed(sibling.concat(orphans), None)
                                }
                                _ => {
                                    let gone = child.bbox();
                                    let mut next = children.clone();
                                    next.remove(i);
                                    let next_bbox =
                                        contract(*bbox, &gone, || cover_nodes(&next));
                                    RemoveResult::Removed(
                                        orphans,
                                        Some(Arc::new(Node::Branch {
                                            children: next,
                                            bbox: next_bbox,
                                        })),
                                    )
                                }
                            };
                        }
                        RemoveResult::Removed(orphans, Some(replacement)) => {
                            let gone = child.bbox();
                            let mut next = children.clone();
                            next[i] = replacement;
                            let next_bbox = contract(*bbox, &gone, || cover_nodes(&next));
                            return RemoveResult::Removed(
                                orphans,
                                Some(Arc::new(Node::Branch {
                                    children: next,
                                    bbox: next_bbox,
                                })),
                            );
                        }
                    }
                }
                RemoveResult::NotFound
            }
        }
    }
}

impl<A: Debug, const MAX_ENTRIES: usize> Node<A, MAX_ENTRIES> {
    /// Multi-line dump of the subtree for diagnostics.
    pub fn pretty(&self) -> String {
        use std::fmt::Write;

        fn walk<A: Debug, const M: usize>(node: &Node<A, M>, depth: usize, out: &mut String) {
            let pad = "  ".repeat(depth);
            match node {
                Node::Branch { children, bbox } => {
                    let _ = writeln!(out, "{pad}Branch {bbox}");
                    for child in children {
                        walk(child, depth + 1, out);
                    }
                }
                Node::Leaf { children, bbox } => {
                    let _ = writeln!(out, "{pad}Leaf {bbox}");
                    for entry in children {
                        let _ = writeln!(out, "{pad}  Entry {} {:?}", entry.pt, entry.value);
                    }
                }
            }
        }

        let mut out = String::new();
        walk(self, 0, &mut out);
        out
    }
}

/// Keeps `bbox` when the removed geometry was strictly interior to it, so
/// the O(n) cover recomputation only runs when the cover can actually
/// shrink.
fn contract(
    bbox: BoundingBox,
    gone: &BoundingBox,
    regen: impl FnOnce() -> BoundingBox,
) -> BoundingBox {
    if bbox.wraps(gone) {
        bbox
    } else {
        regen()
    }
}

fn cover_entries<A>(entries: &[Entry<A>]) -> BoundingBox {
    entries
        .iter()
        .fold(BoundingBox::EMPTY, |bbox, entry| {
            bbox.expand(&entry.pt.to_bbox())
        })
}

pub(crate) fn cover_nodes<A, const MAX_ENTRIES: usize>(
    nodes: &[Arc<Node<A, MAX_ENTRIES>>],
) -> BoundingBox {
    nodes
        .iter()
        .fold(BoundingBox::EMPTY, |bbox, node| bbox.expand(&node.bbox()))
}

/// Children of a branch paired with their box distance to `pt`, ascending.
fn by_box_distance<'a, A, const MAX_ENTRIES: usize>(
    children: &'a [Arc<Node<A, MAX_ENTRIES>>],
    pt: &Point,
) -> Vec<(f32, &'a Arc<Node<A, MAX_ENTRIES>>)> {
    let mut candidates: Vec<_> = children
        .iter()
        .map(|child| (child.bbox().distance(pt), child))
        .collect();
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    candidates
}

/// Lazy in-order entry traversal, produced by [`Node::iter`].
pub struct Entries<'a, A, const MAX_ENTRIES: usize = DEFAULT_MAX_ENTRIES> {
    stack: SmallVec<[&'a Node<A, MAX_ENTRIES>; 8]>,
    leaf: std::slice::Iter<'a, Entry<A>>,
}

impl<'a, A, const MAX_ENTRIES: usize> Iterator for Entries<'a, A, MAX_ENTRIES> {
    type Item = &'a Entry<A>;

    fn next(&mut self) -> Option<&'a Entry<A>> {
        loop {
            if let Some(entry) = self.leaf.next() {
                return Some(entry);
            }
            match self.stack.pop()? {
                Node::Leaf { children, .. } => self.leaf = children.iter(),
                Node::Branch { children, .. } => {
                    for child in children.iter().rev() {
                        self.stack.push(child.as_ref());
                    }
                }
            }
        }
    }
}

/// Max-heap element for k-nearest queries: the entry with the largest
/// distance sits on top, ready to be evicted when the heap overflows.
#[derive(Debug, Clone)]
pub struct EntryDistance<A> {
    pub distance: f32,
    pub entry: Entry<A>,
}

impl<A> PartialEq for EntryDistance<A> {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl<A> Eq for EntryDistance<A> {}

impl<A> PartialOrd for EntryDistance<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for EntryDistance<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}
