//! The tree wrapper: holds the current root, promotes split roots, and
//! re-drives orphan reinsertion after removals.

use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::sync::Arc;

use rand::Rng;

use crate::bounding_box::BoundingBox;
use crate::entry::Entry;
use crate::geometry::Point;
use crate::node::{
    cover_nodes, Entries, EntryDistance, InsertResult, Node, RemoveResult, DEFAULT_MAX_ENTRIES,
};

/// An immutable R-tree over 2D point entries.
///
/// Every update returns a new tree; the old version stays valid and the two
/// share all unchanged subtrees. Queries never block updates and updates
/// never invalidate readers.
///
/// `MAX_ENTRIES` bounds the fan-out of every node. The default of 50 suits
/// general use; small bounds (4 or 8) make tree mechanics visible in tests.
///
/// # Examples
///
/// ```rust
/// use persistent_rtree::{BoundingBox, Entry, Point, RTree};
///
/// let tree: RTree<&str> = RTree::new()
///     .insert(Entry::new(Point::new(0.0, 0.0), "origin"))
///     .insert(Entry::new(Point::new(10.0, 10.0), "far"));
///
/// let hits = tree.search(&BoundingBox::new(-1.0, -1.0, 1.0, 1.0));
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].value, "origin");
/// ```
pub struct RTree<A, const MAX_ENTRIES: usize = DEFAULT_MAX_ENTRIES> {
    root: Arc<Node<A, MAX_ENTRIES>>,
    size: usize,
}

impl<A, const MAX_ENTRIES: usize> Clone for RTree<A, MAX_ENTRIES> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            size: self.size,
        }
    }
}

impl<A: Debug, const MAX_ENTRIES: usize> Debug for RTree<A, MAX_ENTRIES> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTree")
            .field("size", &self.size)
            .field("height", &self.root.height())
            .field("bbox", &self.root.bbox())
            .finish_non_exhaustive()
    }
}

impl<A: Clone + PartialEq, const MAX_ENTRIES: usize> RTree<A, MAX_ENTRIES> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::empty_leaf()),
            size: 0,
        }
    }

    /// Number of entries in the tree.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The root node, exposed for diagnostics and structural checks.
    pub fn root(&self) -> &Node<A, MAX_ENTRIES> {
        &self.root
    }

    /// Returns a new tree with `entry` added.
    pub fn insert(&self, entry: Entry<A>) -> Self {
        self.insert_with(&mut rand::rng(), entry)
    }

    /// [`insert`](Self::insert) with a caller-supplied random generator,
    /// so split tie-breaks can be pinned in tests.
    pub fn insert_with<R: Rng>(&self, rng: &mut R, entry: Entry<A>) -> Self {
        let root = match self.root.insert(entry, rng) {
            InsertResult::Replaced(node) => node,
            InsertResult::Split(nodes) => {
                // The root overflowed; grow the tree by one level.
                let bbox = cover_nodes(&nodes);
                Arc::new(Node::Branch {
                    children: nodes,
                    bbox,
                })
            }
        };
        Self {
            root,
            size: self.size + 1,
        }
    }

    /// Returns a new tree with every entry of `entries` added.
    pub fn insert_all<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = Entry<A>>,
    {
        let mut tree = self.clone();
        for entry in entries {
            tree = tree.insert(entry);
        }
        tree
    }

    /// Returns a new tree with `entry` removed, or an unchanged (shared)
    /// tree when the entry is not present.
    ///
    /// Underflow handling may detach entries; they are reinserted before
    /// this returns, so the result always satisfies the tree invariants.
    pub fn remove(&self, entry: &Entry<A>) -> Self {
        self.remove_with(&mut rand::rng(), entry)
    }

    /// [`remove`](Self::remove) with a caller-supplied random generator.
    pub fn remove_with<R: Rng>(&self, rng: &mut R, entry: &Entry<A>) -> Self {
        match self.root.remove(entry) {
            RemoveResult::NotFound => self.clone(),
            RemoveResult::Removed(orphans, replacement) => {
                let orphan_count = orphans.len();
                debug_assert!(self.size > orphan_count);
                let root =
                    replacement.unwrap_or_else(|| Arc::new(Node::empty_leaf()));
                let mut tree = Self {
                    root,
                    size: self.size - orphan_count - 1,
                };
                for orphan in orphans {
                    tree = tree.insert_with(rng, orphan);
                }
                tree
            }
        }
    }

    /// Every entry whose point lies inside `space` (boundary included).
    /// Non-finite spaces yield nothing.
    pub fn search(&self, space: &BoundingBox) -> Vec<Entry<A>> {
        self.root.search(space)
    }

    /// Number of entries inside `space`, without materializing them.
    pub fn count(&self, space: &BoundingBox) -> usize {
        self.root.count(space)
    }

    /// The closest entry to `pt` with its distance, if the tree is
    /// non-empty.
    pub fn nearest(&self, pt: &Point) -> Option<(f32, Entry<A>)> {
        self.nearest_within(pt, f32::INFINITY)
    }

    /// The closest entry strictly within `radius` of `pt`.
    pub fn nearest_within(&self, pt: &Point, radius: f32) -> Option<(f32, Entry<A>)> {
        self.root.nearest(pt, radius)
    }

    /// The up-to-`k` closest entries to `pt`, ascending by distance.
    pub fn nearest_k(&self, pt: &Point, k: usize) -> Vec<(f32, Entry<A>)> {
        self.nearest_k_within(pt, k, f32::INFINITY)
    }

    /// The up-to-`k` closest entries strictly within `radius` of `pt`,
    /// ascending by distance.
    pub fn nearest_k_within(&self, pt: &Point, k: usize, radius: f32) -> Vec<(f32, Entry<A>)> {
        if k == 0 {
            return Vec::new();
        }
        let mut heap = BinaryHeap::new();
        self.root.nearest_k(pt, k, radius, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|EntryDistance { distance, entry }| (distance, entry))
            .collect()
    }

    /// Whether the tree holds an entry equal to `entry` (same point, same
    /// value).
    pub fn contains(&self, entry: &Entry<A>) -> bool {
        self.search(&entry.pt.to_bbox())
            .iter()
            .any(|candidate| candidate == entry)
    }

    /// Lazy in-order iterator over every entry.
    pub fn iter(&self) -> Entries<'_, A, MAX_ENTRIES> {
        self.root.iter()
    }
}

impl<A: Clone + PartialEq, const MAX_ENTRIES: usize> Default for RTree<A, MAX_ENTRIES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone + PartialEq, const MAX_ENTRIES: usize> FromIterator<Entry<A>>
    for RTree<A, MAX_ENTRIES>
{
    fn from_iter<I: IntoIterator<Item = Entry<A>>>(entries: I) -> Self {
        Self::new().insert_all(entries)
    }
}

impl<A: Clone + PartialEq + Debug, const MAX_ENTRIES: usize> RTree<A, MAX_ENTRIES> {
    /// Multi-line dump of the whole tree for diagnostics.
    pub fn pretty(&self) -> String {
        self.root.pretty()
    }
}
