//! # Persistent R-Tree - Immutable Spatial Indexing for 2D Points
//!
//! This crate provides an in-memory R-tree over 2D point entries with
//! persistent (structurally shared) updates: insert and remove return a new
//! tree version and never touch the old one, so any number of readers can
//! keep traversing earlier versions without coordination.
//!
//! ## Features
//!
//! - **Immutable Updates**: insert/remove build a new path to the root and
//!   share every untouched subtree with prior versions
//! - **Range Search**: all entries inside a query box, boundary included
//! - **Counting**: range cardinality without materializing entries
//! - **Nearest Neighbor**: single closest entry with best-first pruning
//! - **K-Nearest**: top-k closest entries via a bounded max-heap
//! - **Linear-Seed Splitting**: overfull nodes split along the most
//!   separated axis, keeping sibling boxes compact
//! - **Deferred Rebalancing**: removals dissolve underfull nodes and
//!   reinsert their entries instead of rebalancing in place
//!
//! ## Quick Start
//!
//! ```rust
//! use persistent_rtree::{BoundingBox, Entry, Point, RTree};
//!
//! let tree: RTree<&str> = RTree::new()
//!     .insert(Entry::new(Point::new(2.0, 3.0), "library"))
//!     .insert(Entry::new(Point::new(40.0, 1.0), "harbor"))
//!     .insert(Entry::new(Point::new(41.0, 2.0), "lighthouse"));
//!
//! // Range search around the harbor.
//! let found = tree.search(&BoundingBox::new(39.0, 0.0, 42.0, 3.0));
//! assert_eq!(found.len(), 2);
//!
//! // Closest entry to a query point.
//! let (dist, entry) = tree.nearest(&Point::new(2.0, 4.0)).unwrap();
//! assert_eq!(entry.value, "library");
//! assert_eq!(dist, 1.0);
//!
//! // Updates leave earlier versions intact.
//! let smaller = tree.remove(&Entry::new(Point::new(2.0, 3.0), "library"));
//! assert_eq!(smaller.size(), 2);
//! assert_eq!(tree.size(), 3);
//! ```

pub mod bounding_box;
pub mod entry;
pub mod geometry;
pub mod joined;
pub mod node;
pub mod rtree;

mod split;

pub use bounding_box::BoundingBox;
pub use entry::Entry;
pub use geometry::Point;
pub use joined::Joined;
pub use node::{Entries, EntryDistance, InsertResult, Node, RemoveResult, DEFAULT_MAX_ENTRIES};
pub use rtree::RTree;
