//! The indexed payload: a point paired with a user value.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// An indivisible (point, value) pair stored in the tree's leaves.
///
/// Entries are immutable. Two entries are equal when both the coordinates
/// and the value are equal; removal and existence tests rely on this, so
/// `A`'s equality must be reflexive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<A> {
    pub pt: Point,
    pub value: A,
}

impl<A> Entry<A> {
    /// Creates an entry indexing `value` at `pt`.
    pub fn new(pt: Point, value: A) -> Self {
        Self { pt, value }
    }
}
