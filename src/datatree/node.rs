//! Tree nodes: compressed runs of draws and how they connect to the rest of the tree.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};

use crate::data::{value_count, Conclusion};

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// How a node's run continues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing is known past the end of the run yet
    Live,
    /// Runs have disagreed on the draw right after this run
    Branch(Branch),
    /// Runs that reach the end of this run stop here
    Conclusion(Conclusion),
}

impl Transition {
    pub fn is_live(&self) -> bool {
        matches!(self, Transition::Live)
    }
}

/// Children of a branch point, keyed by the value of the discriminating draw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Branch {
    pub children: BTreeMap<u64, NodeId>,
}

impl Branch {
    pub fn child(&self, value: u64) -> Option<NodeId> {
        self.children.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }
}

/// Radix tree node storing a maximal straight-line run of draws.
///
/// `bit_widths` and `values` are parallel. A branch node carries one extra
/// width: the width of the draw whose value selects the child.
#[derive(Debug)]
pub struct TreeNode {
    pub bit_widths: Vec<u32>,
    pub values: Vec<u64>,
    /// Positions in the run whose value was forced by the harness
    pub forced: HashSet<usize>,
    pub transition: Transition,
    exhausted: Cell<bool>,
}

impl TreeNode {
    pub fn new() -> Self {
        Self {
            bit_widths: Vec::new(),
            values: Vec::new(),
            forced: HashSet::new(),
            transition: Transition::Live,
            exhausted: Cell::new(false),
        }
    }

    /// Number of draws whose value is part of this run
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_forced(&self, i: usize) -> bool {
        self.forced.contains(&i)
    }

    /// Width of the draw that selects a child, if this node is a branch point
    pub fn branch_bit_width(&self) -> Option<u32> {
        match self.transition {
            Transition::Branch(_) => self.bit_widths.last().copied(),
            Transition::Live | Transition::Conclusion(_) => None,
        }
    }

    /// Whether every value a branch at this node could take already has a child
    pub fn is_saturated(&self) -> bool {
        match (&self.transition, self.bit_widths.last()) {
            (Transition::Branch(branch), Some(&n_bits)) => {
                branch.len() as u128 >= value_count(n_bits)
            }
            _ => false,
        }
    }

    /// First position in the run that was not forced
    pub fn first_unforced(&self) -> Option<usize> {
        (0..self.values.len()).find(|i| !self.forced.contains(i))
    }

    pub(crate) fn cached_exhausted(&self) -> bool {
        self.exhausted.get()
    }

    pub(crate) fn mark_exhausted(&self) {
        self.exhausted.set(true);
    }

    /// Split the run after position `i`.
    ///
    /// Returns the new child holding `bit_widths[i + 1..]`, `values[i + 1..]`
    /// and the old transition. This node keeps `bit_widths[..=i]` and
    /// `values[..i]` and becomes a branch whose only child, keyed by the old
    /// `values[i]`, is `child_id`. The caller places the child at `child_id`.
    pub fn split_at(&mut self, i: usize, child_id: NodeId) -> TreeNode {
        assert!(
            i < self.values.len(),
            "split position {} outside run of {} values",
            i,
            self.values.len()
        );

        let mut child = TreeNode::new();
        child.bit_widths = self.bit_widths.split_off(i + 1);
        child.values = self.values.split_off(i + 1);
        let key = self.values.pop().unwrap_or_default();
        debug_assert_eq!(self.values.len(), i);
        debug_assert_eq!(self.bit_widths.len(), i + 1);

        let (kept, moved): (HashSet<usize>, HashSet<usize>) =
            self.forced.drain().filter(|&f| f != i).partition(|&f| f < i);
        self.forced = kept;
        child.forced = moved.into_iter().map(|f| f - (i + 1)).collect();

        let mut branch = Branch::default();
        branch.children.insert(key, child_id);
        child.transition = std::mem::replace(&mut self.transition, Transition::Branch(branch));
        child.exhausted.set(self.exhausted.replace(false));

        child
    }
}

impl Default for TreeNode {
    fn default() -> Self {
        Self::new()
    }
}
