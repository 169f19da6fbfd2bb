//! DataTree - history of every run the engine has made
//!
//! The tree stores the draws of every run in a radix tree, so that:
//! - runs which behave differently after identical draws are caught as flaky
//! - new runs can be steered away from inputs that were already tried
//!   (novel prefix generation)
//! - the outcome of an input can be predicted without running the test when
//!   it follows a recorded path (`rewrite`, `simulate_test_function`)
//! - the engine can tell when every possible input has been tried
//!
//! Nodes live in an arena owned by the tree and refer to their children by
//! [`NodeId`]. Nodes are only ever added.
//!
//! The tree is mutated by one [`TreeRecordingObserver`] per run. The observer
//! holds the tree mutably, so runs are recorded strictly one after another;
//! a multi-threaded engine has to hold a lock on the tree for a whole run.

pub mod node;
pub mod observer;

pub use node::{Branch, NodeId, Transition, TreeNode};
pub use observer::TreeRecordingObserver;

use log::debug;
use rand::Rng;

use crate::buffer::{read_draw, write_draw};
use crate::data::{mask, value_count, Conclusion, DataObserver, Draw, DrawSource, Status};
use crate::errors::TreeResult;

/// Configuration for a [`DataTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeConfig {
    /// Maximum number of buffer bytes a single run may consume. Buffers are
    /// only rewritten as far as this many bytes.
    pub buffer_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024,
        }
    }
}

/// Statistics about the recorded tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub branch_nodes: usize,
    pub conclusion_nodes: usize,
    pub splits: usize,
    /// Runs concluded with a status other than overrun
    pub recorded_runs: usize,
}

/// What replaying a [`DrawSource`] against the tree found out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Simulation {
    /// Every draw followed recorded history to a conclusion
    Concluded(Conclusion),
    /// After `draws` draws the source left recorded history; the caller
    /// continues drawing normally from here
    Novel { draws: usize },
    /// The source ran out of data after `draws` draws
    Overrun { draws: usize },
}

/// Tracks the tree structure of every run the engine has recorded.
#[derive(Debug)]
pub struct DataTree {
    nodes: Vec<TreeNode>,
    config: TreeConfig,
    stats: TreeStats,
}

impl DataTree {
    /// Create an empty tree for runs of at most `cap` buffer bytes
    pub fn new(cap: usize) -> Self {
        Self::with_config(TreeConfig { buffer_size: cap })
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: vec![TreeNode::new()],
            config,
            stats: TreeStats {
                total_nodes: 1,
                ..TreeStats::default()
            },
        }
    }

    pub fn cap(&self) -> usize {
        self.config.buffer_size
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn stats(&self) -> &TreeStats {
        &self.stats
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Start recording a new run at the root
    pub fn new_observer(&mut self) -> TreeRecordingObserver<'_> {
        TreeRecordingObserver::new(self)
    }

    /// Record a complete run: every draw in order, then its conclusion.
    pub fn record_path(
        &mut self,
        draws: &[Draw],
        status: Status,
        interesting_origin: Option<String>,
    ) -> TreeResult<()> {
        let mut observer = self.new_observer();
        for draw in draws {
            observer.draw_bits(draw.bit_width, draw.forced, draw.value)?;
        }
        observer.conclude_test(status, interesting_origin)
    }

    /// Returns true if every possible run has been recorded to a conclusion,
    /// so the language of inputs is fully explored.
    pub fn is_exhausted(&self) -> bool {
        self.is_node_exhausted(NodeId::ROOT)
    }

    /// Whether every run passing through `id` has been recorded.
    ///
    /// A node is exhausted when all values of its run were forced and it
    /// either concludes, or branches over every value of the branch width
    /// into exhausted children. Exhaustion is cached once reached.
    ///
    /// The subtree is walked with an explicit stack, so the depth of the tree
    /// is bounded by memory only.
    pub fn is_node_exhausted(&self, id: NodeId) -> bool {
        // A branch is pushed back as `expanded` below its children, so it is
        // only popped again once all of them were found exhausted.
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            let node = &self.nodes[current.0];
            if node.cached_exhausted() {
                continue;
            }
            if expanded {
                node.mark_exhausted();
                continue;
            }
            if node.forced.len() < node.values.len() {
                return false;
            }
            match &node.transition {
                Transition::Live => return false,
                Transition::Conclusion(_) => node.mark_exhausted(),
                Transition::Branch(branch) => {
                    if !node.is_saturated() {
                        return false;
                    }
                    stack.push((current, true));
                    stack.extend(branch.children.values().map(|&child| (child, false)));
                }
            }
        }
        true
    }

    /// Generate a short sequence of draws that is not a prefix of any run
    /// recorded so far, or that leads somewhere the tree knows nothing about.
    ///
    /// Returns `None` if the tree is exhausted.
    pub fn generate_novel_prefix<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec<Draw>> {
        if self.is_exhausted() {
            debug!("DataTree: no novel prefix, tree is exhausted");
            return None;
        }

        let mut prefix = Vec::new();
        let mut current = NodeId::ROOT;
        loop {
            let node = &self.nodes[current.0];
            let candidates: Vec<(u64, NodeId)> = match &node.transition {
                Transition::Live => {
                    replay_run(node, node.len(), &mut prefix);
                    break;
                }
                Transition::Branch(branch) => {
                    if !node.is_saturated() {
                        replay_run(node, node.len(), &mut prefix);
                        let n_bits = node.bit_widths[node.len()];
                        prefix.push(Draw::new(n_bits, pick_missing_key(branch, n_bits, rng)));
                        break;
                    }
                    branch
                        .children
                        .iter()
                        .filter(|&(_, &child)| !self.is_node_exhausted(child))
                        .map(|(&key, &child)| (key, child))
                        .collect()
                }
                Transition::Conclusion(_) => Vec::new(),
            };

            if candidates.is_empty() {
                // Nothing left below this node, but it isn't exhausted, so some
                // value in its own run can still vary.
                let i = node.first_unforced()?;
                replay_run(node, i, &mut prefix);
                let n_bits = node.bit_widths[i];
                prefix.push(Draw::new(n_bits, random_other_value(rng, n_bits, node.values[i])));
                break;
            }

            let (key, child) = candidates[rng.gen_range(0..candidates.len())];
            replay_run(node, node.len(), &mut prefix);
            prefix.push(Draw::new(node.bit_widths[node.len()], key));
            current = child;
        }

        debug!(
            "DataTree: generated novel prefix of {} draws from {} nodes",
            prefix.len(),
            self.nodes.len()
        );
        Some(prefix)
    }

    /// Read `buffer` the way a run following recorded history would and return
    /// the rewritten buffer together with the conclusion that run would reach.
    ///
    /// If the conclusion can't be predicted from the tree, the buffer comes
    /// back unchanged with `None`.
    pub fn rewrite(&self, buffer: &[u8]) -> (Vec<u8>, Option<Conclusion>) {
        let visible = &buffer[..buffer.len().min(self.config.buffer_size)];
        match self.predict(visible) {
            Some((rewritten, conclusion)) => (rewritten, Some(conclusion)),
            None => (buffer.to_vec(), None),
        }
    }

    fn predict(&self, buffer: &[u8]) -> Option<(Vec<u8>, Conclusion)> {
        let mut rewritten = Vec::new();
        let mut index = 0;
        let mut current = NodeId::ROOT;
        loop {
            let node = &self.nodes[current.0];
            for (i, (&n_bits, &recorded)) in node.bit_widths.iter().zip(&node.values).enumerate() {
                let (value, used) = read_draw(&buffer[index..], n_bits)?;
                if value != recorded && !node.is_forced(i) {
                    return None;
                }
                index += used;
                write_draw(&mut rewritten, n_bits, recorded);
            }
            match &node.transition {
                Transition::Live => return None,
                Transition::Conclusion(conclusion) => return Some((rewritten, conclusion.clone())),
                Transition::Branch(branch) => {
                    let n_bits = node.bit_widths[node.len()];
                    let (value, used) = read_draw(&buffer[index..], n_bits)?;
                    current = branch.child(value)?;
                    index += used;
                    write_draw(&mut rewritten, n_bits, value);
                }
            }
        }
    }

    /// Feed recorded history into `source` for as long as the source keeps
    /// following it. Forced positions are replayed as forced draws.
    pub fn simulate_test_function<S: DrawSource + ?Sized>(&self, source: &mut S) -> Simulation {
        let mut draws = 0;
        let mut current = NodeId::ROOT;
        loop {
            let node = &self.nodes[current.0];
            for (i, (&n_bits, &recorded)) in node.bit_widths.iter().zip(&node.values).enumerate() {
                let forced = if node.is_forced(i) { Some(recorded) } else { None };
                let value = match source.draw_bits(n_bits, forced) {
                    Some(value) => value,
                    None => return Simulation::Overrun { draws },
                };
                draws += 1;
                if value != recorded {
                    return Simulation::Novel { draws };
                }
            }
            match &node.transition {
                Transition::Live => return Simulation::Novel { draws },
                Transition::Conclusion(conclusion) => {
                    return Simulation::Concluded(conclusion.clone())
                }
                Transition::Branch(branch) => {
                    let n_bits = node.bit_widths[node.len()];
                    let value = match source.draw_bits(n_bits, None) {
                        Some(value) => value,
                        None => return Simulation::Overrun { draws },
                    };
                    draws += 1;
                    match branch.child(value) {
                        Some(child) => current = child,
                        None => return Simulation::Novel { draws },
                    }
                }
            }
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Split the run of `id` after position `i`, moving the suffix into a new child.
    pub(crate) fn split(&mut self, id: NodeId, i: usize) -> NodeId {
        let child_id = NodeId(self.nodes.len());
        let child = self.nodes[id.0].split_at(i, child_id);
        self.nodes.push(child);
        self.stats.total_nodes += 1;
        self.stats.branch_nodes += 1;
        self.stats.splits += 1;
        debug!(
            "DataTree: split node {} at {}, suffix moved to node {}",
            id.0, i, child_id.0
        );
        child_id
    }

    /// Add a fresh live child under `parent` for `value`. `parent` must
    /// already be a branch point.
    pub(crate) fn insert_child(&mut self, parent: NodeId, value: u64) -> NodeId {
        let child_id = NodeId(self.nodes.len());
        match &mut self.nodes[parent.0].transition {
            Transition::Branch(branch) => {
                branch.children.insert(value, child_id);
            }
            Transition::Live | Transition::Conclusion(_) => {
                unreachable!("children are only added below branch points")
            }
        }
        self.nodes.push(TreeNode::new());
        self.stats.total_nodes += 1;
        debug!(
            "DataTree: new child {} under node {} for value {}",
            child_id.0, parent.0, value
        );
        child_id
    }

    pub(crate) fn conclude(&mut self, id: NodeId, conclusion: Conclusion) {
        debug!("DataTree: node {} concludes as {}", id.0, conclusion);
        self.nodes[id.0].transition = Transition::Conclusion(conclusion);
        self.stats.conclusion_nodes += 1;
        self.stats.recorded_runs += 1;
    }

    pub(crate) fn note_replayed_run(&mut self) {
        self.stats.recorded_runs += 1;
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::with_config(TreeConfig::default())
    }
}

/// Append the first `upto` draws of `node`'s run to `prefix`.
fn replay_run(node: &TreeNode, upto: usize, prefix: &mut Vec<Draw>) {
    prefix.extend((0..upto).map(|i| Draw {
        bit_width: node.bit_widths[i],
        forced: node.is_forced(i),
        value: node.values[i],
    }));
}

/// Uniformly pick a value of `n_bits` bits with no child in `branch`.
/// The branch must not be saturated.
fn pick_missing_key<R: Rng + ?Sized>(branch: &Branch, n_bits: u32, rng: &mut R) -> u64 {
    if value_count(n_bits) <= 2 * branch.len() as u128 {
        let missing: Vec<u64> = (0..=mask(n_bits))
            .filter(|key| !branch.children.contains_key(key))
            .collect();
        return missing[rng.gen_range(0..missing.len())];
    }
    loop {
        let key = rng.gen::<u64>() & mask(n_bits);
        if !branch.children.contains_key(&key) {
            return key;
        }
    }
}

/// Uniformly pick a value of `n_bits` bits other than `avoid`.
fn random_other_value<R: Rng + ?Sized>(rng: &mut R, n_bits: u32, avoid: u64) -> u64 {
    let value = rng.gen_range(0..mask(n_bits));
    if value >= avoid {
        value + 1
    } else {
        value
    }
}
