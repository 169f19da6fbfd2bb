//! Recording a single run into the tree.

use log::{debug, trace};

use super::{DataTree, NodeId, Transition};
use crate::data::{mask, Conclusion, DataObserver, Status};
use crate::errors::FlakyError;

/// Observer that records the draws of one run into a [`DataTree`] and checks
/// them against what earlier runs did.
///
/// Holds the tree mutably for the duration of the run. Feed it every draw in
/// order and then a single conclusion; drop it afterwards.
#[derive(Debug)]
pub struct TreeRecordingObserver<'a> {
    tree: &'a mut DataTree,
    current_node: NodeId,
    index_in_current_node: usize,
    draw_count: usize,
}

impl<'a> TreeRecordingObserver<'a> {
    pub fn new(tree: &'a mut DataTree) -> Self {
        Self {
            tree,
            current_node: NodeId::ROOT,
            index_in_current_node: 0,
            draw_count: 0,
        }
    }

    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    pub fn index_in_current_node(&self) -> usize {
        self.index_in_current_node
    }

    /// Draws observed so far in this run
    pub fn draw_count(&self) -> usize {
        self.draw_count
    }

    fn descend(&mut self, child: NodeId) {
        self.current_node = child;
        self.index_in_current_node = 0;
    }
}

fn inconsistent(error: FlakyError) -> FlakyError {
    debug!("DataTree: flaky run detected: {}", error);
    error
}

impl<'a> DataObserver for TreeRecordingObserver<'a> {
    fn draw_bits(&mut self, n_bits: u32, forced: bool, value: u64) -> Result<(), FlakyError> {
        debug_assert!(
            (1..=64).contains(&n_bits),
            "draws must be between 1 and 64 bits, got {}",
            n_bits
        );
        debug_assert!(value <= mask(n_bits), "{} does not fit in {} bits", value, n_bits);

        let i = self.index_in_current_node;
        let draw = self.draw_count;
        self.index_in_current_node += 1;
        self.draw_count += 1;
        let id = self.current_node;
        trace!("DataTree: draw {} = {} ({} bits) at node {}[{}]", draw, value, n_bits, id.0, i);

        let node = self.tree.node_mut(id);
        if i < node.bit_widths.len() {
            let expected = node.bit_widths[i];
            if expected != n_bits {
                return Err(inconsistent(FlakyError::BitWidthMismatch {
                    draw,
                    expected,
                    actual: n_bits,
                }));
            }
        } else {
            match &node.transition {
                Transition::Live => {}
                Transition::Conclusion(previous) => {
                    return Err(inconsistent(FlakyError::DrewPastConclusion {
                        draw,
                        previous: previous.clone(),
                    }));
                }
                Transition::Branch(_) => {
                    unreachable!("branch nodes record the width of their discriminating draw")
                }
            }
            node.bit_widths.push(n_bits);
        }

        if i < node.values.len() {
            let previous = node.values[i];
            if previous != value {
                self.tree.split(id, i);
                let child = self.tree.insert_child(id, value);
                self.descend(child);
            }
            return Ok(());
        }

        let existing = match &node.transition {
            Transition::Live => {
                node.values.push(value);
                if forced {
                    node.forced.insert(i);
                }
                return Ok(());
            }
            Transition::Branch(branch) => branch.child(value),
            Transition::Conclusion(previous) => {
                return Err(inconsistent(FlakyError::DrewPastConclusion {
                    draw,
                    previous: previous.clone(),
                }));
            }
        };
        let child = match existing {
            Some(child) => child,
            None => self.tree.insert_child(id, value),
        };
        self.descend(child);
        Ok(())
    }

    /// Says that the run ended with `status` at the current position, updating
    /// the tree if this is new and checking it against earlier runs otherwise.
    fn conclude_test(
        &mut self,
        status: Status,
        interesting_origin: Option<String>,
    ) -> Result<(), FlakyError> {
        if status == Status::Overrun {
            trace!("DataTree: overrun after {} draws, nothing recorded", self.draw_count);
            return Ok(());
        }
        let current = Conclusion::new(status, interesting_origin);
        let id = self.current_node;
        let node = self.tree.node(id);

        if self.index_in_current_node < node.values.len() {
            return Err(inconsistent(FlakyError::EndedEarly {
                draws: self.draw_count,
            }));
        }
        match &node.transition {
            Transition::Branch(_) => Err(inconsistent(FlakyError::EndedEarly {
                draws: self.draw_count,
            })),
            Transition::Conclusion(previous) => {
                if !previous.is_consistent_with(&current) {
                    return Err(inconsistent(FlakyError::InconsistentConclusion {
                        previous: previous.clone(),
                        current,
                    }));
                }
                self.tree.note_replayed_run();
                Ok(())
            }
            Transition::Live => {
                self.tree.conclude(id, current);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_tracks_position() {
        let mut tree = DataTree::default();
        let mut observer = tree.new_observer();
        observer.draw_bits(8, false, 1).unwrap();
        observer.draw_bits(8, false, 2).unwrap();

        assert_eq!(observer.current_node(), NodeId::ROOT);
        assert_eq!(observer.index_in_current_node(), 2);
        assert_eq!(observer.draw_count(), 2);
    }

    #[test]
    fn test_divergence_moves_to_new_child() {
        let mut tree = DataTree::default();
        tree.record_path(&[crate::data::Draw::new(8, 1)], Status::Valid, None)
            .unwrap();

        let mut observer = tree.new_observer();
        observer.draw_bits(8, false, 2).unwrap();
        assert_ne!(observer.current_node(), NodeId::ROOT);
        assert_eq!(observer.index_in_current_node(), 0);
        observer.conclude_test(Status::Invalid, None).unwrap();

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.stats().splits, 1);
    }

    #[test]
    fn test_forced_value_change_splits() {
        let mut tree = DataTree::default();
        tree.record_path(&[crate::data::Draw::forced(8, 3)], Status::Valid, None)
            .unwrap();
        assert!(tree.is_exhausted());

        let mut observer = tree.new_observer();
        observer.draw_bits(8, false, 5).unwrap();
        assert_ne!(observer.current_node(), NodeId::ROOT);
        observer.conclude_test(Status::Invalid, None).unwrap();

        let root = tree.node(NodeId::ROOT);
        assert!(root.forced.is_empty());
        match &root.transition {
            Transition::Branch(branch) => {
                assert_eq!(branch.children.keys().copied().collect::<Vec<_>>(), vec![3, 5]);
            }
            other => panic!("expected a branch, got {:?}", other),
        }
        assert_eq!(tree.stats().splits, 1);
        assert!(!tree.is_exhausted());
    }

    #[test]
    fn test_stopping_at_branch_point_is_flaky() {
        let mut tree = DataTree::default();
        tree.record_path(&[crate::data::Draw::new(1, 0)], Status::Valid, None)
            .unwrap();
        tree.record_path(&[crate::data::Draw::new(1, 1)], Status::Valid, None)
            .unwrap();

        let mut observer = tree.new_observer();
        let err = observer.conclude_test(Status::Valid, None).unwrap_err();
        assert_eq!(err, FlakyError::EndedEarly { draws: 0 });
    }
}
