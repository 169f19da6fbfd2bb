//! # Conjecture DataTree
//!
//! The choice-history tree of a Hypothesis-style test case generator.
//!
//! Every run of the test function makes a sequence of bit-width-tagged draws
//! and then concludes. Recording those runs in a [`DataTree`] lets the engine
//! notice flaky data generation, steer new runs toward untried inputs, predict
//! outcomes it has already seen, and stop once every input has been tried.
//!
//! ```
//! use conjecture_datatree::{DataObserver, DataTree, Status};
//!
//! let mut tree = DataTree::new(8 * 1024);
//! let mut observer = tree.new_observer();
//! observer.draw_bits(8, false, 3).unwrap();
//! observer.conclude_test(Status::Valid, None).unwrap();
//!
//! assert_eq!(tree.rewrite(&[3]).1.map(|c| c.status), Some(Status::Valid));
//! ```

pub mod buffer;
pub mod data;
pub mod datatree;
pub mod errors;

// Re-export core types for easy access
pub use buffer::{encode_draws, BufferSource};
pub use data::{Conclusion, DataObserver, Draw, DrawSource, Status};
pub use datatree::{
    Branch, DataTree, NodeId, Simulation, Transition, TreeConfig, TreeNode,
    TreeRecordingObserver, TreeStats,
};
pub use errors::{FlakyError, TreeResult};
