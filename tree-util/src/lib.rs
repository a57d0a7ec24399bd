//! Rooted phylogenetic trees for trait likelihood evaluation.
//!
//! The tree is loaded once per analysis and then shared read-only by
//! every kernel in `trait-model`.

pub mod common_io;
pub mod error;
pub mod tree;
pub mod tree_io;

pub use error::TreeError;
pub use tree::{AncestorIter, NodeId, PhyloTree};
