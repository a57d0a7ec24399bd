use crate::tree::NodeId;

/// Structural problems found while building a [`crate::PhyloTree`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    Empty,

    #[error("{parents} parent entries but {lengths} branch lengths")]
    LengthMismatch { parents: usize, lengths: usize },

    #[error("node {node} points to parent {parent} outside 0..{n_nodes}")]
    ParentOutOfRange {
        node: NodeId,
        parent: NodeId,
        n_nodes: usize,
    },

    #[error("node {0} appears as a descendant in more than one edge")]
    DuplicateEdge(NodeId),

    #[error("node {0} is its own parent")]
    SelfLoop(NodeId),

    #[error("no root: every node has a parent")]
    NoRoot,

    #[error("more than one root: nodes {0} and {1} have no parent")]
    MultipleRoots(NodeId, NodeId),

    #[error("branch length {length} above node {node} is negative or not finite")]
    InvalidBranchLength { node: NodeId, length: f64 },

    #[error("node {0} is not reachable from the root (cycle or disconnected)")]
    Unreachable(NodeId),

    #[error("invalid postorder: {0}")]
    InvalidPostorder(String),
}
