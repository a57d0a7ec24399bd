//! Rooted phylogenetic tree stored as an arena of integer-indexed nodes.
//!
//! - Node `v` has at most one parent and any number of children
//! - `edge_length[v]` is the branch from `v` up to its parent; the root
//!   entry holds the root edge (usually zero)
//! - Children are kept in compressed form: `child_index[child_offset[v]..child_offset[v + 1]]`
//! - Tips are the nodes without children, ordered by ascending node id.
//!   Every per-tip vector handed to the likelihood kernels follows this order.
//!
//! Traversal orders and node depths are computed once at construction,
//! so the tree can be shared read-only across every likelihood evaluation.

use crate::error::TreeError;

/// Index into the node arena
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct PhyloTree {
    parent: Vec<Option<NodeId>>,
    edge_length: Vec<f64>,
    child_offset: Vec<usize>,
    child_index: Vec<NodeId>,
    root: NodeId,
    tips: Vec<NodeId>,
    tip_slot: Vec<Option<usize>>,
    postorder: Vec<NodeId>,
    preorder: Vec<NodeId>,
    depth: Vec<f64>,
    level: Vec<usize>,
    max_tip_depth: f64,
}

impl PhyloTree {
    /// Build a tree from a parent vector.
    ///
    /// * `parent` - parent of each node (`None` for the root)
    /// * `edge_length` - branch length from each node to its parent; the
    ///   root entry is the root edge
    pub fn from_parents(
        parent: Vec<Option<NodeId>>,
        edge_length: Vec<f64>,
    ) -> Result<Self, TreeError> {
        let n_nodes = parent.len();

        if n_nodes == 0 {
            return Err(TreeError::Empty);
        }

        if edge_length.len() != n_nodes {
            return Err(TreeError::LengthMismatch {
                parents: n_nodes,
                lengths: edge_length.len(),
            });
        }

        let mut root = None;
        for (v, &p) in parent.iter().enumerate() {
            match p {
                Some(p) if p >= n_nodes => {
                    return Err(TreeError::ParentOutOfRange {
                        node: v,
                        parent: p,
                        n_nodes,
                    });
                }
                Some(p) if p == v => return Err(TreeError::SelfLoop(v)),
                Some(_) => {}
                None => {
                    if let Some(r) = root {
                        return Err(TreeError::MultipleRoots(r, v));
                    }
                    root = Some(v);
                }
            }
        }
        let root = root.ok_or(TreeError::NoRoot)?;

        for (v, &len) in edge_length.iter().enumerate() {
            if !len.is_finite() || len < 0.0 {
                return Err(TreeError::InvalidBranchLength {
                    node: v,
                    length: len,
                });
            }
        }

        // compressed child lists, children kept in ascending id order
        let mut child_offset = vec![0usize; n_nodes + 1];
        for &p in parent.iter().flatten() {
            child_offset[p + 1] += 1;
        }
        for v in 0..n_nodes {
            child_offset[v + 1] += child_offset[v];
        }
        let mut fill = child_offset.clone();
        let mut child_index = vec![0; n_nodes - 1];
        for (v, &p) in parent.iter().enumerate() {
            if let Some(p) = p {
                child_index[fill[p]] = v;
                fill[p] += 1;
            }
        }

        // preorder from the root; anything unvisited sits on a cycle
        let mut preorder = Vec::with_capacity(n_nodes);
        let mut visited = vec![false; n_nodes];
        let mut stack = vec![root];
        while let Some(v) = stack.pop() {
            visited[v] = true;
            preorder.push(v);
            let kids = &child_index[child_offset[v]..child_offset[v + 1]];
            stack.extend(kids.iter().rev());
        }
        if let Some(v) = visited.iter().position(|&x| !x) {
            return Err(TreeError::Unreachable(v));
        }

        let mut postorder = preorder.clone();
        postorder.reverse();

        let mut depth = vec![0.0; n_nodes];
        let mut level = vec![0usize; n_nodes];
        for &v in preorder.iter() {
            if let Some(p) = parent[v] {
                depth[v] = depth[p] + edge_length[v];
                level[v] = level[p] + 1;
            }
        }

        let mut tips = vec![];
        let mut tip_slot = vec![None; n_nodes];
        for v in 0..n_nodes {
            if child_offset[v] == child_offset[v + 1] {
                tip_slot[v] = Some(tips.len());
                tips.push(v);
            }
        }

        let max_tip_depth = tips.iter().map(|&v| depth[v]).fold(0.0, f64::max);

        log::debug!(
            "tree with {} nodes, {} tips, root {}, height {:.4}",
            n_nodes,
            tips.len(),
            root,
            max_tip_depth
        );

        Ok(PhyloTree {
            parent,
            edge_length,
            child_offset,
            child_index,
            root,
            tips,
            tip_slot,
            postorder,
            preorder,
            depth,
            level,
            max_tip_depth,
        })
    }

    /// Build a tree from integer parent indices where any negative
    /// entry marks the root (the layout host environments hand over).
    pub fn from_parent_indices(parent: &[i64], edge_length: Vec<f64>) -> Result<Self, TreeError> {
        let parent = parent
            .iter()
            .map(|&p| if p < 0 { None } else { Some(p as NodeId) })
            .collect();
        Self::from_parents(parent, edge_length)
    }

    /// Build a tree from `(ancestor, descendant, length)` edges over
    /// `n_nodes` nodes. The root edge is zero.
    pub fn from_edges(n_nodes: usize, edges: &[(NodeId, NodeId, f64)]) -> Result<Self, TreeError> {
        let mut parent = vec![None; n_nodes];
        let mut edge_length = vec![0.0; n_nodes];
        for &(anc, des, len) in edges {
            if des >= n_nodes {
                return Err(TreeError::ParentOutOfRange {
                    node: des,
                    parent: anc,
                    n_nodes,
                });
            }
            if parent[des].replace(anc).is_some() {
                return Err(TreeError::DuplicateEdge(des));
            }
            edge_length[des] = len;
        }
        Self::from_parents(parent, edge_length)
    }

    /// Replace the traversal order with a caller-supplied postorder,
    /// e.g. one shared with an external tree loader.
    ///
    /// Every node must appear exactly once and after all its children.
    pub fn with_postorder(mut self, order: Vec<NodeId>) -> Result<Self, TreeError> {
        let n_nodes = self.n_nodes();
        if order.len() != n_nodes {
            return Err(TreeError::InvalidPostorder(format!(
                "{} entries for {} nodes",
                order.len(),
                n_nodes
            )));
        }

        let mut position = vec![usize::MAX; n_nodes];
        for (i, &v) in order.iter().enumerate() {
            if v >= n_nodes || position[v] != usize::MAX {
                return Err(TreeError::InvalidPostorder(format!(
                    "node {} out of range or repeated",
                    v
                )));
            }
            position[v] = i;
        }

        for v in 0..n_nodes {
            if let Some(p) = self.parent[v] {
                if position[p] < position[v] {
                    return Err(TreeError::InvalidPostorder(format!(
                        "parent {} visited before child {}",
                        p, v
                    )));
                }
            }
        }

        self.postorder = order;
        Ok(self)
    }

    /// Same topology with a different root edge
    pub fn with_root_edge(mut self, root_edge: f64) -> Result<Self, TreeError> {
        if !root_edge.is_finite() || root_edge < 0.0 {
            return Err(TreeError::InvalidBranchLength {
                node: self.root,
                length: root_edge,
            });
        }
        self.edge_length[self.root] = root_edge;
        Ok(self)
    }

    pub fn n_nodes(&self) -> usize {
        self.parent.len()
    }

    pub fn n_tips(&self) -> usize {
        self.tips.len()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn parent(&self, v: NodeId) -> Option<NodeId> {
        self.parent[v]
    }

    #[inline]
    pub fn children(&self, v: NodeId) -> &[NodeId] {
        &self.child_index[self.child_offset[v]..self.child_offset[v + 1]]
    }

    #[inline]
    pub fn is_tip(&self, v: NodeId) -> bool {
        self.child_offset[v] == self.child_offset[v + 1]
    }

    /// Branch length from `v` to its parent (root edge for the root)
    #[inline]
    pub fn edge_length(&self, v: NodeId) -> f64 {
        self.edge_length[v]
    }

    pub fn edge_lengths(&self) -> &[f64] {
        &self.edge_length
    }

    pub fn root_edge(&self) -> f64 {
        self.edge_length[self.root]
    }

    /// Tip nodes in tip order
    pub fn tips(&self) -> &[NodeId] {
        &self.tips
    }

    /// Row of node `v` in per-tip vectors, `None` for internal nodes
    #[inline]
    pub fn tip_slot(&self, v: NodeId) -> Option<usize> {
        self.tip_slot[v]
    }

    /// Children before parents, root last
    pub fn postorder(&self) -> &[NodeId] {
        &self.postorder
    }

    /// Parents before children, root first
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    /// Distance from the root to `v`, excluding the root edge
    #[inline]
    pub fn depth(&self, v: NodeId) -> f64 {
        self.depth[v]
    }

    pub fn depths(&self) -> &[f64] {
        &self.depth
    }

    /// Depth of the deepest tip
    pub fn height(&self) -> f64 {
        self.max_tip_depth
    }

    /// All tips at the same depth up to a relative tolerance
    pub fn is_ultrametric(&self, rel_tol: f64) -> bool {
        let tol = rel_tol * self.max_tip_depth.max(f64::MIN_POSITIVE);
        self.tips
            .iter()
            .all(|&v| (self.max_tip_depth - self.depth[v]).abs() <= tol)
    }

    /// Iterate over ancestors of `v`, from its parent up to the root
    pub fn ancestors(&self, v: NodeId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: self.parent[v],
        }
    }

    /// Most recent common ancestor of two nodes
    pub fn mrca(&self, a: NodeId, b: NodeId) -> NodeId {
        let mut a = a;
        let mut b = b;
        while a != b {
            // step up from whichever node is more edges away from the root
            if self.level[a] >= self.level[b] {
                a = self.parent[a].unwrap_or(a);
            } else {
                b = self.parent[b].unwrap_or(b);
            }
        }
        a
    }

    /// Length of the root-to-MRCA path shared by two nodes
    pub fn shared_depth(&self, a: NodeId, b: NodeId) -> f64 {
        self.depth[self.mrca(a, b)]
    }
}

/// Iterator over ancestors of a node, walking from parent to root.
pub struct AncestorIter<'a> {
    tree: &'a PhyloTree,
    current: Option<NodeId>,
}

impl Iterator for AncestorIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = self.tree.parent[node];
        Some(node)
    }
}
