//! Regime painting: which regime governs every point of every branch.
//!
//! Each branch is cut into segments at its shifts. Positions are
//! measured from the rootward end of the branch. The regime at a point
//! is that of the latest shift at or rootward of it, so:
//!
//! - a shift at position 0 paints the whole branch,
//! - a shift at the full branch length paints none of the branch but
//!   every descendant,
//! - several shifts at one position: the last one listed wins.
//!
//! Segment `k` of a branch covers `[start_k, start_{k+1})`, the last one
//! ending at the branch length.

use crate::error::*;
use tree_util::{NodeId, PhyloTree};

/// A change of regime on the branch above `node`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shift {
    pub node: NodeId,
    /// distance from the rootward end of the branch
    pub position: f64,
    pub regime: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimePainting {
    n_regimes: usize,
    root_regime: usize,
    /// segments of node `v`: `seg_offset[v]..seg_offset[v + 1]`
    seg_offset: Vec<usize>,
    seg_start: Vec<f64>,
    seg_regime: Vec<usize>,
    /// shape of the tree painted, to catch use with another tree
    parent: Vec<Option<NodeId>>,
    edge_length: Vec<f64>,
}

impl RegimePainting {
    /// Every branch in the root regime `0`
    pub fn single_regime(tree: &PhyloTree) -> Self {
        let n_nodes = tree.n_nodes();
        RegimePainting {
            n_regimes: 1,
            root_regime: 0,
            seg_offset: (0..=n_nodes).collect(),
            seg_start: vec![0.0; n_nodes],
            seg_regime: vec![0; n_nodes],
            parent: (0..n_nodes).map(|v| tree.parent(v)).collect(),
            edge_length: tree.edge_lengths().to_vec(),
        }
    }

    /// Paint the tree from a list of shifts.
    ///
    /// * `n_regimes` - number of regimes; labels run over `0..n_regimes`
    /// * `root_regime` - regime in force at the root
    /// * `shifts` - shifts in any order
    pub fn from_shifts(
        tree: &PhyloTree,
        n_regimes: usize,
        root_regime: usize,
        shifts: &[Shift],
    ) -> Result<Self> {
        if n_regimes == 0 {
            return Err(invalid_config("at least one regime is required"));
        }
        if root_regime >= n_regimes {
            return Err(invalid_config(format!(
                "root regime {} outside 0..{}",
                root_regime, n_regimes
            )));
        }

        let n_nodes = tree.n_nodes();
        let mut per_node: Vec<Vec<(f64, usize)>> = vec![vec![]; n_nodes];

        for s in shifts {
            if s.node >= n_nodes {
                return Err(malformed(format!("shift on unknown node {}", s.node)));
            }
            if s.node == tree.root() {
                return Err(malformed("the root branch cannot carry a shift"));
            }
            if s.regime >= n_regimes {
                return Err(invalid_config(format!(
                    "shift to regime {} outside 0..{}",
                    s.regime, n_regimes
                )));
            }
            let len = tree.edge_length(s.node);
            if !s.position.is_finite() || s.position < 0.0 || s.position > len {
                return Err(malformed(format!(
                    "shift at {} outside the branch above node {} (length {})",
                    s.position, s.node, len
                )));
            }
            per_node[s.node].push((s.position, s.regime));
        }

        // stable: ties keep their listed order
        for list in per_node.iter_mut() {
            list.sort_by(|a, b| a.0.total_cmp(&b.0));
        }

        let mut segments: Vec<Vec<(f64, usize)>> = vec![vec![]; n_nodes];
        let mut end_regime = vec![root_regime; n_nodes];

        for &v in tree.preorder() {
            let inherited = tree.parent(v).map_or(root_regime, |p| end_regime[p]);
            let segs = &mut segments[v];
            segs.push((0.0, inherited));
            for &(pos, regime) in per_node[v].iter() {
                match segs.last_mut() {
                    Some(last) if last.0 == pos => last.1 = regime,
                    _ => segs.push((pos, regime)),
                }
            }
            end_regime[v] = segs.last().map_or(inherited, |s| s.1);
        }

        let mut seg_offset = Vec::with_capacity(n_nodes + 1);
        let mut seg_start = vec![];
        let mut seg_regime = vec![];
        seg_offset.push(0);
        for segs in segments {
            for (start, regime) in segs {
                seg_start.push(start);
                seg_regime.push(regime);
            }
            seg_offset.push(seg_start.len());
        }

        log::debug!(
            "painted {} regimes with {} shifts over {} segments",
            n_regimes,
            shifts.len(),
            seg_start.len()
        );

        Ok(RegimePainting {
            n_regimes,
            root_regime,
            seg_offset,
            seg_start,
            seg_regime,
            parent: (0..n_nodes).map(|v| tree.parent(v)).collect(),
            edge_length: tree.edge_lengths().to_vec(),
        })
    }

    /// Paint whole branches: `regimes[v]` governs the entire branch above
    /// `v`; the root entry is the root regime.
    pub fn from_branch_regimes(
        tree: &PhyloTree,
        n_regimes: usize,
        regimes: &[usize],
    ) -> Result<Self> {
        if regimes.len() != tree.n_nodes() {
            return Err(malformed(format!(
                "{} branch regimes for {} nodes",
                regimes.len(),
                tree.n_nodes()
            )));
        }
        let root = tree.root();
        let shifts: Vec<Shift> = (0..tree.n_nodes())
            .filter_map(|v| {
                let p = tree.parent(v)?;
                (regimes[v] != regimes[p]).then_some(Shift {
                    node: v,
                    position: 0.0,
                    regime: regimes[v],
                })
            })
            .collect();
        Self::from_shifts(tree, n_regimes, regimes[root], &shifts)
    }

    pub fn n_regimes(&self) -> usize {
        self.n_regimes
    }

    pub fn root_regime(&self) -> usize {
        self.root_regime
    }

    /// Number of nodes the painting was built for
    pub fn n_nodes(&self) -> usize {
        self.seg_offset.len() - 1
    }

    /// Segments of the branch above `v` as `(start, end, regime)`,
    /// positions measured from the rootward end
    pub fn segments<'a>(
        &'a self,
        tree: &PhyloTree,
        v: NodeId,
    ) -> impl Iterator<Item = (f64, f64, usize)> + 'a {
        let lb = self.seg_offset[v];
        let ub = self.seg_offset[v + 1];
        let len = tree.edge_length(v);
        (lb..ub).map(move |k| {
            let end = if k + 1 < ub { self.seg_start[k + 1] } else { len };
            (self.seg_start[k], end, self.seg_regime[k])
        })
    }

    /// Regime in force at the tipward end of the branch above `v`
    pub fn end_regime(&self, v: NodeId) -> usize {
        self.seg_regime[self.seg_offset[v + 1] - 1]
    }

    /// Regime at `position` along the branch above `v`
    pub fn regime_at(&self, v: NodeId, position: f64) -> usize {
        let lb = self.seg_offset[v];
        let ub = self.seg_offset[v + 1];
        let k = (lb..ub)
            .rev()
            .find(|&k| self.seg_start[k] <= position)
            .unwrap_or(lb);
        self.seg_regime[k]
    }

    pub(crate) fn check_tree(&self, tree: &PhyloTree) -> Result<()> {
        if self.n_nodes() != tree.n_nodes() {
            return Err(malformed(format!(
                "painting covers {} nodes, tree has {}",
                self.n_nodes(),
                tree.n_nodes()
            )));
        }
        // the root edge is free to change; it carries no shifts
        for v in 0..tree.n_nodes() {
            let same_parent = self.parent[v] == tree.parent(v);
            if !same_parent || (v != tree.root() && self.edge_length[v] != tree.edge_length(v)) {
                return Err(malformed(format!(
                    "painting was built for a different tree (branch above node {})",
                    v
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((0:1,1:1)3:1,2:2)4;
    fn three_tip() -> PhyloTree {
        PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 2.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_inheritance() {
        let tree = three_tip();
        let shifts = [Shift {
            node: 3,
            position: 0.25,
            regime: 1,
        }];
        let paint = RegimePainting::from_shifts(&tree, 2, 0, &shifts).unwrap();

        let segs: Vec<_> = paint.segments(&tree, 3).collect();
        assert_eq!(segs, vec![(0.0, 0.25, 0), (0.25, 1.0, 1)]);
        assert_eq!(paint.end_regime(3), 1);
        assert_eq!(paint.end_regime(0), 1);
        assert_eq!(paint.end_regime(2), 0);
        assert_eq!(paint.regime_at(3, 0.1), 0);
        assert_eq!(paint.regime_at(3, 0.25), 1);
    }

    #[test]
    fn test_boundary_shifts() {
        let tree = three_tip();

        // at the rootward end: the whole branch
        let paint = RegimePainting::from_shifts(
            &tree,
            2,
            0,
            &[Shift {
                node: 3,
                position: 0.0,
                regime: 1,
            }],
        )
        .unwrap();
        let segs: Vec<_> = paint.segments(&tree, 3).collect();
        assert_eq!(segs, vec![(0.0, 1.0, 1)]);

        // at the tipward end: nothing of this branch, all descendants
        let paint = RegimePainting::from_shifts(
            &tree,
            2,
            0,
            &[Shift {
                node: 3,
                position: 1.0,
                regime: 1,
            }],
        )
        .unwrap();
        let segs: Vec<_> = paint.segments(&tree, 3).collect();
        assert_eq!(segs, vec![(0.0, 1.0, 0), (1.0, 1.0, 1)]);
        assert_eq!(paint.end_regime(3), 1);
        let segs: Vec<_> = paint.segments(&tree, 0).collect();
        assert_eq!(segs, vec![(0.0, 1.0, 1)]);
    }

    #[test]
    fn test_ties_keep_last_listed() {
        let tree = three_tip();
        let shifts = [
            Shift {
                node: 2,
                position: 0.5,
                regime: 1,
            },
            Shift {
                node: 2,
                position: 0.5,
                regime: 2,
            },
        ];
        let paint = RegimePainting::from_shifts(&tree, 3, 0, &shifts).unwrap();
        let segs: Vec<_> = paint.segments(&tree, 2).collect();
        assert_eq!(segs, vec![(0.0, 0.5, 0), (0.5, 2.0, 2)]);
    }

    #[test]
    fn test_branch_regimes() {
        let tree = three_tip();
        let paint = RegimePainting::from_branch_regimes(&tree, 3, &[2, 1, 0, 1, 0]).unwrap();
        assert_eq!(paint.root_regime(), 0);
        assert_eq!(paint.end_regime(0), 2);
        assert_eq!(paint.end_regime(1), 1);
        assert_eq!(paint.end_regime(2), 0);
        assert_eq!(paint.segments(&tree, 1).count(), 1);
    }

    #[test]
    fn test_painting_is_tied_to_its_tree() {
        let tree = three_tip();
        let paint = RegimePainting::from_shifts(
            &tree,
            2,
            0,
            &[Shift {
                node: 2,
                position: 1.5,
                regime: 1,
            }],
        )
        .unwrap();
        assert!(paint.check_tree(&tree).is_ok());

        // same node count, tips 1 and 2 swapped
        let rewired = PhyloTree::from_parents(
            vec![Some(3), Some(4), Some(3), Some(4), None],
            vec![1.0, 1.0, 2.0, 1.0, 0.0],
        )
        .unwrap();
        // same topology, branch 2 too short for the shift
        let shorter = PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 1.0, 1.0, 0.0],
        )
        .unwrap();
        for other in [&rewired, &shorter] {
            let err = paint.check_tree(other).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput);
        }

        let rooted = three_tip().with_root_edge(0.5).unwrap();
        assert!(paint.check_tree(&rooted).is_ok());
    }

    #[test]
    fn test_rejects() {
        let tree = three_tip();
        let shift = |node, position, regime| Shift {
            node,
            position,
            regime,
        };

        let cases = [
            (RegimePainting::from_shifts(&tree, 0, 0, &[]), ErrorKind::InvalidConfig),
            (RegimePainting::from_shifts(&tree, 2, 2, &[]), ErrorKind::InvalidConfig),
            (
                RegimePainting::from_shifts(&tree, 2, 0, &[shift(4, 0.0, 1)]),
                ErrorKind::MalformedInput,
            ),
            (
                RegimePainting::from_shifts(&tree, 2, 0, &[shift(9, 0.0, 1)]),
                ErrorKind::MalformedInput,
            ),
            (
                RegimePainting::from_shifts(&tree, 2, 0, &[shift(0, 0.0, 5)]),
                ErrorKind::InvalidConfig,
            ),
            (
                RegimePainting::from_shifts(&tree, 2, 0, &[shift(0, 1.5, 1)]),
                ErrorKind::MalformedInput,
            ),
            (
                RegimePainting::from_branch_regimes(&tree, 2, &[0, 1]),
                ErrorKind::MalformedInput,
            ),
        ];
        for (res, kind) in cases {
            assert_eq!(res.unwrap_err().kind(), kind);
        }
    }
}
