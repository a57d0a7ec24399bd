#![allow(clippy::needless_range_loop)]
//! Linear-time Gaussian quantities on a tree (three-point algorithm).
//!
//! For the tip covariance `V` implied by a set of branch lengths, and the
//! columns `Z = [y | X]`, we accumulate in postorder, per node `v`:
//!
//! - `log det V_v`
//! - `q11 = 1'V_v⁻¹1`
//! - `z1 = Z'V_v⁻¹1`
//! - `zz = Z'V_v⁻¹Z`
//!
//! where `V_v` is the covariance of the tips below `v` measured from the
//! parent of `v`. Children are independent given their parent, so their
//! quantities add; the branch `t` above `v` adds `t·11'`, absorbed by
//! Sherman-Morrison with `1 + t·q11`.
//!
//! A tip with a zero-length branch "pins" its parent to its own value.
//! The other children are then conditioned on it:
//!
//! `a'V⁻¹b = a_k b_k / t + (a_R - a_k 1)' V_R⁻¹ (b_R - b_k 1)`
//!
//! once a positive branch `t` above the pinned node is reached.

use crate::branch_transform::TransformedLengths;
use crate::error::*;
use nalgebra::{DMatrix, DVector};
use tree_util::{NodeId, PhyloTree};

/// Output of one three-point pass
#[derive(Debug, Clone, PartialEq)]
pub struct LikelihoodComponents {
    /// `log det V`
    pub log_det: f64,
    /// `r'V⁻¹r`, with `r = y - Xβ` when a design matrix was given, else `r = y`
    pub quadratic_form: f64,
    /// `β = (X'V⁻¹X)⁻¹ X'V⁻¹y`
    pub gls_estimate: Option<DVector<f64>>,
    /// `y'V⁻¹y`
    pub yy: f64,
    /// `X'V⁻¹X` (0 × 0 without a design)
    pub xx: DMatrix<f64>,
    /// `X'V⁻¹y` (empty without a design)
    pub xy: DVector<f64>,
}

impl LikelihoodComponents {
    /// Gaussian log-likelihood of `n` tips at diffusion rate `sigma2`:
    /// `-½(n ln 2π + n ln σ² + log det V + r'V⁻¹r / σ²)`
    pub fn log_likelihood(&self, n: usize, sigma2: f64) -> f64 {
        let n = n as f64;
        -0.5 * (n * (2.0 * std::f64::consts::PI).ln()
            + n * sigma2.ln()
            + self.log_det
            + self.quadratic_form / sigma2)
    }
}

/// Per-node accumulators, sized once per tree and design width
#[derive(Debug, Clone, Default)]
pub struct ThreePointWorkspace {
    n_cols: usize,
    log_det: Vec<f64>,
    q11: Vec<f64>,
    z1: Vec<f64>,
    zz: Vec<f64>,
    pinned: Vec<Option<usize>>,
    z_tip: Vec<f64>,
}

impl ThreePointWorkspace {
    /// * `n_design` - number of design columns the workspace will see
    pub fn new(tree: &PhyloTree, n_design: usize) -> Self {
        let mut ws = ThreePointWorkspace::default();
        ws.resize(tree.n_nodes(), tree.n_tips(), n_design + 1);
        ws
    }

    fn resize(&mut self, n_nodes: usize, n_tips: usize, n_cols: usize) {
        self.n_cols = n_cols;
        self.log_det.resize(n_nodes, 0.0);
        self.q11.resize(n_nodes, 0.0);
        self.z1.resize(n_nodes * n_cols, 0.0);
        self.zz.resize(n_nodes * n_cols * n_cols, 0.0);
        self.pinned.resize(n_nodes, None);
        self.z_tip.resize(n_tips * n_cols, 0.0);
    }

    /// Evaluate the log-determinant and quadratic form.
    ///
    /// * `lengths` - transformed branch lengths, root edge included
    /// * `y` - one value per tip, in tip order
    /// * `design` - optional tips × p design matrix (e.g. regime weights);
    ///   when present the GLS estimate is solved for and the quadratic
    ///   form is taken on the GLS residual
    pub fn evaluate(
        &mut self,
        tree: &PhyloTree,
        lengths: &TransformedLengths,
        y: &[f64],
        design: Option<&DMatrix<f64>>,
    ) -> Result<LikelihoodComponents> {
        let design = design.filter(|x| x.ncols() > 0);
        let n_design = design.map_or(0, |x| x.ncols());

        check_inputs(tree, lengths, y, design)?;

        let m = n_design + 1;
        self.resize(tree.n_nodes(), tree.n_tips(), m);

        // rescaled tip columns: z / exp(scale)
        let mut log_scale_sum = 0.0;
        for slot in 0..tree.n_tips() {
            let scale = lengths.tip_log_scale.get(slot).copied().unwrap_or(0.0);
            log_scale_sum += scale;
            let inv = (-scale).exp();
            self.z_tip[slot * m] = y[slot] * inv;
            if let Some(x) = design {
                for j in 0..n_design {
                    self.z_tip[slot * m + 1 + j] = x[(slot, j)] * inv;
                }
            }
        }

        for &v in tree.postorder() {
            self.clear(v);
            if let Some(slot) = tree.tip_slot(v) {
                self.pinned[v] = Some(slot);
            } else {
                for &c in tree.children(v) {
                    self.merge(v, c)?;
                }
            }
            self.absorb(v, lengths.edge[v])?;
        }

        let root = tree.root();
        if let Some(slot) = self.pinned[root] {
            return Err(degenerate(format!(
                "tip {} sits at zero distance from the root with no root edge; covariance is singular",
                tree.tips()[slot]
            )));
        }

        let log_det = self.log_det[root] + 2.0 * log_scale_sum;
        let zz = &self.zz[root * m * m..(root + 1) * m * m];
        let yy = zz[0];
        let xy = DVector::from_fn(n_design, |i, _| zz[1 + i]);
        let xx = DMatrix::from_fn(n_design, n_design, |i, j| zz[(1 + i) * m + 1 + j]);

        if !log_det.is_finite() || !yy.is_finite() {
            return Err(degenerate("non-finite log-determinant or quadratic form"));
        }

        let (quadratic_form, gls_estimate) = if n_design > 0 {
            let chol = xx.clone().cholesky().ok_or_else(|| {
                degenerate("X'V⁻¹X is not positive definite; regime optima are not identifiable")
            })?;
            let beta = chol.solve(&xy);
            let q = yy - 2.0 * beta.dot(&xy) + beta.dot(&(&xx * &beta));
            (q, Some(beta))
        } else {
            (yy, None)
        };

        Ok(LikelihoodComponents {
            log_det,
            quadratic_form,
            gls_estimate,
            yy,
            xx,
            xy,
        })
    }

    fn clear(&mut self, v: NodeId) {
        let m = self.n_cols;
        self.log_det[v] = 0.0;
        self.q11[v] = 0.0;
        self.z1[v * m..(v + 1) * m].fill(0.0);
        self.zz[v * m * m..(v + 1) * m * m].fill(0.0);
        self.pinned[v] = None;
    }

    /// Add child `c`'s contribution into `v`
    fn merge(&mut self, v: NodeId, c: NodeId) -> Result<()> {
        let m = self.n_cols;

        if let Some(slot) = self.pinned[c] {
            if let Some(other) = self.pinned[v] {
                return Err(degenerate(format!(
                    "tip rows {} and {} coincide (zero-length path); covariance is singular",
                    other, slot
                )));
            }
            self.pinned[v] = Some(slot);
        }

        self.log_det[v] += self.log_det[c];
        self.q11[v] += self.q11[c];
        for i in 0..m {
            self.z1[v * m + i] += self.z1[c * m + i];
        }
        for i in 0..m * m {
            self.zz[v * m * m + i] += self.zz[c * m * m + i];
        }
        Ok(())
    }

    /// Add the branch of length `t` above `v`
    fn absorb(&mut self, v: NodeId, t: f64) -> Result<()> {
        if t == 0.0 {
            return Ok(());
        }

        let m = self.n_cols;
        let z1 = v * m;
        let zz = v * m * m;

        if let Some(slot) = self.pinned[v].take() {
            // condition the rest of the subtree on the pinned tip
            let a = &self.z_tip[slot * m..(slot + 1) * m];
            let q11_r = self.q11[v];
            for i in 0..m {
                for j in 0..m {
                    self.zz[zz + i * m + j] += a[i] * a[j] / t
                        - a[i] * self.z1[z1 + j]
                        - a[j] * self.z1[z1 + i]
                        + a[i] * a[j] * q11_r;
                }
            }
            for i in 0..m {
                self.z1[z1 + i] = a[i] / t;
            }
            self.q11[v] = 1.0 / t;
            self.log_det[v] += t.ln();
            return Ok(());
        }

        let denom = 1.0 + t * self.q11[v];
        if !(denom.is_finite() && denom > 0.0) {
            return Err(degenerate(format!(
                "contraction at node {} produced denominator {}",
                v, denom
            )));
        }

        for i in 0..m {
            for j in 0..m {
                self.zz[zz + i * m + j] -= t * self.z1[z1 + i] * self.z1[z1 + j] / denom;
            }
        }
        for i in 0..m {
            self.z1[z1 + i] /= denom;
        }
        self.q11[v] /= denom;
        self.log_det[v] += denom.ln();
        Ok(())
    }
}

fn check_inputs(
    tree: &PhyloTree,
    lengths: &TransformedLengths,
    y: &[f64],
    design: Option<&DMatrix<f64>>,
) -> Result<()> {
    let n_tips = tree.n_tips();

    if n_tips < 2 {
        return Err(malformed(format!("need at least 2 tips, got {}", n_tips)));
    }
    if y.len() != n_tips {
        return Err(malformed(format!(
            "{} trait values for {} tips",
            y.len(),
            n_tips
        )));
    }
    if let Some(i) = y.iter().position(|x| !x.is_finite()) {
        return Err(malformed(format!("trait value {} at tip row {}", y[i], i)));
    }
    if let Some(x) = design {
        if x.nrows() != n_tips {
            return Err(malformed(format!(
                "design has {} rows for {} tips",
                x.nrows(),
                n_tips
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(malformed("non-finite entry in the design matrix"));
        }
    }
    if lengths.edge.len() != tree.n_nodes() {
        return Err(malformed(format!(
            "{} branch lengths for {} nodes",
            lengths.edge.len(),
            tree.n_nodes()
        )));
    }
    if let Some(v) = lengths.edge.iter().position(|t| !t.is_finite() || *t < 0.0) {
        return Err(malformed(format!(
            "branch length {} above node {}",
            lengths.edge[v], v
        )));
    }
    if !lengths.tip_log_scale.is_empty() {
        if lengths.tip_log_scale.len() != n_tips {
            return Err(malformed(format!(
                "{} tip scales for {} tips",
                lengths.tip_log_scale.len(),
                n_tips
            )));
        }
        if lengths.tip_log_scale.iter().any(|s| !s.is_finite()) {
            return Err(malformed("non-finite tip scale"));
        }
    }
    Ok(())
}

/// One-shot evaluation with a fresh workspace
pub fn three_point_evaluate(
    tree: &PhyloTree,
    lengths: &TransformedLengths,
    y: &[f64],
    design: Option<&DMatrix<f64>>,
) -> Result<LikelihoodComponents> {
    let n_design = design.map_or(0, |x| x.ncols());
    ThreePointWorkspace::new(tree, n_design).evaluate(tree, lengths, y, design)
}
