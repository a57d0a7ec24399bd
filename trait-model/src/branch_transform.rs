//! Rescale raw branch lengths into covariance units of a trait model.
//!
//! After the transform, the tip covariance of the model (per unit of the
//! diffusion rate σ²) is the Brownian covariance of the transformed tree,
//! optionally rescaled on both sides by `diag(exp(tip_log_scale))`:
//!
//! `V = D · V_bm(edge) · D`,  `D = diag(exp(tip_log_scale))`
//!
//! Near the Brownian limit every model is evaluated through `expm1` or a
//! short series, never through a `0/0` formula.

use crate::error::*;
use tree_util::{NodeId, PhyloTree};

/// Below this magnitude `expm1(x)/x` is replaced by its series
const SERIES_CUTOFF: f64 = 1e-5;

/// Branch-length model, selected by an integer code at the host boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchModel {
    /// code 0: identity
    Brownian,
    /// code 1: each branch `t` becomes `(1 - exp(-2αt)) / (2α)`
    OrnsteinUhlenbeck,
    /// code 2: exact OU covariance with the root state fixed
    OuFixedRoot,
    /// code 3: exact OU covariance with the root drawn from the
    /// stationary distribution
    OuRandomRoot,
    /// code 4: early burst, rate `r` may take either sign
    EarlyBurst,
    /// code 5: Pagel's δ applied to node depths
    Delta,
}

impl BranchModel {
    pub const ALL: [BranchModel; 6] = [
        BranchModel::Brownian,
        BranchModel::OrnsteinUhlenbeck,
        BranchModel::OuFixedRoot,
        BranchModel::OuRandomRoot,
        BranchModel::EarlyBurst,
        BranchModel::Delta,
    ];

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(BranchModel::Brownian),
            1 => Ok(BranchModel::OrnsteinUhlenbeck),
            2 => Ok(BranchModel::OuFixedRoot),
            3 => Ok(BranchModel::OuRandomRoot),
            4 => Ok(BranchModel::EarlyBurst),
            5 => Ok(BranchModel::Delta),
            _ => Err(invalid_config(format!("unknown branch model code {}", code))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            BranchModel::Brownian => 0,
            BranchModel::OrnsteinUhlenbeck => 1,
            BranchModel::OuFixedRoot => 2,
            BranchModel::OuRandomRoot => 3,
            BranchModel::EarlyBurst => 4,
            BranchModel::Delta => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BranchModel::Brownian => "BM",
            BranchModel::OrnsteinUhlenbeck => "OU",
            BranchModel::OuFixedRoot => "OUfixedRoot",
            BranchModel::OuRandomRoot => "OUrandomRoot",
            BranchModel::EarlyBurst => "EB",
            BranchModel::Delta => "delta",
        }
    }

    /// Whether the model reads node depths (the auxiliary vector)
    pub fn uses_depths(&self) -> bool {
        matches!(
            self,
            BranchModel::OuFixedRoot
                | BranchModel::OuRandomRoot
                | BranchModel::EarlyBurst
                | BranchModel::Delta
        )
    }

    fn check_param(&self, alpha: f64) -> Result<()> {
        let ok = match self {
            BranchModel::Brownian => true,
            BranchModel::OrnsteinUhlenbeck | BranchModel::OuFixedRoot => {
                alpha.is_finite() && alpha >= 0.0
            }
            BranchModel::OuRandomRoot | BranchModel::Delta => alpha.is_finite() && alpha > 0.0,
            BranchModel::EarlyBurst => alpha.is_finite(),
        };
        if ok {
            Ok(())
        } else {
            Err(invalid_config(format!(
                "parameter {} outside the domain of the {} model",
                alpha,
                self.name()
            )))
        }
    }

    /// Transform the tree's branch lengths.
    ///
    /// * `aux` - node depths from the root, one per node; pass an empty
    ///   slice to use the tree's own depths
    /// * `alpha` - α for the OU models, the rate `r` for early burst, δ for delta
    pub fn transform(&self, tree: &PhyloTree, aux: &[f64], alpha: f64) -> Result<TransformedLengths> {
        let mut out = TransformedLengths::default();
        self.transform_into(tree, aux, alpha, &mut out)?;
        Ok(out)
    }

    /// Same as [`BranchModel::transform`], writing into a reusable buffer
    pub fn transform_into(
        &self,
        tree: &PhyloTree,
        aux: &[f64],
        alpha: f64,
        out: &mut TransformedLengths,
    ) -> Result<()> {
        self.check_param(alpha)?;

        let depth = if aux.is_empty() || !self.uses_depths() {
            tree.depths()
        } else {
            check_depths(tree, aux)?;
            aux
        };

        out.reset(tree.n_nodes(), tree.n_tips());

        match self {
            BranchModel::Brownian => brownian(tree, out),
            BranchModel::OrnsteinUhlenbeck => ou_per_branch(tree, alpha, out),
            BranchModel::OuFixedRoot => ou_rooted(tree, depth, alpha, false, out),
            BranchModel::OuRandomRoot => ou_rooted(tree, depth, alpha, true, out),
            BranchModel::EarlyBurst => early_burst(tree, depth, alpha, out),
            BranchModel::Delta => delta(tree, depth, alpha, out),
        }
        Ok(())
    }
}

impl TryFrom<i32> for BranchModel {
    type Error = TraitModelError;

    fn try_from(code: i32) -> Result<Self> {
        BranchModel::from_code(code)
    }
}

/// Transformed branch lengths, one entry per node.
///
/// `edge[root]` is the root edge. `tip_log_scale` is empty or holds one
/// entry per tip (tip order) with `ln` of the diagonal rescaling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedLengths {
    pub edge: Vec<f64>,
    pub tip_log_scale: Vec<f64>,
}

impl TransformedLengths {
    /// Brownian lengths of the tree, unscaled
    pub fn identity(tree: &PhyloTree) -> Self {
        TransformedLengths {
            edge: tree.edge_lengths().to_vec(),
            tip_log_scale: vec![],
        }
    }

    pub fn root_edge(&self, tree: &PhyloTree) -> f64 {
        self.edge[tree.root()]
    }

    pub fn has_tip_scale(&self) -> bool {
        self.tip_log_scale.iter().any(|&s| s != 0.0)
    }

    fn reset(&mut self, n_nodes: usize, n_tips: usize) {
        self.edge.clear();
        self.edge.resize(n_nodes, 0.0);
        self.tip_log_scale.clear();
        self.tip_log_scale.resize(n_tips, 0.0);
    }
}

fn check_depths(tree: &PhyloTree, aux: &[f64]) -> Result<()> {
    if aux.len() != tree.n_nodes() {
        return Err(malformed(format!(
            "{} depths for {} nodes",
            aux.len(),
            tree.n_nodes()
        )));
    }
    for v in 0..tree.n_nodes() {
        if !aux[v].is_finite() || aux[v] < 0.0 {
            return Err(malformed(format!("depth {} of node {}", aux[v], v)));
        }
        if let Some(p) = tree.parent(v) {
            if aux[v] < aux[p] {
                return Err(malformed(format!(
                    "node {} is shallower than its parent {}",
                    v, p
                )));
            }
        }
    }
    Ok(())
}

/// `(1 - exp(-2αt)) / (2α)`, the OU variance accumulated along `t`.
/// Equals `t` at α = 0.
#[inline]
pub fn ou_variance(alpha: f64, t: f64) -> f64 {
    let x = 2.0 * alpha * t;
    t * exp_decay_ratio(x)
}

/// `(1 - exp(-x)) / x`
#[inline]
fn exp_decay_ratio(x: f64) -> f64 {
    if x.abs() < SERIES_CUTOFF {
        1.0 - x / 2.0 + x * x / 6.0
    } else {
        -f64::exp_m1(-x) / x
    }
}

/// `(exp(x) - 1) / x`
#[inline]
fn exp_growth_ratio(x: f64) -> f64 {
    if x.abs() < SERIES_CUTOFF {
        1.0 + x / 2.0 + x * x / 6.0
    } else {
        f64::exp_m1(x) / x
    }
}

fn brownian(tree: &PhyloTree, out: &mut TransformedLengths) {
    out.edge.copy_from_slice(tree.edge_lengths());
}

fn ou_per_branch(tree: &PhyloTree, alpha: f64, out: &mut TransformedLengths) {
    for (e, &t) in out.edge.iter_mut().zip(tree.edge_lengths()) {
        *e = ou_variance(alpha, t);
    }
}

/// Exact OU covariance.
///
/// With `T` the deepest tip and `τ = T - d` the time before the present,
/// the OU covariance of tips `i, j` sharing depth `s` is
/// `exp(αDᵢ) exp(αDⱼ) (exp(-2α(T - s)) - exp(-2αT)) / (2α)` for a fixed
/// root, where `Dᵢ = T - dᵢ`. The middle factor is a Brownian covariance
/// on the edges `(exp(-2ατ_child) - exp(-2ατ_parent)) / (2α)`, and the outer
/// factors go to `tip_log_scale = αDᵢ`. A random root adds the root edge
/// `exp(-2αT) / (2α)`.
fn ou_rooted(
    tree: &PhyloTree,
    depth: &[f64],
    alpha: f64,
    random_root: bool,
    out: &mut TransformedLengths,
) {
    let height = tree
        .tips()
        .iter()
        .map(|&v| depth[v])
        .fold(0.0, f64::max);

    let tau = |v: NodeId| -> f64 { (height - depth[v]).max(0.0) };

    for v in 0..tree.n_nodes() {
        if let Some(p) = tree.parent(v) {
            let tau_v = tau(v);
            let span = (tau(p) - tau_v).max(0.0);
            out.edge[v] = (-2.0 * alpha * tau_v).exp() * ou_variance(alpha, span);
        }
    }

    out.edge[tree.root()] = if random_root {
        (-2.0 * alpha * height).exp() / (2.0 * alpha)
    } else {
        0.0
    };

    for (slot, &v) in tree.tips().iter().enumerate() {
        out.tip_log_scale[slot] = alpha * (height - depth[v]);
    }
}

/// Early burst: rate multiplier `exp(r·d)` at depth `d`, so a branch
/// spanning depths `[d_p, d_v]` becomes `(exp(r d_v) - exp(r d_p)) / r`.
/// The root edge passes through unchanged.
fn early_burst(tree: &PhyloTree, depth: &[f64], rate: f64, out: &mut TransformedLengths) {
    for v in 0..tree.n_nodes() {
        out.edge[v] = match tree.parent(v) {
            Some(p) => {
                let t = depth[v] - depth[p];
                (rate * depth[p]).exp() * t * exp_growth_ratio(rate * t)
            }
            None => tree.edge_length(v),
        };
    }
}

/// Pagel's δ: a branch spanning depths `[d_p, d_v]` becomes `d_v^δ - d_p^δ`.
/// The root edge passes through unchanged.
fn delta(tree: &PhyloTree, depth: &[f64], delta: f64, out: &mut TransformedLengths) {
    for v in 0..tree.n_nodes() {
        out.edge[v] = match tree.parent(v) {
            Some(p) => (depth[v].powf(delta) - depth[p].powf(delta)).max(0.0),
            None => tree.edge_length(v),
        };
    }
}
