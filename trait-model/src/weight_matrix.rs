//! Tip × regime weights of the OU expectation.
//!
//! Under an OU process started at the root optimum, the expected value
//! of tip `i` at depth `Tᵢ` is `Σⱼ W[i,j] θⱼ` with
//!
//! `W[i,j] = Σ_{segments [a,b] in regime j} exp(-α(Tᵢ - b)) - exp(-α(Tᵢ - a))`
//!
//! over the root-to-tip path, plus `exp(-αTᵢ)` for the root regime.
//! The root column is filled as the complement of the other columns, so
//! every row sums to one.

use crate::error::*;
use crate::regime::RegimePainting;
use nalgebra::DMatrix;
use tree_util::PhyloTree;

/// Build the weight matrix (tips in tip order, one column per regime).
///
/// * `alpha` - OU reversion strength, `α = 0` gives the Brownian matrix
///   with all weight on the root regime
pub fn build_weight_matrix(
    tree: &PhyloTree,
    painting: &RegimePainting,
    alpha: f64,
) -> Result<DMatrix<f64>> {
    let mut out = DMatrix::zeros(tree.n_tips(), painting.n_regimes());
    build_weight_matrix_into(tree, painting, alpha, &mut out)?;
    Ok(out)
}

/// Same as [`build_weight_matrix`], reusing `out` when its shape fits
pub fn build_weight_matrix_into(
    tree: &PhyloTree,
    painting: &RegimePainting,
    alpha: f64,
    out: &mut DMatrix<f64>,
) -> Result<()> {
    painting.check_tree(tree)?;

    if !alpha.is_finite() || alpha < 0.0 {
        return Err(invalid_config(format!(
            "alpha must be finite and non-negative, got {}",
            alpha
        )));
    }

    let n_tips = tree.n_tips();
    let n_regimes = painting.n_regimes();
    let root_regime = painting.root_regime();

    if out.shape() != (n_tips, n_regimes) {
        *out = DMatrix::zeros(n_tips, n_regimes);
    } else {
        out.fill(0.0);
    }

    if alpha == 0.0 {
        out.column_mut(root_regime).fill(1.0);
        return Ok(());
    }

    for (i, &tip) in tree.tips().iter().enumerate() {
        let tip_depth = tree.depth(tip);
        // each branch on the path is the one above `v`, hanging from `p`
        let path = std::iter::once(tip).chain(tree.ancestors(tip));
        for (v, p) in path.zip(tree.ancestors(tip)) {
            let base = tree.depth(p);
            for (start, end, regime) in painting.segments(tree, v) {
                if regime == root_regime || end <= start {
                    continue;
                }
                let since_end = (tip_depth - (base + end)).max(0.0);
                let w = (-alpha * since_end).exp() * -f64::exp_m1(-alpha * (end - start));
                out[(i, regime)] += w;
            }
        }

        let others: f64 = (0..n_regimes)
            .filter(|&j| j != root_regime)
            .map(|j| out[(i, j)])
            .sum();
        out[(i, root_regime)] = (1.0 - others).max(0.0);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::Shift;
    use approx::assert_abs_diff_eq;

    /// ((0:1,1:1)3:1,2:2)4;
    fn three_tip() -> PhyloTree {
        PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 2.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_single_regime_is_ones() {
        let tree = three_tip();
        let paint = RegimePainting::single_regime(&tree);
        for alpha in [0.0, 1e-12, 0.3, 5.0, 1e4] {
            let w = build_weight_matrix(&tree, &paint, alpha).unwrap();
            assert_eq!(w.shape(), (3, 1));
            assert!(w.iter().all(|&x| x == 1.0));
        }
    }

    #[test]
    fn test_shift_at_node_counts_once() {
        let tree = three_tip();
        let shift = |node, position| Shift {
            node,
            position,
            regime: 1,
        };

        // tipward end of the stem vs rootward ends of both children
        let at_end = RegimePainting::from_shifts(&tree, 2, 0, &[shift(3, 1.0)]).unwrap();
        let at_start =
            RegimePainting::from_shifts(&tree, 2, 0, &[shift(0, 0.0), shift(1, 0.0)]).unwrap();

        for alpha in [0.0, 0.05, 0.7, 12.0] {
            let a = build_weight_matrix(&tree, &at_end, alpha).unwrap();
            let b = build_weight_matrix(&tree, &at_start, alpha).unwrap();
            assert_eq!(a, b);
            for i in 0..3 {
                assert_abs_diff_eq!(a.row(i).sum(), 1.0, epsilon = 1e-12);
            }
            // tip 2 never sees regime 1
            assert_eq!(a[(2, 1)], 0.0);
        }

        // a shift at the rootward end of the stem covers the stem as well
        let whole = RegimePainting::from_shifts(&tree, 2, 0, &[shift(3, 0.0)]).unwrap();
        let w_whole = build_weight_matrix(&tree, &whole, 0.7).unwrap();
        let w_end = build_weight_matrix(&tree, &at_end, 0.7).unwrap();
        assert!(w_whole[(0, 1)] > w_end[(0, 1)]);
    }

    #[test]
    fn test_hand_computed_weights() {
        let tree = three_tip();
        // clade (0,1) switches to regime 1 halfway along its stem
        let paint = RegimePainting::from_shifts(
            &tree,
            2,
            0,
            &[Shift {
                node: 3,
                position: 0.5,
                regime: 1,
            }],
        )
        .unwrap();
        let alpha = 0.7;
        let w = build_weight_matrix(&tree, &paint, alpha).unwrap();

        // tip 0 spent 1.5 time units in regime 1
        let w01 = 1.0 - (-alpha * 1.5f64).exp();
        assert_abs_diff_eq!(w[(0, 1)], w01, epsilon = 1e-15);
        assert_abs_diff_eq!(w[(0, 0)], 1.0 - w01, epsilon = 1e-15);
        assert_abs_diff_eq!(w[(1, 1)], w01, epsilon = 1e-15);
        assert_eq!(w[(2, 1)], 0.0);
        assert_eq!(w[(2, 0)], 1.0);
    }

    #[test]
    fn test_alpha_zero_routes_to_root() {
        let tree = three_tip();
        let paint = RegimePainting::from_branch_regimes(&tree, 3, &[2, 1, 0, 1, 0]).unwrap();
        let w = build_weight_matrix(&tree, &paint, 0.0).unwrap();
        for i in 0..3 {
            assert_eq!(w[(i, 0)], 1.0);
            assert_eq!(w[(i, 1)], 0.0);
            assert_eq!(w[(i, 2)], 0.0);
        }
    }

    #[test]
    fn test_reuses_buffer() {
        let tree = three_tip();
        let paint = RegimePainting::from_branch_regimes(&tree, 2, &[1, 1, 0, 1, 0]).unwrap();
        let mut out = DMatrix::from_element(7, 7, f64::NAN);
        build_weight_matrix_into(&tree, &paint, 1.0, &mut out).unwrap();
        assert_eq!(out.shape(), (3, 2));
        let again = build_weight_matrix(&tree, &paint, 1.0).unwrap();
        assert_eq!(out, again);
        build_weight_matrix_into(&tree, &paint, 1.0, &mut out).unwrap();
        assert_eq!(out, again);
    }

    #[test]
    fn test_rejects_bad_alpha_and_painting() {
        let tree = three_tip();
        let paint = RegimePainting::single_regime(&tree);
        for alpha in [-1.0, f64::NAN, f64::INFINITY] {
            let err = build_weight_matrix(&tree, &paint, alpha).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }

        let other = PhyloTree::from_parents(vec![Some(2), Some(2), None], vec![1.0, 1.0, 0.0])
            .unwrap();
        let err = build_weight_matrix(&other, &paint, 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
