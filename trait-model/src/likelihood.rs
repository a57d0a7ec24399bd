//! Gaussian log-likelihood of tip traits under BM and OU, assembled from
//! the three kernels:
//!
//! 1. regime weights `W` (OU only) and the residual `r = y - Wθ`
//! 2. branch lengths transformed into covariance units (per unit σ²)
//! 3. three-point pass on `r`
//!
//! `log L = -½ (n ln 2π + n ln σ² + log det V + r'V⁻¹r / σ²)`
//!
//! All intermediate buffers live in [`TraitLikelihood`] and are reused
//! from one evaluation to the next.

use crate::branch_transform::{BranchModel, TransformedLengths};
use crate::error::*;
use crate::regime::RegimePainting;
use crate::three_point::{LikelihoodComponents, ThreePointWorkspace};
use crate::weight_matrix::build_weight_matrix_into;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use tree_util::PhyloTree;

/// Distribution of the root state under OU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootTreatment {
    /// root fixed at the root regime's optimum
    #[default]
    Fixed,
    /// root drawn from the stationary distribution
    Stationary,
}

/// Parameters of one likelihood evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    /// OU reversion strength; zero means Brownian motion
    pub alpha: f64,
    /// diffusion rate σ²
    pub sigma2: f64,
    /// one optimum per regime; under BM only the root regime's entry is
    /// used, as the root state
    pub theta: Vec<f64>,
}

impl ModelParameters {
    pub fn brownian(sigma2: f64, root_state: f64) -> Self {
        ModelParameters {
            alpha: 0.0,
            sigma2,
            theta: vec![root_state],
        }
    }

    pub fn ou(alpha: f64, sigma2: f64, theta: Vec<f64>) -> Self {
        ModelParameters {
            alpha,
            sigma2,
            theta,
        }
    }
}

/// GLS fit of the optima at fixed α
#[derive(Debug, Clone)]
pub struct GlsFit {
    pub theta: DVector<f64>,
    /// maximum-likelihood σ² = r'V⁻¹r / n
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub components: LikelihoodComponents,
}

pub struct TraitLikelihood<'a> {
    tree: &'a PhyloTree,
    traits: &'a [f64],
    painting: RegimePainting,
    root: RootTreatment,
    measurement_var: Option<Vec<f64>>,
    lengths: TransformedLengths,
    weights: DMatrix<f64>,
    residual: Vec<f64>,
    workspace: ThreePointWorkspace,
}

impl<'a> TraitLikelihood<'a> {
    /// * `tree` - the shared tree
    /// * `traits` - one value per tip in tip order
    pub fn new(tree: &'a PhyloTree, traits: &'a [f64]) -> Result<Self> {
        if traits.len() != tree.n_tips() {
            return Err(malformed(format!(
                "{} trait values for {} tips",
                traits.len(),
                tree.n_tips()
            )));
        }
        Ok(TraitLikelihood {
            tree,
            traits,
            painting: RegimePainting::single_regime(tree),
            root: RootTreatment::default(),
            measurement_var: None,
            lengths: TransformedLengths::default(),
            weights: DMatrix::zeros(0, 0),
            residual: vec![0.0; traits.len()],
            workspace: ThreePointWorkspace::new(tree, 0),
        })
    }

    pub fn with_painting(mut self, painting: RegimePainting) -> Result<Self> {
        self.set_painting(painting)?;
        Ok(self)
    }

    pub fn with_root(mut self, root: RootTreatment) -> Self {
        self.root = root;
        self
    }

    /// Per-tip measurement standard errors, added as `se²` to the tip
    /// variances
    pub fn with_measurement_error(mut self, se: &[f64]) -> Result<Self> {
        if se.len() != self.tree.n_tips() {
            return Err(malformed(format!(
                "{} standard errors for {} tips",
                se.len(),
                self.tree.n_tips()
            )));
        }
        if se.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(malformed("standard errors must be finite and non-negative"));
        }
        self.measurement_var = Some(se.iter().map(|s| s * s).collect());
        Ok(self)
    }

    /// Swap in a new painting, e.g. after a shift proposal
    pub fn set_painting(&mut self, painting: RegimePainting) -> Result<()> {
        painting.check_tree(self.tree)?;
        self.painting = painting;
        Ok(())
    }

    pub fn painting(&self) -> &RegimePainting {
        &self.painting
    }

    fn branch_model(&self, alpha: f64) -> BranchModel {
        if alpha == 0.0 {
            BranchModel::Brownian
        } else {
            match self.root {
                RootTreatment::Fixed => BranchModel::OuFixedRoot,
                RootTreatment::Stationary => BranchModel::OuRandomRoot,
            }
        }
    }

    fn check_params(&self, params: &ModelParameters) -> Result<()> {
        if !params.alpha.is_finite() || params.alpha < 0.0 {
            return Err(invalid_config(format!("alpha = {}", params.alpha)));
        }
        if !params.sigma2.is_finite() || params.sigma2 <= 0.0 {
            return Err(invalid_config(format!("sigma2 = {}", params.sigma2)));
        }
        if params.theta.len() != self.painting.n_regimes() {
            return Err(invalid_config(format!(
                "{} optima for {} regimes",
                params.theta.len(),
                self.painting.n_regimes()
            )));
        }
        if params.theta.iter().any(|x| !x.is_finite()) {
            return Err(invalid_config("non-finite optimum"));
        }
        Ok(())
    }

    /// Transform branches for `alpha` and fold in measurement error
    /// scaled by `sigma2`
    fn prepare_lengths(&mut self, alpha: f64, sigma2: Option<f64>) -> Result<()> {
        let model = self.branch_model(alpha);
        model.transform_into(self.tree, &[], alpha, &mut self.lengths)?;

        if let Some(se2) = self.measurement_var.as_ref() {
            let sigma2 = sigma2.ok_or_else(|| {
                invalid_config("measurement error needs a fixed sigma2")
            })?;
            for (slot, &tip) in self.tree.tips().iter().enumerate() {
                let scale = self.lengths.tip_log_scale.get(slot).copied().unwrap_or(0.0);
                self.lengths.edge[tip] += se2[slot] / (sigma2 * (2.0 * scale).exp());
            }
        }
        Ok(())
    }

    /// Log-likelihood components on the residual `y - Wθ`, per unit σ²
    pub fn components(&mut self, params: &ModelParameters) -> Result<LikelihoodComponents> {
        self.check_params(params)?;

        build_weight_matrix_into(self.tree, &self.painting, params.alpha, &mut self.weights)?;

        for (i, r) in self.residual.iter_mut().enumerate() {
            let mean: f64 = (0..self.weights.ncols())
                .map(|j| self.weights[(i, j)] * params.theta[j])
                .sum();
            *r = self.traits[i] - mean;
        }

        self.prepare_lengths(params.alpha, Some(params.sigma2))?;

        self.workspace
            .evaluate(self.tree, &self.lengths, &self.residual, None)
    }

    /// Gaussian log-likelihood at `params`
    pub fn evaluate(&mut self, params: &ModelParameters) -> Result<f64> {
        let comp = self.components(params)?;
        Ok(comp.log_likelihood(self.traits.len(), params.sigma2))
    }

    /// GLS optima and ML σ² at fixed α.
    ///
    /// At α = 0 regime identity drops out of the mean, so only a
    /// single-regime painting can be fitted there.
    pub fn fit_gls(&mut self, alpha: f64) -> Result<GlsFit> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(invalid_config(format!("alpha = {}", alpha)));
        }
        if alpha == 0.0 && self.painting.n_regimes() > 1 {
            return Err(invalid_config(
                "regime optima are not identifiable under Brownian motion",
            ));
        }

        build_weight_matrix_into(self.tree, &self.painting, alpha, &mut self.weights)?;
        self.prepare_lengths(alpha, None)?;

        let comp = self.workspace.evaluate(
            self.tree,
            &self.lengths,
            self.traits,
            Some(&self.weights),
        )?;

        let n = self.traits.len() as f64;
        let sigma2 = comp.quadratic_form / n;
        if sigma2.is_nan() || sigma2 <= 0.0 {
            return Err(degenerate(format!(
                "residual quadratic form {} leaves no variance to estimate",
                comp.quadratic_form
            )));
        }
        let log_likelihood = -0.5 * (n * (2.0 * PI).ln() + n * sigma2.ln() + comp.log_det + n);
        let theta = comp
            .gls_estimate
            .clone()
            .ok_or_else(|| degenerate("no GLS estimate"))?;

        log::debug!(
            "GLS at alpha = {}: sigma2 = {:.6}, log L = {:.6}",
            alpha,
            sigma2,
            log_likelihood
        );

        Ok(GlsFit {
            theta,
            sigma2,
            log_likelihood,
            components: comp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::Shift;
    use approx::assert_relative_eq;

    /// ((0:1,1:1)3:1,2:2)4;
    fn three_tip() -> PhyloTree {
        PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 2.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_brownian_log_likelihood() {
        let tree = three_tip();
        let y = [0.0, 2.0, 4.0];
        let mut lik = TraitLikelihood::new(&tree, &y).unwrap();
        let sigma2 = 1.5;
        let x0 = 1.0;
        let ll = lik.evaluate(&ModelParameters::brownian(sigma2, x0)).unwrap();

        // r = (-1, 1, 3); r'V⁻¹r = (2+2+2)/3 + 9/2 = 2 + 4.5
        let q = 2.0 + 4.5;
        let expected = -0.5 * (3.0 * (2.0 * PI).ln() + 3.0 * sigma2.ln() + 6f64.ln() + q / sigma2);
        assert_relative_eq!(ll, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_components_give_same_log_likelihood() {
        let tree = three_tip();
        let y = [0.3, -1.0, 2.5];
        let se = [0.1, 0.0, 0.4];
        let mut lik = TraitLikelihood::new(&tree, &y)
            .unwrap()
            .with_measurement_error(&se)
            .unwrap();
        let params = ModelParameters::ou(0.8, 2.0, vec![0.5]);
        let comp = lik.components(&params).unwrap();
        let ll = lik.evaluate(&params).unwrap();
        assert_eq!(comp.log_likelihood(y.len(), params.sigma2), ll);
    }

    #[test]
    fn test_continuity_at_alpha_zero() {
        let tree = three_tip();
        let y = [0.0, 2.0, 4.0];
        let mut lik = TraitLikelihood::new(&tree, &y).unwrap();
        let bm = lik.evaluate(&ModelParameters::brownian(1.0, 1.0)).unwrap();
        let ou = lik
            .evaluate(&ModelParameters::ou(1e-9, 1.0, vec![1.0]))
            .unwrap();
        assert_relative_eq!(bm, ou, max_relative = 1e-7);
    }

    #[test]
    fn test_measurement_error_adds_tip_variance() {
        let tree = three_tip();
        let y = [0.0, 2.0, 4.0];
        let se = [0.0, 0.0, 1.0];

        // se² = 1 at tip 2 under σ² = 1 is the same as a tip branch of 3
        let longer = PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 3.0, 1.0, 0.0],
        )
        .unwrap();

        let params = ModelParameters::brownian(1.0, 0.5);
        let a = TraitLikelihood::new(&tree, &y)
            .unwrap()
            .with_measurement_error(&se)
            .unwrap()
            .evaluate(&params)
            .unwrap();
        let b = TraitLikelihood::new(&longer, &y)
            .unwrap()
            .evaluate(&params)
            .unwrap();
        assert_relative_eq!(a, b, max_relative = 1e-12);
    }

    #[test]
    fn test_gls_fit_maximizes_over_theta_and_sigma2() {
        let tree = three_tip();
        let y = [0.0, 2.0, 4.0];
        let paint = RegimePainting::from_shifts(
            &tree,
            2,
            0,
            &[Shift {
                node: 2,
                position: 0.5,
                regime: 1,
            }],
        )
        .unwrap();
        let mut lik = TraitLikelihood::new(&tree, &y)
            .unwrap()
            .with_painting(paint)
            .unwrap();
        let alpha = 0.9;
        let fit = lik.fit_gls(alpha).unwrap();
        let theta: Vec<f64> = fit.theta.iter().copied().collect();
        let at_fit = lik
            .evaluate(&ModelParameters::ou(alpha, fit.sigma2, theta.clone()))
            .unwrap();
        assert_relative_eq!(at_fit, fit.log_likelihood, max_relative = 1e-10);

        for (dt, ds) in [(0.1, 0.0), (-0.1, 0.0), (0.0, 0.2), (0.0, -0.2)] {
            let moved = vec![theta[0] + dt, theta[1] - dt];
            let ll = lik
                .evaluate(&ModelParameters::ou(alpha, fit.sigma2 + ds, moved))
                .unwrap();
            assert!(ll <= fit.log_likelihood + 1e-12);
        }
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let tree = three_tip();
        let y = [0.0, 2.0, 4.0];
        let mut lik = TraitLikelihood::new(&tree, &y).unwrap();

        for params in [
            ModelParameters::ou(-1.0, 1.0, vec![0.0]),
            ModelParameters::ou(1.0, 0.0, vec![0.0]),
            ModelParameters::ou(1.0, 1.0, vec![0.0, 1.0]),
            ModelParameters::ou(1.0, 1.0, vec![f64::NAN]),
        ] {
            let err = lik.evaluate(&params).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        }

        assert_eq!(
            TraitLikelihood::new(&tree, &y[..2]).err().map(|e| e.kind()),
            Some(ErrorKind::MalformedInput)
        );

        let paint = RegimePainting::from_branch_regimes(&tree, 2, &[1, 1, 0, 1, 0]).unwrap();
        let mut lik = lik.with_painting(paint).unwrap();
        assert_eq!(lik.fit_gls(0.0).unwrap_err().kind(), ErrorKind::InvalidConfig);
    }
}
