//! Likelihood kernels for continuous traits on phylogenies.
//!
//! Brownian motion and Ornstein-Uhlenbeck models with regime shifts are
//! evaluated in time linear in the number of tips:
//!
//! - [`branch_transform`] turns divergence times into covariance units
//! - [`weight_matrix`] maps regime optima to expected tip values
//! - [`three_point`] computes `log det V`, `r'V⁻¹r` and GLS estimates
//!   without forming `V`
//!
//! [`likelihood`] strings the three together with reusable buffers, and
//! [`simulate`] draws trait data from the same models.

/// Typed errors, split into malformed input, invalid configuration and
/// numerical degeneracy
pub mod error;

/// Branch-length transforms for BM, OU, early burst and δ
pub mod branch_transform;

/// Regime paintings with shifts along branches
pub mod regime;

/// Tip × regime weights of the OU expectation
pub mod weight_matrix;

/// Three-point pruning for Gaussian tree likelihoods
pub mod three_point;

/// Log-likelihood assembly and GLS fits
pub mod likelihood;

/// Trait simulation under the same models
pub mod simulate;


pub use branch_transform::{BranchModel, TransformedLengths};
pub use error::{ErrorKind, Result, TraitModelError};
pub use likelihood::{GlsFit, ModelParameters, RootTreatment, TraitLikelihood};
pub use regime::{RegimePainting, Shift};
pub use simulate::TraitSimulator;
pub use three_point::{three_point_evaluate, LikelihoodComponents, ThreePointWorkspace};
pub use weight_matrix::{build_weight_matrix, build_weight_matrix_into};

use tree_util::PhyloTree;

/// Transform branch lengths for the model with integer code `model_code`.
///
/// * `aux` - node depths, or empty to use the tree's own
/// * `alpha` - the model's rate parameter
///
/// Unknown codes are rejected as an invalid configuration.
pub fn transform_branch_lengths(
    tree: &PhyloTree,
    model_code: i32,
    aux: &[f64],
    alpha: f64,
) -> Result<TransformedLengths> {
    BranchModel::from_code(model_code)?.transform(tree, aux, alpha)
}
