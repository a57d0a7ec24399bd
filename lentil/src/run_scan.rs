use crate::lentil_common::*;
use rayon::prelude::*;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Tree edge table (`node parent length`)
    #[arg(required = true)]
    tree_file: Box<str>,

    /// Trait table: `node value` lines, one per tip
    #[arg(required = true)]
    trait_file: Box<str>,

    #[command(flatten)]
    painting: PaintingArgs,

    /// Smallest α on the grid
    #[arg(long, default_value_t = 1e-3)]
    alpha_min: f64,

    /// Largest α on the grid
    #[arg(long, default_value_t = 10.0)]
    alpha_max: f64,

    /// Number of log-spaced grid points
    #[arg(long, short = 'n', default_value_t = 50)]
    n_grid: usize,

    /// Root state under OU
    #[arg(long, value_enum, default_value_t = RootArg::Fixed)]
    root: RootArg,

    /// Output file: `alpha sigma2 log_likelihood theta...` per grid point
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// `n` log-spaced points from `lb` to `ub`
pub fn log_grid(lb: f64, ub: f64, n: usize) -> anyhow::Result<Vec<f64>> {
    if !(lb > 0.0 && ub >= lb && ub.is_finite()) {
        anyhow::bail!("need 0 < alpha_min <= alpha_max, got [{}, {}]", lb, ub);
    }
    if n == 0 {
        anyhow::bail!("empty grid");
    }
    if n == 1 {
        return Ok(vec![lb]);
    }
    let (a, b) = (lb.ln(), ub.ln());
    let step = (b - a) / (n - 1) as f64;
    Ok((0..n).map(|k| (a + step * k as f64).exp()).collect())
}

pub fn run_scan(args: &ScanArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let tree = read_edge_table(&args.tree_file, -1)?;
    let traits = read_tip_values(&args.trait_file, &tree, -1)?;
    let painting = args.painting.build(&tree)?;
    let root: RootTreatment = args.root.into();

    let grid = log_grid(args.alpha_min, args.alpha_max, args.n_grid)?;
    info!("Scanning {} values of alpha ...", grid.len());

    let fits = grid
        .par_iter()
        .map(|&alpha| -> anyhow::Result<(f64, trait_model::GlsFit)> {
            let mut lik = TraitLikelihood::new(&tree, &traits)?
                .with_painting(painting.clone())?
                .with_root(root);
            Ok((alpha, lik.fit_gls(alpha)?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if let Some((alpha, best)) = fits
        .iter()
        .max_by(|a, b| a.1.log_likelihood.total_cmp(&b.1.log_likelihood))
    {
        info!(
            "Best alpha = {}: sigma2 = {}, log-likelihood = {}",
            alpha, best.sigma2, best.log_likelihood
        );
    }

    let lines: Vec<Box<str>> = fits
        .iter()
        .map(|(alpha, fit)| {
            let theta: Vec<String> = fit.theta.iter().map(|x| x.to_string()).collect();
            format!(
                "{}\t{}\t{}\t{}",
                alpha,
                fit.sigma2,
                fit.log_likelihood,
                theta.join("\t")
            )
            .into_boxed_str()
        })
        .collect();

    write_output(&lines, &args.out)?;
    Ok(())
}
