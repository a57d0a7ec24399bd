use crate::lentil_common::*;

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Tree edge table (`node parent length`)
    #[arg(required = true)]
    tree_file: Box<str>,

    /// Trait table: `node value` lines, one per tip
    #[arg(required = true)]
    trait_file: Box<str>,

    #[command(flatten)]
    painting: PaintingArgs,

    /// OU strength of selection α (0 = Brownian motion)
    #[arg(long, short = 'a', default_value_t = 0.0)]
    alpha: f64,

    /// Root state under OU
    #[arg(long, value_enum, default_value_t = RootArg::Fixed)]
    root: RootArg,

    /// Measurement standard errors: `node se` lines, one per tip
    #[arg(long)]
    se_file: Option<Box<str>>,

    /// Diffusion rate σ²; fitted by GLS together with the optima if
    /// either is missing
    #[arg(long)]
    sigma2: Option<f64>,

    /// Regime optima (comma-separated, one per regime)
    #[arg(long, value_delimiter(','))]
    theta: Option<Vec<f64>>,

    /// Output file of `key value` lines
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_eval(args: &EvalArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let tree = read_edge_table(&args.tree_file, -1)?;
    let traits = read_tip_values(&args.trait_file, &tree, -1)?;
    let painting = args.painting.build(&tree)?;

    let mut lik = TraitLikelihood::new(&tree, &traits)?
        .with_painting(painting)?
        .with_root(args.root.into());

    let se = match args.se_file.as_deref() {
        Some(file) => Some(read_tip_values(file, &tree, -1)?),
        None => None,
    };
    if let Some(se) = se.as_ref() {
        lik = lik.with_measurement_error(se)?;
    }

    let mut lines: Vec<Box<str>> = vec![];
    let mut push = |key: &str, value: f64| {
        lines.push(format!("{}\t{}", key, value).into_boxed_str());
    };

    match (args.sigma2, args.theta.as_ref()) {
        (Some(sigma2), Some(theta)) => {
            let params = ModelParameters::ou(args.alpha, sigma2, theta.clone());
            let comp = lik.components(&params)?;
            let log_lik = comp.log_likelihood(traits.len(), sigma2);
            info!("log-likelihood: {}", log_lik);
            push("log_det", comp.log_det);
            push("quadratic_form", comp.quadratic_form);
            push("sigma2", sigma2);
            for (j, t) in theta.iter().enumerate() {
                push(&format!("theta_{}", j), *t);
            }
            push("log_likelihood", log_lik);
        }
        _ => {
            if se.is_some() {
                anyhow::bail!("measurement error needs --sigma2 and --theta");
            }
            let fit = lik.fit_gls(args.alpha)?;
            info!(
                "GLS fit: sigma2 = {}, log-likelihood = {}",
                fit.sigma2, fit.log_likelihood
            );
            push("log_det", fit.components.log_det);
            push("quadratic_form", fit.components.quadratic_form);
            push("sigma2", fit.sigma2);
            for (j, t) in fit.theta.iter().enumerate() {
                push(&format!("theta_{}", j), *t);
            }
            push("log_likelihood", fit.log_likelihood);
        }
    }

    write_output(&lines, &args.out)?;
    Ok(())
}
