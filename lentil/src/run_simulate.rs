use crate::lentil_common::*;
use trait_model::TraitSimulator;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Tree edge table (`node parent length`)
    #[arg(required = true)]
    tree_file: Box<str>,

    #[command(flatten)]
    painting: PaintingArgs,

    /// OU strength of selection α (0 = Brownian motion)
    #[arg(long, short = 'a', default_value_t = 0.0)]
    alpha: f64,

    /// Diffusion rate σ²
    #[arg(long, default_value_t = 1.0)]
    sigma2: f64,

    /// Regime optima (comma-separated, one per regime); the root regime's
    /// entry is the root state
    #[arg(long, value_delimiter(','), required = true)]
    theta: Vec<f64>,

    /// Number of replicates
    #[arg(long, short = 'r', default_value_t = 1)]
    n_replicates: usize,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,

    /// Output file: one line per tip, node id then one value per replicate
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let tree = read_edge_table(&args.tree_file, -1)?;
    let painting = args.painting.build(&tree)?;
    let params = ModelParameters::ou(args.alpha, args.sigma2, args.theta.clone());

    let sim = TraitSimulator::new(&tree, &painting, &params)?;
    info!("Simulating {} replicates ...", args.n_replicates);
    let draws = sim.sample_replicates(args.n_replicates, args.rseed);

    let tips_by_reps =
        nalgebra::DMatrix::from_fn(tree.n_tips(), args.n_replicates, |i, r| draws[r][i]);

    write_output(&tip_rows(&tree, &tips_by_reps), &args.out)?;
    Ok(())
}
