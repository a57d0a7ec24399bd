use crate::lentil_common::*;

#[derive(Args, Debug)]
pub struct WeightsArgs {
    /// Tree edge table (`node parent length`)
    #[arg(required = true)]
    tree_file: Box<str>,

    #[command(flatten)]
    painting: PaintingArgs,

    /// OU strength of selection α
    #[arg(long, short = 'a', required = true)]
    alpha: f64,

    /// Output file: one line per tip, node id then one weight per regime
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_weights(args: &WeightsArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let tree = read_edge_table(&args.tree_file, -1)?;
    let painting = args.painting.build(&tree)?;

    let weights = trait_model::build_weight_matrix(&tree, &painting, args.alpha)?;
    info!("Weights: {} x {}", weights.nrows(), weights.ncols());

    write_output(&tip_rows(&tree, &weights), &args.out)?;
    Ok(())
}
