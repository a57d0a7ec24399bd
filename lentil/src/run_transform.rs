use crate::lentil_common::*;

#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Tree edge table (`node parent length`)
    #[arg(required = true)]
    tree_file: Box<str>,

    /// Model code: 0 BM, 1 OU, 2 OU fixed root, 3 OU stationary root,
    /// 4 early burst, 5 delta
    #[arg(long, short = 'm', default_value_t = 0)]
    model: i32,

    /// α for OU, rate for early burst, δ for delta
    #[arg(long, short = 'a', default_value_t = 0.0)]
    alpha: f64,

    /// Optional `node depth` table overriding the tree's node depths
    #[arg(long)]
    depth_file: Option<Box<str>>,

    /// Output file (`.gz` ok, `stdout` for the console)
    #[arg(long, short, default_value = "stdout")]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_transform(args: &TransformArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);

    let tree = read_edge_table(&args.tree_file, -1)?;
    let model = BranchModel::from_code(args.model)?;

    let depths = match args.depth_file.as_deref() {
        Some(file) => read_node_values(file, &tree)?,
        None => vec![],
    };

    info!("{} transform at parameter {}", model.name(), args.alpha);
    let lengths = trait_model::transform_branch_lengths(&tree, args.model, &depths, args.alpha)?;

    let tip_scale = lengths
        .has_tip_scale()
        .then_some(lengths.tip_log_scale.as_slice());

    mkdir(&args.out)?;
    write_edge_table(&tree, &lengths.edge, tip_scale, &args.out)?;
    info!("Wrote transformed lengths to {}", args.out);
    Ok(())
}

/// `node value` lines covering every node
fn read_node_values(file: &str, tree: &PhyloTree) -> anyhow::Result<Vec<f64>> {
    let ReadLinesOut { lines, .. } = read_lines_of_words(file, -1)?;
    let mut values = vec![f64::NAN; tree.n_nodes()];
    for (i, words) in lines.iter().enumerate() {
        if words.len() < 2 {
            anyhow::bail!("line {}: expected `node value`", i);
        }
        let node: usize = words[0].parse()?;
        if node >= tree.n_nodes() {
            anyhow::bail!("line {}: node {} not in the tree", i, node);
        }
        values[node] = words[1].parse()?;
    }
    if let Some(v) = values.iter().position(|x| x.is_nan()) {
        anyhow::bail!("node {} has no value in {}", v, file);
    }
    Ok(values)
}
