mod lentil_common;
mod run_eval;
mod run_scan;
mod run_simulate;
mod run_transform;
mod run_weights;

use lentil_common::*;
use run_eval::*;
use run_scan::*;
use run_simulate::*;
use run_transform::*;
use run_weights::*;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Likelihoods of continuous traits on trees\n\
		  Brownian motion and Ornstein-Uhlenbeck models with regime shifts,\n\
		  evaluated in linear time by the three-point algorithm.\n\
		  Trees are edge tables of `node parent length` lines (`.gz` ok)."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Transform branch lengths under a model",
        long_about = "Transform branch lengths under a model code:\n\
		      0 = BM, 1 = OU per branch, 2 = OU with fixed root,\n\
		      3 = OU with stationary root, 4 = early burst, 5 = delta.\n\
		      The output is itself an edge table, with tip log scales\n\
		      in a fourth column when the model needs them.\n"
    )]
    Transform(TransformArgs),

    #[command(
        about = "Tip × regime weight matrix of an OU painting",
        long_about = "Compute the weights mapping regime optima to expected tip values.\n\
		      Shifts are `node position regime` lines, with positions\n\
		      measured from the rootward end of the branch.\n"
    )]
    Weights(WeightsArgs),

    #[command(
        about = "Evaluate the log-likelihood of tip traits",
        long_about = "Evaluate the log-likelihood of tip traits at given parameters,\n\
		      or fit the optima and σ² by GLS at a fixed α\n\
		      when they are not given.\n",
        visible_alias = "eval"
    )]
    Evaluate(EvalArgs),

    #[command(
        about = "Profile log-likelihood over a grid of α",
        long_about = "Fit optima and σ² by GLS at each α on a log-spaced grid.\n\
		      Grid points are evaluated in parallel.\n"
    )]
    Scan(ScanArgs),

    /// simulate tip traits under BM/OU with regime shifts
    Simulate(SimulateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Transform(args) => {
            run_transform(args)?;
        }
        Commands::Weights(args) => {
            run_weights(args)?;
        }
        Commands::Evaluate(args) => {
            run_eval(args)?;
        }
        Commands::Scan(args) => {
            run_scan(args)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
    }

    info!("Done");
    Ok(())
}
