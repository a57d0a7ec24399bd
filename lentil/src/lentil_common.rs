pub use clap::{Args, Parser, Subcommand, ValueEnum};
pub use log::info;

pub use trait_model::{
    BranchModel, ModelParameters, RegimePainting, RootTreatment, Shift, TraitLikelihood,
};
pub use tree_util::common_io::{mkdir, read_lines_of_words, write_types, ReadLinesOut};
pub use tree_util::tree_io::*;
pub use tree_util::PhyloTree;

/// Write lines to `out`, creating its directory first
pub fn write_output(lines: &[Box<str>], out: &str) -> anyhow::Result<()> {
    mkdir(out)?;
    write_types(lines, out)?;
    info!("Wrote {} lines to {}", lines.len(), out);
    Ok(())
}

pub fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
#[clap(rename_all = "lowercase")]
pub enum RootArg {
    /// root at the root regime's optimum
    #[default]
    Fixed,
    /// root from the stationary distribution
    Stationary,
}

impl From<RootArg> for RootTreatment {
    fn from(x: RootArg) -> Self {
        match x {
            RootArg::Fixed => RootTreatment::Fixed,
            RootArg::Stationary => RootTreatment::Stationary,
        }
    }
}

/// Regime painting options shared by subcommands
#[derive(Args, Debug, Clone)]
pub struct PaintingArgs {
    /// Shift table: `node position regime` lines. Without one, the whole
    /// tree is in the root regime.
    #[arg(long, short = 's')]
    pub shift_file: Option<Box<str>>,

    /// Number of regimes (default: largest regime id in the shift table + 1)
    #[arg(long)]
    pub n_regimes: Option<usize>,

    /// Regime at the root
    #[arg(long, default_value_t = 0)]
    pub root_regime: usize,
}

///
/// Read regime shifts
///
/// * `file` - `node position regime` lines, gzipped or not
///
pub fn read_shift_table(file: &str, tree: &PhyloTree) -> anyhow::Result<Vec<Shift>> {
    let ReadLinesOut { lines, .. } = read_lines_of_words(file, -1)?;

    let mut shifts = Vec::with_capacity(lines.len());
    for (i, words) in lines.iter().enumerate() {
        if words.len() < 3 {
            anyhow::bail!("line {}: expected `node position regime`", i);
        }
        let node: usize = words[0]
            .parse()
            .map_err(|e| anyhow::anyhow!("line {}: bad node `{}`: {}", i, words[0], e))?;
        if node >= tree.n_nodes() {
            anyhow::bail!("line {}: node {} not in the tree", i, node);
        }
        let position: f64 = words[1]
            .parse()
            .map_err(|e| anyhow::anyhow!("line {}: bad position `{}`: {}", i, words[1], e))?;
        let regime: usize = words[2]
            .parse()
            .map_err(|e| anyhow::anyhow!("line {}: bad regime `{}`: {}", i, words[2], e))?;
        shifts.push(Shift {
            node,
            position,
            regime,
        });
    }
    info!("Read {} shifts from {}", shifts.len(), file);
    Ok(shifts)
}

impl PaintingArgs {
    pub fn build(&self, tree: &PhyloTree) -> anyhow::Result<RegimePainting> {
        let shifts = match self.shift_file.as_deref() {
            Some(file) => read_shift_table(file, tree)?,
            None => vec![],
        };

        let n_regimes = self.n_regimes.unwrap_or_else(|| {
            shifts
                .iter()
                .map(|s| s.regime)
                .chain(std::iter::once(self.root_regime))
                .max()
                .map_or(1, |x| x + 1)
        });

        let painting = RegimePainting::from_shifts(tree, n_regimes, self.root_regime, &shifts)?;
        info!(
            "Painted {} regimes with {} shifts",
            painting.n_regimes(),
            shifts.len()
        );
        Ok(painting)
    }
}

/// One line per tip: node id followed by the row
pub fn tip_rows(tree: &PhyloTree, mat: &nalgebra::DMatrix<f64>) -> Vec<Box<str>> {
    tree.tips()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let row: Vec<String> = mat.row(i).iter().map(|x| x.to_string()).collect();
            format!("{}\t{}", v, row.join("\t")).into_boxed_str()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// ((0:1,1:1)3:1,2:2)4;
    fn three_tip() -> PhyloTree {
        PhyloTree::from_parents(
            vec![Some(3), Some(3), Some(4), Some(4), None],
            vec![1.0, 1.0, 2.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_shift_table_to_painting() -> anyhow::Result<()> {
        let tree = three_tip();
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# node position regime")?;
        writeln!(file, "3\t0.5\t1")?;
        writeln!(file, "2\t0\t2")?;
        file.flush()?;
        let path = file.path().to_str().unwrap().to_string();

        let args = PaintingArgs {
            shift_file: Some(path.into_boxed_str()),
            n_regimes: None,
            root_regime: 0,
        };
        let painting = args.build(&tree)?;
        assert_eq!(painting.n_regimes(), 3);
        assert_eq!(painting.end_regime(0), 1);
        assert_eq!(painting.end_regime(2), 2);
        assert_eq!(painting.regime_at(3, 0.25), 0);
        Ok(())
    }

    #[test]
    fn test_bad_shift_lines() -> anyhow::Result<()> {
        let tree = three_tip();
        for body in ["3\t0.5", "9\t0.5\t1", "3\tx\t1"] {
            let mut file = tempfile::NamedTempFile::new()?;
            writeln!(file, "{}", body)?;
            file.flush()?;
            assert!(read_shift_table(file.path().to_str().unwrap(), &tree).is_err());
        }
        Ok(())
    }

    #[test]
    fn test_no_shift_file_is_single_regime() -> anyhow::Result<()> {
        let tree = three_tip();
        let args = PaintingArgs {
            shift_file: None,
            n_regimes: None,
            root_regime: 0,
        };
        let painting = args.build(&tree)?;
        assert_eq!(painting.n_regimes(), 1);
        Ok(())
    }
}
