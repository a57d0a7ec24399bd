//! Tab-delimited tables for trees and per-tip values.
//!
//! Edge table, one line per node:
//! ```text
//! node  parent  length
//! ```
//! with `parent` set to `-1` or `NA` for the root. Per-tip table:
//! ```text
//! node  value
//! ```
//! Lines starting with `#` or `%` are ignored; `.gz` files are
//! decompressed on the fly.

use crate::common_io::*;
use crate::tree::{NodeId, PhyloTree};
use log::info;

fn parse_node(word: &str, line: usize) -> anyhow::Result<NodeId> {
    word.parse::<NodeId>()
        .map_err(|e| anyhow::anyhow!("line {}: bad node id `{}`: {}", line, word, e))
}

fn parse_value(word: &str, line: usize) -> anyhow::Result<f64> {
    word.parse::<f64>()
        .map_err(|e| anyhow::anyhow!("line {}: bad number `{}`: {}", line, word, e))
}

fn is_missing_parent(word: &str) -> bool {
    word.eq_ignore_ascii_case("na") || word.starts_with('-')
}

///
/// Read a tree from an edge table
///
/// * `file` - `node parent length` lines, gzipped or not
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_edge_table(file: &str, hdr_line: i64) -> anyhow::Result<PhyloTree> {
    let ReadLinesOut { lines, .. } = read_lines_of_words(file, hdr_line)?;

    let n_nodes = lines.len();
    let mut parent = vec![None; n_nodes];
    let mut edge_length = vec![0.0; n_nodes];
    let mut seen = vec![false; n_nodes];

    for (i, words) in lines.iter().enumerate() {
        if words.len() < 3 {
            anyhow::bail!("line {}: expected `node parent length`", i);
        }
        let node = parse_node(&words[0], i)?;
        if node >= n_nodes || seen[node] {
            anyhow::bail!(
                "line {}: node {} repeated or outside 0..{}",
                i,
                node,
                n_nodes
            );
        }
        seen[node] = true;
        parent[node] = if is_missing_parent(&words[1]) {
            None
        } else {
            Some(parse_node(&words[1], i)?)
        };
        edge_length[node] = parse_value(&words[2], i)?;
    }

    let tree = PhyloTree::from_parents(parent, edge_length)?;
    info!(
        "Read a tree of {} tips ({} nodes) from {}",
        tree.n_tips(),
        tree.n_nodes(),
        file
    );
    Ok(tree)
}

///
/// Write the tree as an edge table
///
/// * `lengths` - one branch length per node (the tree's own, or transformed)
/// * `tip_column` - optional extra per-tip column in tip order; internal
///   nodes get `NA`
///
pub fn write_edge_table(
    tree: &PhyloTree,
    lengths: &[f64],
    tip_column: Option<&[f64]>,
    file: &str,
) -> anyhow::Result<()> {
    if lengths.len() != tree.n_nodes() {
        anyhow::bail!("{} lengths for {} nodes", lengths.len(), tree.n_nodes());
    }
    if let Some(col) = tip_column {
        if col.len() != tree.n_tips() {
            anyhow::bail!("{} tip entries for {} tips", col.len(), tree.n_tips());
        }
    }

    let na = || "NA".to_string();
    let lines: Vec<Box<str>> = (0..tree.n_nodes())
        .map(|v| {
            let parent = tree.parent(v).map_or_else(na, |p| p.to_string());
            let mut line = format!("{}\t{}\t{}", v, parent, lengths[v]);
            if let Some(col) = tip_column {
                let x = tree.tip_slot(v).map_or_else(na, |i| col[i].to_string());
                line.push('\t');
                line.push_str(&x);
            }
            line.into_boxed_str()
        })
        .collect();
    write_types(&lines, file)
}

///
/// Read one value per tip, aligned to the tree's tip order
///
/// * `file` - `node value` lines; every tip must appear exactly once
/// * `tree` - tree supplying the tip order
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_tip_values(file: &str, tree: &PhyloTree, hdr_line: i64) -> anyhow::Result<Vec<f64>> {
    let ReadLinesOut { lines, .. } = read_lines_of_words(file, hdr_line)?;

    let mut values = vec![f64::NAN; tree.n_tips()];
    let mut seen = vec![false; tree.n_tips()];

    for (i, words) in lines.iter().enumerate() {
        if words.len() < 2 {
            anyhow::bail!("line {}: expected `node value`", i);
        }
        let node = parse_node(&words[0], i)?;
        let slot = (node < tree.n_nodes())
            .then(|| tree.tip_slot(node))
            .flatten()
            .ok_or_else(|| anyhow::anyhow!("line {}: node {} is not a tip", i, node))?;
        if seen[slot] {
            anyhow::bail!("line {}: tip {} listed twice", i, node);
        }
        seen[slot] = true;
        values[slot] = parse_value(&words[1], i)?;
    }

    if let Some(slot) = seen.iter().position(|&x| !x) {
        anyhow::bail!("tip {} has no value in {}", tree.tips()[slot], file);
    }

    Ok(values)
}
