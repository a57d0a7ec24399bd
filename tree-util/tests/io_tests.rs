use approx::assert_abs_diff_eq;
use tree_util::common_io::*;
use tree_util::tree_io::*;
use tree_util::PhyloTree;

fn sample_tree() -> PhyloTree {
    PhyloTree::from_parents(
        vec![Some(3), Some(3), Some(4), Some(4), None],
        vec![1.0, 1.0, 2.0, 1.0, 0.0],
    )
    .unwrap()
}

#[test]
fn edge_table_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    for name in ["tree.tsv", "tree.tsv.gz"] {
        let file = dir.path().join(name);
        let file = file.to_str().unwrap();
        let tree = sample_tree();
        write_edge_table(&tree, tree.edge_lengths(), None, file)?;
        let back = read_edge_table(file, -1)?;
        assert_eq!(back.root(), tree.root());
        assert_eq!(back.tips(), tree.tips());
        for v in 0..tree.n_nodes() {
            assert_eq!(back.parent(v), tree.parent(v));
            assert_abs_diff_eq!(back.edge_length(v), tree.edge_length(v));
        }
    }
    Ok(())
}

#[test]
fn edge_table_with_header_and_comments() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("tree.tsv");
    std::fs::write(
        &file,
        "# a comment\nnode\tparent\tlength\n4\t-1\t0\n3\t4\t1\n0\t3\t1\n1\t3\t1\n2\t4\t2\n",
    )?;
    let tree = read_edge_table(file.to_str().unwrap(), 0)?;
    assert_eq!(tree.root(), 4);
    assert_eq!(tree.n_tips(), 3);
    Ok(())
}

#[test]
fn tip_values_follow_tip_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("traits.tsv");
    std::fs::write(&file, "2\t4.0\n0\t0.0\n1\t2.0\n")?;
    let tree = sample_tree();
    let y = read_tip_values(file.to_str().unwrap(), &tree, -1)?;
    assert_eq!(y, vec![0.0, 2.0, 4.0]);
    Ok(())
}

#[test]
fn tip_values_reject_internal_and_missing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let tree = sample_tree();

    let file = dir.path().join("internal.tsv");
    std::fs::write(&file, "0\t0\n1\t1\n2\t2\n3\t3\n")?;
    assert!(read_tip_values(file.to_str().unwrap(), &tree, -1).is_err());

    let file = dir.path().join("missing.tsv");
    std::fs::write(&file, "0\t0\n1\t1\n")?;
    assert!(read_tip_values(file.to_str().unwrap(), &tree, -1).is_err());
    Ok(())
}

#[test]
fn edge_table_with_tip_column() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("nested").join("scaled.tsv");
    let file = file.to_str().unwrap();
    let tree = sample_tree();
    let lengths = [0.5, 0.5, 1.0, 0.5, 0.25];
    mkdir(file)?;
    write_edge_table(&tree, &lengths, Some(&[0.0, 0.0, 1.5][..]), file)?;

    let ReadLinesOut { lines, .. } = read_lines_of_words(file, -1)?;
    assert_eq!(lines.len(), 5);
    let words: Vec<&str> = lines[2].iter().map(|x| x.as_ref()).collect();
    assert_eq!(words, ["2", "4", "1", "1.5"]);
    assert_eq!(lines[3][3].as_ref(), "NA");
    assert_eq!(lines[4][1].as_ref(), "NA");

    // the first three columns are still an edge table
    let back = read_edge_table(file, -1)?;
    assert_eq!(back.edge_lengths(), &lengths);

    assert!(write_edge_table(&tree, &lengths[..4], None, file).is_err());
    assert!(write_edge_table(&tree, &lengths, Some(&[1.0][..]), file).is_err());
    Ok(())
}

#[test]
fn unreadable_line_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("shifts.tsv");
    let mut bytes = b"3\t0.5\t1\n".to_vec();
    bytes.extend_from_slice(b"\xff\xfe\n");
    bytes.extend_from_slice(b"2\t0\t2\n");
    std::fs::write(&file, bytes)?;

    assert!(read_lines_of_words(file.to_str().unwrap(), -1).is_err());
    Ok(())
}

#[test]
fn missing_file_names_the_path() {
    let err = read_lines_of_words("/nonexistent/tree.tsv.gz", -1).unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/tree.tsv.gz"));
}
