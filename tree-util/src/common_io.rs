use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

///
/// Write every line into the output_file
///
/// * `lines` - vector of displayable lines
/// * `output_file` - file name--either gzipped or not, or `stdout`
///
pub fn write_types<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

#[derive(Debug)]
pub struct ReadLinesOut {
    pub lines: Vec<Vec<Box<str>>>,
    pub header: Vec<Box<str>>,
}

fn is_not_comment_line(line: &str) -> bool {
    !(line.starts_with('#') || line.starts_with('%') || line.trim().is_empty())
}

///
/// Read lines and split them into whitespace-separated words.
/// Comment lines (`#`, `%`) and blank lines are skipped.
///
/// * `input_file` - file name--either gzipped or not
/// * `hdr_line` - location of a header line (-1 = no header line)
///
pub fn read_lines_of_words(input_file: &str, hdr_line: i64) -> anyhow::Result<ReadLinesOut> {
    let buf_reader: Box<dyn BufRead> = open_buf_reader(input_file)?;

    let mut lines_raw: Vec<Box<str>> = vec![];
    for (i, x) in buf_reader.lines().enumerate() {
        let x = x.with_context(|| format!("{}: cannot read line {}", input_file, i + 1))?;
        if is_not_comment_line(&x) {
            lines_raw.push(x.into_boxed_str());
        }
    }

    let split = |line: &str| -> Vec<Box<str>> {
        line.split_whitespace()
            .map(|x| x.to_owned().into_boxed_str())
            .collect()
    };

    let mut header = vec![];

    let lines = if hdr_line < 0 {
        lines_raw.iter().map(|s| split(s)).collect()
    } else {
        let n_skip = hdr_line as usize;
        if lines_raw.len() < (n_skip + 1) {
            return Err(anyhow::anyhow!("not enough data in {}", input_file));
        }
        header.extend(split(&lines_raw[n_skip]));
        lines_raw[(n_skip + 1)..].iter().map(|s| split(s)).collect()
    };

    Ok(ReadLinesOut { lines, header })
}

fn is_gz(file: &str) -> bool {
    Path::new(file).extension().and_then(|x| x.to_str()) == Some("gz")
}

fn is_console(file: &str) -> bool {
    file.eq_ignore_ascii_case("stdout") || file.eq_ignore_ascii_case("stderr")
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file).with_context(|| format!("cannot open {}", input_file))?;
    if is_gz(input_file) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not, or `stdout`/`stderr`
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }
    if output_file.eq_ignore_ascii_case("stderr") {
        return Ok(Box::new(BufWriter::new(std::io::stderr())));
    }

    let file =
        File::create(output_file).with_context(|| format!("cannot create {}", output_file))?;
    if is_gz(output_file) {
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

///
/// Create the parent directory of an output file if needed
/// * `file` - output file name; console targets are left alone
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    if is_console(file) {
        return Ok(());
    }
    if let Some(dir) = Path::new(file).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Ok(())
}
