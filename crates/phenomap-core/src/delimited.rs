//! Delimited text I/O (CSV / TSV, optionally gzip-compressed).
//!
//! The delimiter follows the file extension: `.tsv` / `.tsv.gz` are
//! tab-separated, everything else is comma-separated. Double-quoted fields
//! may contain delimiters and `""` escapes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{Error, Result};
use crate::table::{Table, Value};

/// Field delimiter implied by a file name.
pub fn delimiter_for(path: &Path) -> char {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = name.strip_suffix(".gz").unwrap_or(&name);
    if stem.ends_with(".tsv") || stem.ends_with(".txt") {
        '\t'
    } else {
        ','
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Open a file for line reading, transparently decompressing `.gz`.
fn open_lines(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Split one record into fields, honoring double quotes.
pub fn split_record(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Read a headed delimited file into a [`Table`] of parsed [`Value`]s.
///
/// A missing file, an empty file, or a row whose width differs from the
/// header is an error.
pub fn read_table(path: &Path) -> Result<Table> {
    let delimiter = delimiter_for(path);
    let mut lines = open_lines(path)?.lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| Error::io(path, e))?,
        None => return Err(Error::malformed(path, "file is empty (no header)")),
    };
    let columns = split_record(header.trim_end_matches('\r'), delimiter);
    let width = columns.len();
    let mut table = Table::new(columns);

    for (i, line) in lines.enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let fields = split_record(line, delimiter);
        if fields.len() != width {
            return Err(Error::malformed(
                path,
                format!(
                    "row {} has {} fields, expected {width}",
                    i + 2,
                    fields.len()
                ),
            ));
        }
        table.push_row(fields.iter().map(|f| Value::parse(f)).collect())?;
    }

    log::debug!(
        "read {} rows x {} columns from {}",
        table.n_rows(),
        width,
        path.display()
    );
    Ok(table)
}

/// Quote a field if it contains the delimiter, a quote or a newline.
pub fn escape_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write a header and rows as delimited text (delimiter from the extension).
pub fn write_records(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let delimiter = delimiter_for(path);
    let sep = delimiter.to_string();
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut out = BufWriter::new(file);

    let line = |fields: &[String]| {
        fields
            .iter()
            .map(|f| escape_field(f, delimiter))
            .collect::<Vec<_>>()
            .join(&sep)
    };

    writeln!(out, "{}", line(header)).map_err(|e| Error::io(path, e))?;
    for row in rows {
        writeln!(out, "{}", line(row.as_slice())).map_err(|e| Error::io(path, e))?;
    }
    out.flush().map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    #[test]
    fn test_split_record_quotes() {
        let f = split_record(r#"a,"b,c","say ""hi""",,d"#, ',');
        assert_eq!(f, vec!["a", "b,c", "say \"hi\"", "", "d"]);
    }

    #[test]
    fn test_delimiter_for_extension() {
        assert_eq!(delimiter_for(Path::new("x/orf_metadata.tsv.gz")), '\t');
        assert_eq!(delimiter_for(Path::new("profiles.csv.gz")), ',');
        assert_eq!(delimiter_for(Path::new("out.csv")), ',');
    }

    #[test]
    fn test_read_gzip_tsv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("meta.tsv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"id\tgroup\nJCP1\tg1|g2\nJCP2\t\n").unwrap();
        enc.finish().unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.columns(), &["id".to_string(), "group".to_string()][..]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.value(0, 1), &Value::Text("g1|g2".into()));
        assert!(table.value(1, 1).is_missing());
    }

    #[test]
    fn test_read_rejects_ragged_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2\n3\n").unwrap();
        let err = read_table(&path).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }), "{err}");
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = read_table(Path::new("/nonexistent/profiles.csv")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.csv");
        let header = vec!["k".to_string(), "v".to_string()];
        let rows = vec![vec!["a,b".to_string(), "1".to_string()]];
        write_records(&path, &header, &rows).unwrap();
        let t = read_table(&path).unwrap();
        assert_eq!(t.value(0, 0), &Value::Text("a,b".into()));
    }
}
