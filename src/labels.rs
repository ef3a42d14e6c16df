use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::error::RankError;

/// Read candidate labels from a text file, one per line. Whitespace is
/// trimmed and blank lines are skipped; order and duplicates are kept as
/// written so label indices stay stable.
pub fn read_labels(path: &Path) -> Result<Vec<String>, RankError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RankError::NamesNotFound {
            path: path.to_path_buf(),
        },
        _ => RankError::NamesIo {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let mut labels = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| RankError::NamesIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    debug!("read {} labels from {}", labels.len(), path.display());
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_one_label_per_line() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"person\nbicycle\ncar\n").unwrap();
        file.flush().unwrap();

        let labels = read_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["person", "bicycle", "car"]);
    }

    #[test]
    fn trims_and_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"  dog  \n\n \t \ncat\n\n").unwrap();
        file.flush().unwrap();

        let labels = read_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["dog", "cat"]);
    }

    #[test]
    fn keeps_duplicates_and_order() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"cat\ndog\ncat\n").unwrap();
        file.flush().unwrap();

        let labels = read_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["cat", "dog", "cat"]);
    }

    #[test]
    fn empty_file_yields_empty_list() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_labels(file.path()).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_names_not_found() {
        let err = read_labels(Path::new("no/such/coco.names")).unwrap_err();
        assert!(matches!(err, RankError::NamesNotFound { .. }));
        assert!(err.to_string().contains("coco.names"));
    }
}
