//! Append-only tab-separated log, one row per sample.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::SinkError;

/// The time-series text log.
///
/// Columns are fixed when the log is created. A row is written in column
/// order; a column the row does not supply (a metric removed at runtime)
/// is written as 0 so later columns stay aligned with the header.
pub struct TabularLog {
    writer: BufWriter<File>,
    columns: Vec<&'static str>,
}

impl TabularLog {
    /// Creates (truncating) the log and writes the header row.
    pub fn create(path: &Path, columns: Vec<&'static str>) -> Result<Self, SinkError> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "Time")?;
        for column in &columns {
            write!(writer, "\t{}", column)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(Self { writer, columns })
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Appends one row and flushes it.
    pub fn append(&mut self, timestamp: i64, values: &[(&'static str, u64)]) -> Result<(), SinkError> {
        write!(self.writer, "{}", timestamp)?;
        for column in &self.columns {
            let value = values
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, v)| *v)
                .unwrap_or(0);
            write!(self.writer, "\t{}", value)?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("treemon.txt");
        let mut log = TabularLog::create(&path, vec!["wtime", "rchar", "rss"]).unwrap();
        log.append(1_700_000_000, &[("wtime", 5), ("rchar", 100), ("rss", 42)])
            .unwrap();
        // rchar missing from this row
        log.append(1_700_000_030, &[("rss", 43), ("wtime", 35)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Time\twtime\trchar\trss");
        assert_eq!(lines[1], "1700000000\t5\t100\t42");
        assert_eq!(lines[2], "1700000030\t35\t0\t43");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing/treemon.txt");
        assert!(matches!(
            TabularLog::create(&path, vec![]),
            Err(SinkError::Io(_))
        ));
    }
}
