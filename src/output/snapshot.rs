//! JSON summary publication.
//!
//! While monitoring, the summary is republished every interval to
//! `<json>_snapshot` by writing a `.tmp` sibling and renaming it into
//! place, so an external reader only ever sees a complete document. On exit
//! the snapshot is removed and the summary written once to `<json>`.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::SinkError;

pub struct SnapshotWriter {
    final_path: PathBuf,
    snapshot_path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        let snapshot_path = suffixed(&final_path, "_snapshot");
        let tmp_path = suffixed(&snapshot_path, ".tmp");
        Self {
            final_path,
            snapshot_path,
            tmp_path,
        }
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Atomically replaces the snapshot with `doc`.
    pub fn publish<T: Serialize>(&self, doc: &T) -> Result<(), SinkError> {
        write_json(&self.tmp_path, doc)?;
        fs::rename(&self.tmp_path, &self.snapshot_path)?;
        debug!(path = %self.snapshot_path.display(), "snapshot published");
        Ok(())
    }

    /// Deletes the snapshot; a snapshot that was never published is fine.
    pub fn remove_snapshot(&self) -> Result<(), SinkError> {
        for path in [&self.snapshot_path, &self.tmp_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Writes the permanent summary.
    pub fn write_final<T: Serialize>(&self, doc: &T) -> Result<(), SinkError> {
        write_json(&self.final_path, doc)
    }
}

fn write_json<T: Serialize>(path: &Path, doc: &T) -> Result<(), SinkError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, doc)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
