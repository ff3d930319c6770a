//! The filesystem seam.
//!
//! Every probe reads `/proc` and `/sys` through [`FileSystem`], so the same
//! code runs against the live kernel or against an in-memory fixture.

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// A readable, rewindable handle.
///
/// Used for counter files that are kept open for the lifetime of a probe and
/// re-read from offset zero on every sample.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Read-only view of the kernel's pseudo-filesystems.
pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn exists(&self, path: &Path) -> bool;

    /// Full paths of the entries directly below `path`.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Opens a file for repeated reading.
    ///
    /// The handle is owned by the caller and released when dropped.
    fn open_reader(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;
}

/// The live system, through `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn open_reader(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// Resolves an absolute system path (e.g. `/proc/1/io`) against an optional
/// read root.
///
/// With no root the path is returned unchanged; with a root the path is
/// re-anchored below it, so `/fixture` + `/proc/1/io` yields
/// `/fixture/proc/1/io`.
pub fn rooted(root: Option<&Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match root {
        Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;
    use tempfile::tempdir;

    #[test]
    fn test_real_fs_reads_directory_tree() {
        let dir = tempdir().unwrap();
        let stats = dir.path().join("eth0/statistics");
        std::fs::create_dir_all(&stats).unwrap();
        std::fs::write(stats.join("tx_packets"), "7\n").unwrap();

        let fs = RealFs::new();
        assert!(fs.exists(&stats));
        assert!(!fs.exists(&dir.path().join("lo")));
        assert_eq!(fs.read_to_string(&stats.join("tx_packets")).unwrap(), "7\n");
        assert_eq!(
            fs.read_dir(dir.path()).unwrap(),
            vec![dir.path().join("eth0")]
        );
        assert_eq!(
            fs.read_dir(&dir.path().join("lo")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_real_fs_open_reader_rereads_after_rewrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rx_bytes");
        std::fs::write(&path, "100\n").unwrap();

        let fs = RealFs::new();
        let mut reader = fs.open_reader(&path).unwrap();
        let mut first = String::new();
        reader.read_to_string(&mut first).unwrap();
        assert_eq!(first.trim(), "100");

        std::fs::write(&path, "250\n").unwrap();
        reader.seek(SeekFrom::Start(0)).unwrap();
        let mut second = String::new();
        reader.read_to_string(&mut second).unwrap();
        assert_eq!(second.trim(), "250");
    }

    #[test]
    fn test_rooted() {
        assert_eq!(rooted(None, "/proc/1/io"), PathBuf::from("/proc/1/io"));
        assert_eq!(
            rooted(Some(Path::new("/fixture/1")), "/proc/1/io"),
            PathBuf::from("/fixture/1/proc/1/io")
        );
    }
}
