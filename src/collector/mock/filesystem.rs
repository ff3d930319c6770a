//! `MockFs`: a fixture tree held in memory.
//!
//! Probes and tree discovery are exercised against it instead of the host's
//! `/proc`, `/sys/class/net` and cgroup mounts.

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::collector::traits::{FileSystem, ReadSeek};

/// Files and directories keyed by absolute path.
///
/// Every file access, successful or not, goes to an access log shared by
/// all clones, so a test can keep a clone and assert which paths a probe
/// touched after handing the original over.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
    accessed: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file, creating its ancestors.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref();
        self.add_ancestors(path);
        self.files.insert(path.to_path_buf(), content.into());
    }

    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.add_ancestors(path);
        self.dirs.insert(path.to_path_buf());
    }

    /// Drops a file, e.g. for a process that exits between samples.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        self.files.remove(path.as_ref());
    }

    /// Lays out `<root>/proc/<pid>/` for one process.
    ///
    /// `stat` also goes to the main-thread task directory, whose `children`
    /// file lists `children`. An empty `io` leaves the io file out.
    pub fn add_process(&mut self, root: &Path, pid: u32, stat: &str, io: &str, children: &[u32]) {
        let proc_dir = root.join("proc").join(pid.to_string());
        self.add_file(proc_dir.join("stat"), stat);
        if !io.is_empty() {
            self.add_file(proc_dir.join("io"), io);
        }

        let task_dir = proc_dir.join("task").join(pid.to_string());
        let children = children
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.add_file(task_dir.join("stat"), stat);
        self.add_file(task_dir.join("children"), children);
    }

    /// Paths read so far, in call order.
    pub fn accessed_paths(&self) -> Vec<PathBuf> {
        match self.accessed.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn add_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if !ancestor.as_os_str().is_empty() {
                self.dirs.insert(ancestor.to_path_buf());
            }
        }
    }

    fn fetch(&self, path: &Path) -> io::Result<&str> {
        if let Ok(mut log) = self.accessed.lock() {
            log.push(path.to_path_buf());
        }
        self.files.get(path).map(String::as_str).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such fixture file {}", path.display()))
        })
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.fetch(path).map(str::to_string)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such fixture directory {}", path.display()),
            ));
        }
        let entries: BTreeSet<&PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|entry| entry.parent() == Some(path))
            .collect();
        Ok(entries.into_iter().cloned().collect())
    }

    fn open_reader(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let content = self.fetch(path)?.as_bytes().to_vec();
        Ok(Box::new(Cursor::new(content)))
    }
}
