//! Process-tree discovery.
//!
//! Two strategies share the [`ProcessTree`] contract: the kernel's
//! `/proc/<pid>/task/<tid>/children` lists (3.5+ with
//! `CONFIG_PROC_CHILDREN`), and scraping `pstree -l -A -p` on kernels
//! without them. The strategy is picked once at startup by
//! [`select_discovery`].

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::collector::procfs::parse_children;
use crate::collector::{FileSystem, RealFs};
use crate::util::run_command;

/// Enumerates a root process and its live descendants.
pub trait ProcessTree: Send {
    /// Returns `root` first, then every descendant, without duplicates.
    ///
    /// Processes that exit during the walk are treated as childless.
    fn discover(&self, root: u32) -> Vec<u32>;

    /// Strategy name for logging.
    fn strategy(&self) -> &'static str;
}

/// Breadth-first walk over the kernel's per-task children lists.
///
/// Children are gathered from every thread of a process, since a child
/// forked by a non-main thread is listed under that thread only.
pub struct ProcChildren<F: FileSystem = RealFs> {
    fs: F,
}

impl ProcChildren<RealFs> {
    pub fn new() -> Self {
        Self::with_fs(RealFs::new())
    }
}

impl Default for ProcChildren<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> ProcChildren<F> {
    pub fn with_fs(fs: F) -> Self {
        Self { fs }
    }

    fn children_of(&self, pid: u32) -> Vec<u32> {
        let task_dir = PathBuf::from(format!("/proc/{}/task", pid));
        let tasks = match self.fs.read_dir(&task_dir) {
            Ok(tasks) => tasks,
            // Fall back to the main thread alone.
            Err(_) => vec![task_dir.join(pid.to_string())],
        };

        let mut children = Vec::new();
        for task in tasks {
            match self.fs.read_to_string(&task.join("children")) {
                Ok(content) => children.extend(parse_children(&content)),
                Err(e) => debug!(pid, task = %task.display(), error = %e, "no children list"),
            }
        }
        children
    }
}

impl<F: FileSystem> ProcessTree for ProcChildren<F> {
    fn discover(&self, root: u32) -> Vec<u32> {
        let mut seen = HashSet::from([root]);
        let mut pending = VecDeque::from([root]);
        let mut pids = Vec::new();

        while let Some(pid) = pending.pop_front() {
            pids.push(pid);
            for child in self.children_of(pid) {
                if seen.insert(child) {
                    pending.push_back(child);
                }
            }
        }
        pids
    }

    fn strategy(&self) -> &'static str {
        "proc-children"
    }
}

/// Discovery by scraping `pstree` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pstree;

impl ProcessTree for Pstree {
    fn discover(&self, root: u32) -> Vec<u32> {
        let root_arg = root.to_string();
        let mut pids = match run_command(&["pstree", "-l", "-A", "-p", &root_arg]) {
            Ok(out) => parse_pstree_output(&out.lines.join("\n")),
            Err(e) => {
                warn!(error = %e, "pstree failed, monitoring the root process only");
                Vec::new()
            }
        };
        if pids.first() != Some(&root) {
            pids.retain(|&p| p != root);
            pids.insert(0, root);
        }
        pids
    }

    fn strategy(&self) -> &'static str {
        "pstree"
    }
}

/// Extracts PIDs from `pstree -A -p` output.
///
/// Every `name(pid)` node contributes its PID in output order. Thread
/// nodes, printed as `{name}(tid)`, are skipped. Duplicates are dropped.
pub fn parse_pstree_output(output: &str) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut pids = Vec::new();

    for segment in output.split(['-', '\n']) {
        let segment = segment.trim_end();
        let Some(inner) = segment.strip_suffix(')') else {
            continue;
        };
        // The PID is the last parenthesised group; names may contain more.
        let Some(open) = inner.rfind('(') else {
            continue;
        };
        let name = inner[..open].trim_start_matches(['|', '+', '`', ' ']);
        if name.is_empty() || name.ends_with('}') {
            continue;
        }
        if let Ok(pid) = inner[open + 1..].parse::<u32>() {
            if seen.insert(pid) {
                pids.push(pid);
            }
        }
    }
    pids
}

/// Picks the discovery strategy for `root`.
///
/// The children interface is used when the root's main-thread children
/// file exists.
pub fn select_discovery<F>(fs: F, root: u32) -> Box<dyn ProcessTree>
where
    F: FileSystem + 'static,
{
    let probe = format!("/proc/{}/task/{}/children", root, root);
    if fs.exists(Path::new(&probe)) {
        info!(strategy = "proc-children", "process tree discovery selected");
        Box::new(ProcChildren::with_fs(fs))
    } else {
        info!(strategy = "pstree", "kernel children lists unavailable, using pstree");
        Box::new(Pstree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::collector::mock::stat_line;

    #[test]
    fn test_discover_tree_breadth_first() {
        let tree = ProcChildren::with_fs(MockFs::process_tree());
        assert_eq!(tree.discover(1729), vec![1729, 1730, 1731, 1732]);
        assert_eq!(tree.discover(1730), vec![1730, 1732]);
    }

    #[test]
    fn test_discover_includes_root_once() {
        let mut fs = MockFs::process_tree();
        // A bogus self-reference and a duplicate child.
        fs.add_file("/proc/1731/task/1731/children", "1731 1732");
        let pids = ProcChildren::with_fs(fs).discover(1729);
        assert_eq!(pids, vec![1729, 1730, 1731, 1732]);

        let pids = ProcChildren::with_fs(MockFs::new()).discover(42);
        assert_eq!(pids, vec![42]);
    }

    #[test]
    fn test_discover_reads_every_thread() {
        let mut fs = MockFs::new();
        let root = Path::new("/");
        fs.add_process(root, 10, &stat_line(10, "a", 1, 0, 0, 0, 0, 2, 0), "", &[11]);
        fs.add_file("/proc/10/task/15/children", "12\n");
        fs.add_process(root, 11, &stat_line(11, "b", 10, 0, 0, 0, 0, 1, 0), "", &[]);
        let pids = ProcChildren::with_fs(fs).discover(10);
        assert_eq!(pids, vec![10, 11, 12]);
    }

    #[test]
    fn test_discover_vanished_child() {
        let mut fs = MockFs::process_tree();
        fs.remove_file("/proc/1730/task/1730/children");
        let pids = ProcChildren::with_fs(fs).discover(1729);
        assert_eq!(pids, vec![1729, 1730, 1731]);
    }

    #[test]
    fn test_parse_pstree_output() {
        let output = "\
bash(100)-+-sleep(101)
          |-python(102)-+-{python}(103)
          |             `-worker(104)
          `-sleep(105)";
        assert_eq!(parse_pstree_output(output), vec![100, 101, 102, 104, 105]);
        assert!(parse_pstree_output("").is_empty());
    }

    #[test]
    fn test_parse_pstree_parenthesised_names() {
        assert_eq!(
            parse_pstree_output("job(100)---my(proc)(101)"),
            vec![100, 101]
        );
        assert_eq!(
            parse_pstree_output("job(100)---my(proc)(101)\n                 `-run(x)(103)"),
            vec![100, 101, 103]
        );
    }

    #[test]
    fn test_select_discovery() {
        let tree = select_discovery(MockFs::process_tree(), 1729);
        assert_eq!(tree.strategy(), "proc-children");
        let tree = select_discovery(MockFs::new(), 1729);
        assert_eq!(tree.strategy(), "pstree");
    }
}
