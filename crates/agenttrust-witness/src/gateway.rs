//! Gateway-PID discovery and process-tree computation. Pure decision
//! functions, kept separate from the monitors' I/O so they can be tested
//! without touching the process table.

use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Read `pid_file`; if that fails, fall back to scanning `processes` (a
/// pid -> command-line map) for one containing `process_name`, skipping
/// `own_pid`. Returns `None` (passive mode) if neither yields a PID.
pub fn discover_gateway_pid(
    pid_file: Option<&Path>,
    process_name: Option<&str>,
    own_pid: u32,
    processes: &HashMap<u32, String>,
) -> Option<u32> {
    if let Some(path) = pid_file {
        if let Ok(contents) = std::fs::read_to_string(path) {
            if let Ok(pid) = contents.trim().parse::<u32>() {
                return Some(pid);
            }
        }
    }

    let name = process_name?;
    processes
        .iter()
        .find(|(&pid, cmd)| pid != own_pid && cmd.contains(name))
        .map(|(&pid, _)| pid)
}

/// Compute the process tree rooted at `root` given the full `(pid, ppid)`
/// relation, via iterative fixpoint. O(N·D) for tree depth D.
pub fn process_tree(root: u32, parent_of: &HashMap<u32, u32>) -> HashSet<u32> {
    let mut tree: HashSet<u32> = HashSet::from([root]);
    loop {
        let mut added = false;
        for (&pid, &ppid) in parent_of {
            if tree.contains(&ppid) && !tree.contains(&pid) {
                tree.insert(pid);
                added = true;
            }
        }
        if !added {
            break;
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_gateway_pid_prefers_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.pid");
        std::fs::write(&path, "4242").unwrap();
        let procs = HashMap::new();
        let pid = discover_gateway_pid(Some(&path), None, 1, &procs);
        assert_eq!(pid, Some(4242));
    }

    #[test]
    fn test_discover_gateway_pid_falls_back_to_process_scan() {
        let mut procs = HashMap::new();
        procs.insert(99u32, "/usr/bin/agent-gateway --serve".to_string());
        procs.insert(1u32, "/sbin/init".to_string());
        let pid = discover_gateway_pid(None, Some("agent-gateway"), 1, &procs);
        assert_eq!(pid, Some(99));
    }

    #[test]
    fn test_discover_gateway_pid_excludes_own_pid() {
        let mut procs = HashMap::new();
        procs.insert(7u32, "agent-gateway".to_string());
        let pid = discover_gateway_pid(None, Some("agent-gateway"), 7, &procs);
        assert_eq!(pid, None);
    }

    #[test]
    fn test_process_tree_fixpoint_three_levels_deep() {
        let mut parent_of = HashMap::new();
        parent_of.insert(2, 1); // child of root
        parent_of.insert(3, 2); // grandchild
        parent_of.insert(4, 3); // great-grandchild
        parent_of.insert(9, 100); // unrelated
        let tree = process_tree(1, &parent_of);
        assert_eq!(tree, HashSet::from([1, 2, 3, 4]));
    }
}
