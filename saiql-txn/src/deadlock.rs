//! Wait-for graph and background deadlock detection
//!
//! The graph is a directed multigraph on active transaction ids; an edge
//! `t1 → t2` means t1 is blocked on a lock held by t2. A transaction has
//! outgoing edges only while waiting; all its edges are cleared on commit
//! or abort. The detector thread snapshots the graph under its lock,
//! runs DFS cycle detection, and hands any cycle to the resolution
//! callback.

use saiql_core::TransactionId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, warn};

/// Directed wait-for graph, internally synchronized.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: Mutex<HashMap<TransactionId, HashSet<TransactionId>>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn edges(&self) -> std::sync::MutexGuard<'_, HashMap<TransactionId, HashSet<TransactionId>>> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `waiting` is blocked on `blocking`.
    pub fn add_edge(&self, waiting: TransactionId, blocking: TransactionId) {
        self.edges().entry(waiting).or_default().insert(blocking);
    }

    pub fn remove_edge(&self, waiting: TransactionId, blocking: TransactionId) {
        let mut edges = self.edges();
        if let Some(targets) = edges.get_mut(&waiting) {
            targets.remove(&blocking);
            if targets.is_empty() {
                edges.remove(&waiting);
            }
        }
    }

    /// Remove every edge involving the transaction, in both directions.
    /// Called on commit and abort.
    pub fn clear_transaction(&self, id: TransactionId) {
        let mut edges = self.edges();
        edges.remove(&id);
        edges.retain(|_, targets| {
            targets.remove(&id);
            !targets.is_empty()
        });
    }

    /// Whether the transaction has any outgoing edges.
    pub fn is_waiting(&self, id: TransactionId) -> bool {
        self.edges().contains_key(&id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges().values().map(HashSet::len).sum()
    }

    /// DFS cycle detection over a snapshot of the graph. Returns the
    /// transactions forming the first cycle found, if any.
    pub fn find_cycle(&self) -> Option<Vec<TransactionId>> {
        let snapshot: HashMap<TransactionId, HashSet<TransactionId>> = self.edges().clone();

        fn dfs(
            node: TransactionId,
            graph: &HashMap<TransactionId, HashSet<TransactionId>>,
            visited: &mut HashSet<TransactionId>,
            stack: &mut Vec<TransactionId>,
        ) -> Option<Vec<TransactionId>> {
            if let Some(position) = stack.iter().position(|n| *n == node) {
                return Some(stack[position..].to_vec());
            }
            if visited.contains(&node) {
                return None;
            }
            visited.insert(node);
            stack.push(node);
            if let Some(neighbors) = graph.get(&node) {
                for neighbor in neighbors {
                    if let Some(cycle) = dfs(*neighbor, graph, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
            stack.pop();
            None
        }

        let mut visited = HashSet::new();
        for node in snapshot.keys() {
            if !visited.contains(node) {
                let mut stack = Vec::new();
                if let Some(cycle) = dfs(*node, &snapshot, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

/// Background deadlock detector. Sweeps the wait-for graph on a fixed
/// interval and invokes the resolution callback with any cycle found.
/// Stops cleanly on [`DeadlockDetector::stop`] or drop.
pub struct DeadlockDetector {
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeadlockDetector {
    /// Spawn the detector thread.
    pub fn start<F>(graph: Arc<WaitForGraph>, interval: Duration, on_cycle: F) -> Self
    where
        F: Fn(Vec<TransactionId>) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let spawned = thread::Builder::new()
            .name("saiql-deadlock-detector".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    if let Some(cycle) = graph.find_cycle() {
                        warn!(
                            cycle = ?cycle.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                            "deadlock detected"
                        );
                        on_cycle(cycle);
                    }
                    thread::park_timeout(interval);
                }
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn deadlock detector thread");
                running.store(false, Ordering::Release);
                None
            }
        };

        Self {
            running,
            thread: Mutex::new(thread),
        }
    }

    /// Signal the detector to stop and join its thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for DeadlockDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn tx() -> TransactionId {
        TransactionId::now_v7()
    }

    #[test]
    fn test_no_cycle_in_a_chain() {
        let graph = WaitForGraph::new();
        let (a, b, c) = (tx(), tx(), tx());
        graph.add_edge(a, b);
        graph.add_edge(b, c);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_two_node_cycle_found() {
        let graph = WaitForGraph::new();
        let (a, b) = (tx(), tx());
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        let cycle = graph.find_cycle().expect("cycle should be found");
        assert_eq!(cycle.len(), 2);
        assert!(cycle.contains(&a) && cycle.contains(&b));
    }

    #[test]
    fn test_three_node_cycle_found() {
        let graph = WaitForGraph::new();
        let (a, b, c) = (tx(), tx(), tx());
        graph.add_edge(a, b);
        graph.add_edge(b, c);
        graph.add_edge(c, a);
        let cycle = graph.find_cycle().expect("cycle should be found");
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_clear_transaction_removes_both_directions() {
        let graph = WaitForGraph::new();
        let (a, b) = (tx(), tx());
        graph.add_edge(a, b);
        graph.add_edge(b, a);
        graph.clear_transaction(a);
        assert!(!graph.is_waiting(a));
        assert!(!graph.is_waiting(b));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_detector_reports_cycle_and_stops() {
        let graph = Arc::new(WaitForGraph::new());
        let (a, b) = (tx(), tx());
        graph.add_edge(a, b);
        graph.add_edge(b, a);

        let (sender, receiver) = mpsc::channel();
        let detector = DeadlockDetector::start(
            Arc::clone(&graph),
            Duration::from_millis(10),
            move |cycle| {
                let _ = sender.send(cycle);
            },
        );

        let cycle = receiver
            .recv_timeout(Duration::from_secs(2))
            .expect("detector should report the cycle");
        assert_eq!(cycle.len(), 2);

        // Break the cycle so the callback stream ends, then stop.
        graph.clear_transaction(a);
        detector.stop();
    }
}
