use std::collections::{HashMap, HashSet};

use super::TransactionID;

pub(crate) struct WaitForGraph {
    // key: transaction id, value: the transactions that the key transaction
    // is waiting for
    graph: HashMap<TransactionID, HashSet<TransactionID>>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self {
            graph: HashMap::new(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: TransactionID, to: TransactionID) {
        if from == to {
            return;
        }
        self.graph.entry(from).or_insert_with(HashSet::new).insert(to);
    }

    /// Forget everything `tid` is waiting for, called once its request is
    /// granted or abandoned.
    pub(crate) fn remove_waiter(&mut self, tid: TransactionID) {
        self.graph.remove(&tid);
    }

    /// Return a cycle that goes through `start`, if there is one.
    pub(crate) fn find_cycle_from(
        &self,
        start: TransactionID,
    ) -> Option<Vec<TransactionID>> {
        let mut path = vec![start];
        let mut visited = HashSet::new();
        if self.dfs(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs(
        &self,
        start: TransactionID,
        tid: TransactionID,
        visited: &mut HashSet<TransactionID>,
        path: &mut Vec<TransactionID>,
    ) -> bool {
        if !visited.insert(tid) {
            return false;
        }

        if let Some(waiting_for) = self.graph.get(&tid) {
            for &t in waiting_for {
                if t == start {
                    return true;
                }
                path.push(t);
                if self.dfs(start, t, visited, path) {
                    return true;
                }
                path.pop();
            }
        }

        false
    }
}
