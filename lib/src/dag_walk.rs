// Copyright 2020 The gitdup Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! General-purpose DAG algorithms.

use std::collections::HashSet;
use std::hash::Hash;
use std::iter;

use itertools::Itertools as _;

/// Traverses nodes from `start` in depth-first order. Each node is emitted
/// once.
pub fn dfs<T, ID, II, NI>(
    start: II,
    id_fn: impl Fn(&T) -> ID,
    mut neighbors_fn: impl FnMut(&T) -> NI,
) -> impl Iterator<Item = T>
where
    ID: Hash + Eq,
    II: IntoIterator<Item = T>,
    NI: IntoIterator<Item = T>,
{
    let mut work: Vec<T> = start.into_iter().collect();
    let mut visited: HashSet<ID> = HashSet::new();
    iter::from_fn(move || loop {
        let c = work.pop()?;
        let id = id_fn(&c);
        if visited.contains(&id) {
            continue;
        }
        for p in neighbors_fn(&c) {
            work.push(p);
        }
        visited.insert(id);
        return Some(c);
    })
}

/// Returns neighbors before the node itself.
///
/// If the graph has a cycle, `cycle_fn()` is called with one of the nodes
/// involved in the cycle, and its result is returned instead of a partial
/// order.
pub fn topo_order_forward_ok<T, ID, E, II, NI>(
    start: II,
    id_fn: impl Fn(&T) -> ID,
    mut neighbors_fn: impl FnMut(&T) -> NI,
    cycle_fn: impl FnOnce(T) -> E,
) -> Result<Vec<T>, E>
where
    ID: Hash + Eq + Clone,
    II: IntoIterator<Item = T>,
    NI: IntoIterator<Item = T>,
{
    let mut stack = start.into_iter().map(|node| (node, false)).collect_vec();
    let mut visiting = HashSet::new();
    let mut emitted = HashSet::new();
    let mut result = vec![];
    while let Some((node, neighbors_visited)) = stack.pop() {
        let id = id_fn(&node);
        if emitted.contains(&id) {
            continue;
        }
        if !neighbors_visited {
            if !visiting.insert(id.clone()) {
                return Err(cycle_fn(node));
            }
            let neighbors = neighbors_fn(&node);
            stack.push((node, true));
            stack.extend(neighbors.into_iter().map(|neighbor| (neighbor, false)));
        } else {
            visiting.remove(&id);
            emitted.insert(id);
            result.push(node);
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;

    use super::*;

    fn topo_order_forward<T: Clone + Hash + Eq>(
        start: Vec<T>,
        neighbors_fn: impl Fn(&T) -> Vec<T>,
    ) -> Vec<T> {
        topo_order_forward_ok(start, |node| node.clone(), neighbors_fn, |_| "cycle").unwrap()
    }

    #[test]
    fn test_dfs_visits_each_node_once() {
        // This graph:
        //  o D
        //  |\
        //  o | C
        //  | o B
        //  |/
        //  o A

        let neighbors = hashmap! {
            'A' => vec![],
            'B' => vec!['A'],
            'C' => vec!['A'],
            'D' => vec!['C', 'B'],
        };
        let visited = dfs(vec!['D'], |node| *node, |node| neighbors[node].clone()).collect_vec();
        assert_eq!(visited, vec!['D', 'B', 'A', 'C']);
    }

    #[test]
    fn test_topo_order_forward_linear() {
        // This graph:
        //  o C
        //  o B
        //  o A

        let neighbors = hashmap! {
            'A' => vec![],
            'B' => vec!['A'],
            'C' => vec!['B'],
        };
        let neighbors_fn = |node: &char| neighbors[node].clone();

        let order = topo_order_forward(vec!['C'], neighbors_fn);
        assert_eq!(order, vec!['A', 'B', 'C']);
        let order = topo_order_forward(vec!['C', 'B'], neighbors_fn);
        assert_eq!(order, vec!['A', 'B', 'C']);
        let order = topo_order_forward(vec!['B', 'C'], neighbors_fn);
        assert_eq!(order, vec!['A', 'B', 'C']);
    }

    #[test]
    fn test_topo_order_forward_merge() {
        // This graph:
        //  o F
        //  |\
        //  o | E
        //  | o D
        //  | o C
        //  | o B
        //  |/
        //  o A

        let neighbors = hashmap! {
            'A' => vec![],
            'B' => vec!['A'],
            'C' => vec!['B'],
            'D' => vec!['C'],
            'E' => vec!['A'],
            'F' => vec!['E', 'D'],
        };
        let neighbors_fn = |node: &char| neighbors[node].clone();

        let order = topo_order_forward(vec!['F'], neighbors_fn);
        assert_eq!(order, vec!['A', 'B', 'C', 'D', 'E', 'F']);
        let order = topo_order_forward(vec!['F', 'E', 'C'], neighbors_fn);
        assert_eq!(order, vec!['A', 'B', 'C', 'E', 'D', 'F']);
        let order = topo_order_forward(vec!['F', 'D', 'E'], neighbors_fn);
        assert_eq!(order, vec!['A', 'E', 'B', 'C', 'D', 'F']);
    }

    #[test]
    fn test_topo_order_forward_cut_edges() {
        // Neighbors outside the node set are simply not returned, which is how
        // a range bounded by an excluded base is walked:
        //  o C
        //  o B
        //  ~ (A is not part of the graph)

        let neighbors = hashmap! {
            'B' => vec![],
            'C' => vec!['B'],
        };
        let order = topo_order_forward(vec!['C', 'B'], |node| neighbors[node].clone());
        assert_eq!(order, vec!['B', 'C']);
    }

    #[test]
    fn test_topo_order_forward_cycle() {
        // This graph:
        //  o C
        //  o B
        //  o A
        //  |
        //  o C (again)

        let neighbors = hashmap! {
            'A' => vec!['C'],
            'B' => vec!['A'],
            'C' => vec!['B'],
        };
        let result = topo_order_forward_ok(
            vec!['C'],
            |node| *node,
            |node| neighbors[node].clone(),
            |node| node,
        );
        assert_eq!(result, Err('C'));

        let self_loop = hashmap! { 'A' => vec!['A'] };
        let result = topo_order_forward_ok(
            vec!['A'],
            |node| *node,
            |node| self_loop[node].clone(),
            |node| node,
        );
        assert_eq!(result, Err('A'));
    }
}
