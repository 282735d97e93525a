use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{ColoringError, Result};

// Core types
pub type NodeId = u64;
pub type Color = usize;

/// Supplies the topology before a run starts.
///
/// Implementations must describe a finite, symmetric, loop-free adjacency
/// relation. `Graph::from_source` checks this and rejects anything else.
pub trait GraphSource {
    fn nodes(&self) -> Vec<NodeId>;

    fn neighbors(&self, node: NodeId) -> Vec<NodeId>;

    fn degree(&self, node: NodeId) -> usize {
        self.neighbors(node).len()
    }
}

/// Plain in-memory adjacency list, the default graph source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AdjacencyList {
    adjacency: BTreeMap<NodeId, Vec<NodeId>>,
}

impl AdjacencyList {
    pub fn new() -> Self {
        Self {
            adjacency: BTreeMap::new(),
        }
    }

    /// Creates `count` isolated nodes with ids `0..count`.
    pub fn with_nodes(count: u64) -> Self {
        let mut list = Self::new();
        for id in 0..count {
            list.add_node(id);
        }
        list
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.adjacency.entry(id).or_default();
    }

    /// Adds an undirected edge. Self-loops and repeated edges are ignored;
    /// callers that need to detect them should inspect the return value.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> bool {
        if u == v || self.has_edge(u, v) {
            return false;
        }
        self.adjacency.entry(u).or_default().push(v);
        self.adjacency.entry(v).or_default().push(u);
        true
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.adjacency
            .get(&u)
            .map(|neighbors| neighbors.contains(&v))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum::<usize>() / 2
    }

    /// Inserts a raw, possibly one-directional, neighbour entry.
    ///
    /// Only useful for feeding deliberately broken input to validation.
    pub fn insert_directed(&mut self, from: NodeId, to: NodeId) {
        self.adjacency.entry(from).or_default().push(to);
    }
}

impl GraphSource for AdjacencyList {
    fn nodes(&self) -> Vec<NodeId> {
        self.adjacency.keys().copied().collect()
    }

    fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.adjacency.get(&node).cloned().unwrap_or_default()
    }
}

/// Per-node protocol state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// Colours this node may still adopt, kept sorted.
    pub available_colors: Vec<Color>,
    pub candidate: Option<Color>,
    /// Candidates announced by uncoloured neighbours during the current round.
    pub received_candidates: Vec<Color>,
    pub final_color: Option<Color>,
}

impl NodeState {
    pub fn is_colored(&self) -> bool {
        self.final_color.is_some()
    }

    /// Removes `color` from the available set, returning whether it was present.
    pub fn remove_available(&mut self, color: Color) -> bool {
        match self.available_colors.binary_search(&color) {
            Ok(pos) => {
                self.available_colors.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}

/// Arena of nodes: fixed topology plus mutable protocol state.
///
/// Nodes are addressed internally by dense slot; the caller's `NodeId`s are
/// kept for lookup and for reporting results.
#[derive(Clone, Debug)]
pub struct Graph {
    ids: Vec<NodeId>,
    slots: HashMap<NodeId, usize>,
    adjacency: Vec<Vec<usize>>,
    pub(crate) states: Vec<NodeState>,
}

impl Graph {
    /// Builds the node table from a source, rejecting inconsistent adjacency.
    pub fn from_source<S: GraphSource + ?Sized>(source: &S) -> Result<Self> {
        let ids = source.nodes();
        let mut slots = HashMap::with_capacity(ids.len());
        for (slot, id) in ids.iter().enumerate() {
            if slots.insert(*id, slot).is_some() {
                return Err(ColoringError::malformed(format!("duplicate node id {}", id)));
            }
        }

        let mut neighbor_sets: Vec<HashSet<NodeId>> = Vec::with_capacity(ids.len());
        let mut adjacency = Vec::with_capacity(ids.len());
        for id in &ids {
            let neighbors = source.neighbors(*id);
            if source.degree(*id) != neighbors.len() {
                return Err(ColoringError::malformed(format!(
                    "node {} reports degree {} but lists {} neighbors",
                    id,
                    source.degree(*id),
                    neighbors.len()
                )));
            }

            let mut seen = HashSet::with_capacity(neighbors.len());
            let mut slots_of = Vec::with_capacity(neighbors.len());
            for neighbor in neighbors {
                if neighbor == *id {
                    return Err(ColoringError::malformed(format!("self-loop on node {}", id)));
                }
                let slot = *slots.get(&neighbor).ok_or_else(|| {
                    ColoringError::malformed(format!(
                        "node {} lists unknown neighbor {}",
                        id, neighbor
                    ))
                })?;
                if !seen.insert(neighbor) {
                    return Err(ColoringError::malformed(format!(
                        "duplicate edge ({}, {})",
                        id, neighbor
                    )));
                }
                slots_of.push(slot);
            }
            neighbor_sets.push(seen);
            adjacency.push(slots_of);
        }

        // Symmetry: every listed neighbour must list us back.
        for (slot, neighbors) in adjacency.iter().enumerate() {
            for &other in neighbors {
                if !neighbor_sets[other].contains(&ids[slot]) {
                    return Err(ColoringError::malformed(format!(
                        "asymmetric edge: {} lists {} but not the reverse",
                        ids[slot], ids[other]
                    )));
                }
            }
        }

        let states = vec![NodeState::default(); ids.len()];
        Ok(Self {
            ids,
            slots,
            adjacency,
            states,
        })
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.ids
    }

    pub fn slot_of(&self, id: NodeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    pub fn id_of(&self, slot: usize) -> NodeId {
        self.ids[slot]
    }

    /// Neighbour slots of `slot`, in no particular order.
    pub fn neighbor_slots(&self, slot: usize) -> &[usize] {
        &self.adjacency[slot]
    }

    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        match self.slot_of(id) {
            Some(slot) => self.adjacency[slot].iter().map(|&n| self.ids[n]).collect(),
            None => Vec::new(),
        }
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.slot_of(id)
            .map(|slot| self.adjacency[slot].len())
            .unwrap_or(0)
    }

    pub fn max_degree(&self) -> usize {
        self.adjacency.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// The colour space `[0, max_degree]`.
    pub fn palette(&self) -> Vec<Color> {
        (0..=self.max_degree()).collect()
    }

    pub fn state(&self, slot: usize) -> &NodeState {
        &self.states[slot]
    }

    pub fn state_of(&self, id: NodeId) -> Option<&NodeState> {
        self.slot_of(id).map(|slot| &self.states[slot])
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    /// Iterates every undirected edge once, as slot pairs with `u < v`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(u, neighbors)| neighbors.iter().filter(move |&&v| u < v).map(move |&v| (u, v)))
    }

    pub fn uncolored_count(&self) -> usize {
        self.states.iter().filter(|s| !s.is_colored()).count()
    }

    pub(crate) fn replace_states(&mut self, states: Vec<NodeState>) {
        debug_assert_eq!(states.len(), self.states.len());
        self.states = states;
    }
}

impl GraphSource for Graph {
    fn nodes(&self) -> Vec<NodeId> {
        self.ids.clone()
    }

    fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        Graph::neighbors(self, node)
    }

    fn degree(&self, node: NodeId) -> usize {
        Graph::degree(self, node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lopsided;

    impl GraphSource for Lopsided {
        fn nodes(&self) -> Vec<NodeId> {
            vec![1, 2]
        }

        fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
            if node == 1 {
                vec![2]
            } else {
                vec![1]
            }
        }

        fn degree(&self, _node: NodeId) -> usize {
            3
        }
    }

    struct Duplicated;

    impl GraphSource for Duplicated {
        fn nodes(&self) -> Vec<NodeId> {
            vec![7, 8, 7]
        }

        fn neighbors(&self, _node: NodeId) -> Vec<NodeId> {
            Vec::new()
        }
    }

    #[test]
    fn test_builds_triangle() {
        let mut list = AdjacencyList::new();
        list.add_edge(1, 2);
        list.add_edge(2, 3);
        list.add_edge(3, 1);

        let graph = Graph::from_source(&list).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.max_degree(), 2);
        assert_eq!(graph.palette(), vec![0, 1, 2]);
        assert_eq!(graph.edges().count(), 3);

        let mut neighbors = graph.neighbors(1);
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![2, 3]);
    }

    #[test]
    fn test_empty_graph_has_single_color_palette() {
        let graph = Graph::from_source(&AdjacencyList::with_nodes(4)).unwrap();
        assert_eq!(graph.max_degree(), 0);
        assert_eq!(graph.palette(), vec![0]);
    }

    #[test]
    fn test_rejects_asymmetric_edge() {
        let mut list = AdjacencyList::with_nodes(2);
        list.insert_directed(0, 1);
        let err = Graph::from_source(&list).unwrap_err();
        assert!(matches!(err, ColoringError::MalformedInput(ref m) if m.contains("asymmetric")));
    }

    #[test]
    fn test_rejects_self_loop() {
        let mut list = AdjacencyList::with_nodes(1);
        list.insert_directed(0, 0);
        let err = Graph::from_source(&list).unwrap_err();
        assert!(matches!(err, ColoringError::MalformedInput(ref m) if m.contains("self-loop")));
    }

    #[test]
    fn test_rejects_duplicate_edge() {
        let mut list = AdjacencyList::new();
        list.add_edge(0, 1);
        list.insert_directed(0, 1);
        list.insert_directed(1, 0);
        let err = Graph::from_source(&list).unwrap_err();
        assert!(matches!(err, ColoringError::MalformedInput(ref m) if m.contains("duplicate edge")));
    }

    #[test]
    fn test_rejects_unknown_neighbor() {
        let mut list = AdjacencyList::with_nodes(1);
        list.insert_directed(0, 42);
        assert!(matches!(
            Graph::from_source(&list),
            Err(ColoringError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_node_id() {
        let err = Graph::from_source(&Duplicated).unwrap_err();
        assert!(matches!(err, ColoringError::MalformedInput(ref m) if m.contains("duplicate node")));
    }

    #[test]
    fn test_rejects_inconsistent_degree() {
        assert!(matches!(
            Graph::from_source(&Lopsided),
            Err(ColoringError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_add_edge_ignores_loops_and_repeats() {
        let mut list = AdjacencyList::new();
        assert!(list.add_edge(1, 2));
        assert!(!list.add_edge(2, 1));
        assert!(!list.add_edge(3, 3));
        assert_eq!(list.edge_count(), 1);
    }

    #[test]
    fn test_remove_available_keeps_order() {
        let mut state = NodeState {
            available_colors: vec![0, 1, 2, 3],
            ..NodeState::default()
        };
        assert!(state.remove_available(2));
        assert!(!state.remove_available(2));
        assert_eq!(state.available_colors, vec![0, 1, 3]);
    }
}
