use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ColoringError, Result};
use crate::graph::{Color, Graph, NodeId};

/// Final colour assignment produced by a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coloring {
    pub colors: BTreeMap<NodeId, Color>,
    /// Rounds the protocol needed to colour every node.
    pub rounds: u64,
    /// Size of the colour space, `max_degree + 1`.
    pub palette_size: usize,
}

impl Coloring {
    /// Reads the final colours out of a fully coloured graph.
    pub fn from_graph(graph: &Graph, rounds: u64) -> Result<Self> {
        let mut colors = BTreeMap::new();
        for (slot, state) in graph.states().iter().enumerate() {
            let color = state.final_color.ok_or_else(|| {
                ColoringError::invariant(format!(
                    "node {} has no final color after termination",
                    graph.id_of(slot)
                ))
            })?;
            colors.insert(graph.id_of(slot), color);
        }
        Ok(Self {
            colors,
            rounds,
            palette_size: graph.max_degree() + 1,
        })
    }

    pub fn get(&self, id: NodeId) -> Option<Color> {
        self.colors.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Number of distinct colours actually used.
    pub fn distinct_colors(&self) -> usize {
        self.colors.values().collect::<BTreeSet<_>>().len()
    }
}

/// Returns true if every node is coloured and no edge joins two equal colours.
///
/// Reads only; calling it repeatedly on the same inputs gives the same answer.
pub fn verify(graph: &Graph, coloring: &Coloring) -> bool {
    check_coloring(graph, coloring).is_ok()
}

/// Like [`verify`], but names the first offending node or edge.
pub fn check_coloring(graph: &Graph, coloring: &Coloring) -> Result<()> {
    for &id in graph.node_ids() {
        if coloring.get(id).is_none() {
            return Err(ColoringError::invariant(format!("node {} is uncolored", id)));
        }
    }

    for (u, v) in graph.edges() {
        let (a, b) = (graph.id_of(u), graph.id_of(v));
        if coloring.get(a) == coloring.get(b) {
            return Err(ColoringError::invariant(format!(
                "adjacent nodes {} and {} share color {:?}",
                a,
                b,
                coloring.get(a)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjacencyList;

    fn path_of_three() -> Graph {
        let mut list = AdjacencyList::new();
        list.add_edge(1, 2);
        list.add_edge(2, 3);
        Graph::from_source(&list).unwrap()
    }

    fn coloring(pairs: &[(NodeId, Color)]) -> Coloring {
        Coloring {
            colors: pairs.iter().copied().collect(),
            rounds: 1,
            palette_size: 3,
        }
    }

    #[test]
    fn test_accepts_proper_coloring() {
        let graph = path_of_three();
        let c = coloring(&[(1, 0), (2, 1), (3, 0)]);
        assert!(verify(&graph, &c));
        assert_eq!(c.distinct_colors(), 2);
    }

    #[test]
    fn test_rejects_shared_color_on_edge() {
        let graph = path_of_three();
        let c = coloring(&[(1, 0), (2, 1), (3, 1)]);
        assert!(!verify(&graph, &c));
        let err = check_coloring(&graph, &c).unwrap_err();
        assert!(matches!(err, ColoringError::InvariantViolation(ref m) if m.contains("share color")));
    }

    #[test]
    fn test_rejects_missing_node() {
        let graph = path_of_three();
        let c = coloring(&[(1, 0), (2, 1)]);
        assert!(!verify(&graph, &c));
    }

    #[test]
    fn test_verify_is_repeatable() {
        let graph = path_of_three();
        let c = coloring(&[(1, 2), (2, 0), (3, 2)]);
        let first = verify(&graph, &c);
        let second = verify(&graph, &c);
        assert_eq!(first, second);
        assert!(first);
    }

    #[test]
    fn test_from_graph_requires_every_node_colored() {
        let graph = path_of_three();
        assert!(Coloring::from_graph(&graph, 0).is_err());
    }
}
