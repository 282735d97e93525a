//! Per-node colouring protocol.
//!
//! A node moves `Uncolored -> (Proposing -> Resolving)* -> Colored`. Every
//! operation is a no-op on a coloured node. The local transitions live on
//! `NodeState` so that both the sequential scheduler and the per-node tasks
//! share them; the graph-level functions add the neighbour side effects.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ColoringError, Result};
use crate::graph::{Color, Graph, NodeId, NodeState};

/// What `resolve` did to a node this round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Already coloured before the round; nothing happened.
    Inert,
    /// The candidate was unique among neighbours and is now permanent.
    Colored(Color),
    /// A neighbour announced the same candidate; retry next round.
    Discarded(Color),
}

impl NodeState {
    /// Resets the node to uncoloured with the full palette available.
    pub fn initialize(&mut self, palette: &[Color]) {
        self.available_colors = palette.to_vec();
        self.available_colors.sort_unstable();
        self.available_colors.dedup();
        self.candidate = None;
        self.received_candidates.clear();
        self.final_color = None;
    }

    /// Picks a candidate uniformly from the available colours.
    ///
    /// Fails if an uncoloured node has run out of colours, which means the
    /// palette was too small or a colour was removed from a non-neighbour.
    pub fn propose<R: Rng + ?Sized>(&mut self, id: NodeId, rng: &mut R) -> Result<Option<Color>> {
        if self.is_colored() {
            return Ok(None);
        }
        let candidate = *self.available_colors.choose(rng).ok_or_else(|| {
            ColoringError::invariant(format!("node {} has no available colors left", id))
        })?;
        self.candidate = Some(candidate);
        Ok(Some(candidate))
    }

    /// Commits or discards the candidate, then clears the round's announcements.
    ///
    /// Only the node's own state changes here; removing the committed colour
    /// from neighbours is up to the caller.
    pub fn settle(&mut self, id: NodeId) -> Result<Resolution> {
        if self.is_colored() {
            return Ok(Resolution::Inert);
        }
        let candidate = self.candidate.ok_or_else(|| {
            ColoringError::invariant(format!("node {} resolved without a candidate", id))
        })?;

        let resolution = if self.received_candidates.contains(&candidate) {
            self.candidate = None;
            Resolution::Discarded(candidate)
        } else {
            self.final_color = Some(candidate);
            self.candidate = None;
            Resolution::Colored(candidate)
        };
        self.received_candidates.clear();
        Ok(resolution)
    }
}

pub fn initialize(graph: &mut Graph, slot: usize, palette: &[Color]) {
    graph.states[slot].initialize(palette);
}

pub fn propose<R: Rng + ?Sized>(graph: &mut Graph, slot: usize, rng: &mut R) -> Result<Option<Color>> {
    let id = graph.id_of(slot);
    graph.states[slot].propose(id, rng)
}

/// Delivers this node's candidate to every uncoloured neighbour.
///
/// Returns the number of neighbours notified.
pub fn announce(graph: &mut Graph, slot: usize) -> usize {
    let candidate = match (&graph.states[slot].final_color, graph.states[slot].candidate) {
        (None, Some(candidate)) => candidate,
        _ => return 0,
    };

    let mut notified = 0;
    for i in 0..graph.neighbor_slots(slot).len() {
        let neighbor = graph.neighbor_slots(slot)[i];
        let state = &mut graph.states[neighbor];
        if !state.is_colored() {
            state.received_candidates.push(candidate);
            notified += 1;
        }
    }
    notified
}

/// Resolves the round for one node and propagates a win to its neighbours.
pub fn resolve(graph: &mut Graph, slot: usize) -> Result<Resolution> {
    let id = graph.id_of(slot);
    let resolution = graph.states[slot].settle(id)?;

    if let Resolution::Colored(color) = resolution {
        for i in 0..graph.neighbor_slots(slot).len() {
            let neighbor = graph.neighbor_slots(slot)[i];
            graph.states[neighbor].remove_available(color);
        }
    }
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjacencyList;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pair() -> Graph {
        let mut list = AdjacencyList::new();
        list.add_edge(0, 1);
        Graph::from_source(&list).unwrap()
    }

    #[test]
    fn test_initialize_sets_full_palette() {
        let mut graph = pair();
        let palette = graph.palette();
        initialize(&mut graph, 0, &palette);

        let state = graph.state(0);
        assert_eq!(state.available_colors, vec![0, 1]);
        assert_eq!(state.candidate, None);
        assert!(state.received_candidates.is_empty());
        assert_eq!(state.final_color, None);
    }

    #[test]
    fn test_propose_picks_from_available() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = NodeState::default();
        state.initialize(&[2, 5, 9]);

        for _ in 0..20 {
            let candidate = state.propose(0, &mut rng).unwrap().unwrap();
            assert!([2, 5, 9].contains(&candidate));
            assert_eq!(state.candidate, Some(candidate));
        }
    }

    #[test]
    fn test_propose_with_no_colors_is_invariant_violation() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = NodeState::default();
        let err = state.propose(3, &mut rng).unwrap_err();
        assert!(err.is_fatal_invariant());
    }

    #[test]
    fn test_colored_node_is_inert() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = NodeState {
            final_color: Some(4),
            ..NodeState::default()
        };
        assert_eq!(state.propose(0, &mut rng).unwrap(), None);
        assert_eq!(state.settle(0).unwrap(), Resolution::Inert);
        assert_eq!(state.final_color, Some(4));
    }

    #[test]
    fn test_announce_skips_colored_neighbors() {
        let mut list = AdjacencyList::new();
        list.add_edge(0, 1);
        list.add_edge(0, 2);
        let mut graph = Graph::from_source(&list).unwrap();
        let palette = graph.palette();
        for slot in 0..3 {
            initialize(&mut graph, slot, &palette);
        }

        let centre = graph.slot_of(0).unwrap();
        let colored = graph.slot_of(2).unwrap();
        graph.states[colored].final_color = Some(1);
        graph.states[centre].candidate = Some(0);

        assert_eq!(announce(&mut graph, centre), 1);
        assert_eq!(graph.state_of(1).unwrap().received_candidates, vec![0]);
        assert!(graph.state_of(2).unwrap().received_candidates.is_empty());
    }

    #[test]
    fn test_same_candidate_both_discard() {
        let mut graph = pair();
        let palette = graph.palette();
        initialize(&mut graph, 0, &palette);
        initialize(&mut graph, 1, &palette);
        graph.states[0].candidate = Some(1);
        graph.states[1].candidate = Some(1);

        announce(&mut graph, 0);
        announce(&mut graph, 1);

        assert_eq!(resolve(&mut graph, 0).unwrap(), Resolution::Discarded(1));
        assert_eq!(resolve(&mut graph, 1).unwrap(), Resolution::Discarded(1));
        for slot in 0..2 {
            let state = graph.state(slot);
            assert_eq!(state.final_color, None);
            assert_eq!(state.candidate, None);
            assert!(state.received_candidates.is_empty());
            assert_eq!(state.available_colors, vec![0, 1]);
        }
    }

    #[test]
    fn test_distinct_candidates_both_commit() {
        let mut graph = pair();
        let palette = graph.palette();
        initialize(&mut graph, 0, &palette);
        initialize(&mut graph, 1, &palette);
        graph.states[0].candidate = Some(0);
        graph.states[1].candidate = Some(1);

        announce(&mut graph, 0);
        announce(&mut graph, 1);

        assert_eq!(resolve(&mut graph, 0).unwrap(), Resolution::Colored(0));
        assert_eq!(graph.state(1).available_colors, vec![1]);
        assert_eq!(resolve(&mut graph, 1).unwrap(), Resolution::Colored(1));
        assert_eq!(graph.state(0).available_colors, vec![0]);
        assert_eq!(graph.state(0).final_color, Some(0));
        assert_eq!(graph.state(1).final_color, Some(1));
    }

    #[test]
    fn test_settle_without_candidate_fails() {
        let mut state = NodeState::default();
        state.initialize(&[0, 1]);
        assert!(state.settle(9).unwrap_err().is_fatal_invariant());
    }
}
