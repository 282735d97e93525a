//! Graph sources for experiments and regression runs.
//!
//! None of this is needed by the protocol itself; it only has to hand over an
//! `AdjacencyList`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::error::{ColoringError, Result};
use crate::graph::{AdjacencyList, GraphSource, NodeId};
use crate::scheduler::rng_from_seed;

// Give up on a random regular graph after this many failed pairings.
const MAX_REGULAR_ATTEMPTS: usize = 1000;

// Keeps the generator stream apart from the colouring stream for the same seed.
const GRAPH_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// RNG for building graphs, derived from the run seed.
///
/// The same seed always yields the same graphs, without replaying the draws
/// the colouring will make from that seed.
pub fn graph_rng(seed: Option<u64>) -> StdRng {
    rng_from_seed(seed.map(|seed| seed ^ GRAPH_SEED_SALT))
}

pub fn empty(n: u64) -> AdjacencyList {
    AdjacencyList::with_nodes(n)
}

pub fn path(n: u64) -> AdjacencyList {
    let mut graph = AdjacencyList::with_nodes(n);
    for i in 1..n {
        graph.add_edge(i - 1, i);
    }
    graph
}

pub fn cycle(n: u64) -> AdjacencyList {
    let mut graph = path(n);
    if n > 2 {
        graph.add_edge(n - 1, 0);
    }
    graph
}

pub fn complete(n: u64) -> AdjacencyList {
    let mut graph = AdjacencyList::with_nodes(n);
    for u in 0..n {
        for v in (u + 1)..n {
            graph.add_edge(u, v);
        }
    }
    graph
}

/// Node 0 joined to `leaves` other nodes.
pub fn star(leaves: u64) -> AdjacencyList {
    let mut graph = AdjacencyList::with_nodes(leaves + 1);
    for leaf in 1..=leaves {
        graph.add_edge(0, leaf);
    }
    graph
}

/// Erdős–Rényi G(n, p).
pub fn gnp<R: Rng + ?Sized>(n: u64, p: f64, rng: &mut R) -> Result<AdjacencyList> {
    if !(0.0..=1.0).contains(&p) {
        return Err(ColoringError::config(format!("edge probability {} outside [0, 1]", p)));
    }
    let mut graph = AdjacencyList::with_nodes(n);
    for u in 0..n {
        for v in (u + 1)..n {
            if rng.gen_bool(p) {
                graph.add_edge(u, v);
            }
        }
    }
    Ok(graph)
}

/// Uniform-ish random `degree`-regular graph on `n` nodes.
///
/// Pairs degree stubs at random, keeps the valid pairs and re-pairs the rest
/// until nothing is left or the leftovers cannot form a new edge.
pub fn random_regular<R: Rng + ?Sized>(degree: u64, n: u64, rng: &mut R) -> Result<AdjacencyList> {
    let stubs = n.checked_mul(degree).ok_or_else(|| {
        ColoringError::config(format!("n * degree overflows (n = {}, degree = {})", n, degree))
    })?;
    if stubs % 2 != 0 {
        return Err(ColoringError::config(format!(
            "n * degree must be even (n = {}, degree = {})",
            n, degree
        )));
    }
    if degree >= n && degree > 0 {
        return Err(ColoringError::config(format!(
            "degree {} must be smaller than the node count {}",
            degree, n
        )));
    }

    for attempt in 1..=MAX_REGULAR_ATTEMPTS {
        if let Some(edges) = try_regular_pairing(degree, n, rng) {
            log::debug!("random regular graph built on attempt {}", attempt);
            let mut graph = AdjacencyList::with_nodes(n);
            for (u, v) in edges {
                graph.add_edge(u, v);
            }
            return Ok(graph);
        }
    }
    Err(ColoringError::config(format!(
        "no {}-regular graph on {} nodes after {} attempts",
        degree, n, MAX_REGULAR_ATTEMPTS
    )))
}

fn try_regular_pairing<R: Rng + ?Sized>(degree: u64, n: u64, rng: &mut R) -> Option<BTreeSet<(NodeId, NodeId)>> {
    let mut edges = BTreeSet::new();
    let mut stubs: Vec<NodeId> = (0..n).flat_map(|node| std::iter::repeat(node).take(degree as usize)).collect();

    while !stubs.is_empty() {
        let mut leftover: BTreeMap<NodeId, usize> = BTreeMap::new();
        stubs.shuffle(rng);
        for pair in stubs.chunks_exact(2) {
            let (a, b) = (pair[0].min(pair[1]), pair[0].max(pair[1]));
            if a != b && edges.insert((a, b)) {
                continue;
            }
            *leftover.entry(a).or_default() += 1;
            *leftover.entry(b).or_default() += 1;
        }

        if !leftover_can_pair(&edges, &leftover) {
            return None;
        }
        stubs = leftover
            .iter()
            .flat_map(|(&node, &count)| std::iter::repeat(node).take(count))
            .collect();
    }
    Some(edges)
}

fn leftover_can_pair(edges: &BTreeSet<(NodeId, NodeId)>, leftover: &BTreeMap<NodeId, usize>) -> bool {
    if leftover.is_empty() {
        return true;
    }
    let nodes: Vec<NodeId> = leftover.keys().copied().collect();
    nodes
        .iter()
        .enumerate()
        .any(|(i, &a)| nodes[i + 1..].iter().any(|&b| !edges.contains(&(a, b))))
}

/// Caterpillar backbone of random length with random legs, each leg possibly
/// carrying further leaves. `p_leg` and `p_leaf` must be below 1.
pub fn random_lobster<R: Rng + ?Sized>(n: u64, p_leg: f64, p_leaf: f64, rng: &mut R) -> Result<AdjacencyList> {
    for p in [p_leg, p_leaf] {
        if !(0.0..1.0).contains(&p) {
            return Err(ColoringError::config(format!("lobster probability {} outside [0, 1)", p)));
        }
    }

    let backbone = (2.0 * rng.gen::<f64>() * n as f64 + 0.5) as u64;
    let mut graph = path(backbone);
    let mut next = backbone;
    for spine in 0..backbone {
        while rng.gen::<f64>() < p_leg {
            let leg = next;
            next += 1;
            graph.add_edge(spine, leg);
            while rng.gen::<f64>() < p_leaf {
                graph.add_edge(leg, next);
                next += 1;
            }
        }
    }
    Ok(graph)
}

/// Preferential attachment: every new node links to `m` existing nodes
/// chosen with probability proportional to their degree.
pub fn barabasi_albert<R: Rng + ?Sized>(n: u64, m: u64, rng: &mut R) -> Result<AdjacencyList> {
    if m < 1 || m >= n {
        return Err(ColoringError::config(format!(
            "attachment count {} must satisfy 1 <= m < n = {}",
            m, n
        )));
    }

    let mut graph = star(m);
    let mut weighted: Vec<NodeId> = Vec::new();
    for node in 0..=m {
        weighted.extend(std::iter::repeat(node).take(graph.degree(node)));
    }

    for source in (m + 1)..n {
        let mut targets = BTreeSet::new();
        while targets.len() < m as usize {
            if let Some(&target) = weighted.choose(rng) {
                targets.insert(target);
            }
        }
        for target in targets {
            graph.add_edge(source, target);
            weighted.push(target);
            weighted.push(source);
        }
    }
    Ok(graph)
}

/// Concentric shells. Each `(nodes, edges, ratio)` describes one shell; a
/// `ratio` share of its edges stays inside the shell, the rest reach into the
/// next shell outward.
pub fn random_shell<R: Rng + ?Sized>(shells: &[(u64, u64, f64)], rng: &mut R) -> Result<AdjacencyList> {
    let mut graph = AdjacencyList::new();
    let mut ranges = Vec::with_capacity(shells.len());
    let mut offset = 0;
    for &(nodes, _, ratio) in shells {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ColoringError::config(format!("shell ratio {} outside [0, 1]", ratio)));
        }
        for id in offset..offset + nodes {
            graph.add_node(id);
        }
        ranges.push(offset..offset + nodes);
        offset += nodes;
    }

    for (i, &(nodes, edges, ratio)) in shells.iter().enumerate() {
        let inner = ranges[i].clone();
        let intra = (edges as f64 * ratio) as u64;
        let max_intra = nodes * nodes.saturating_sub(1) / 2;
        add_random_edges(&mut graph, rng, intra.min(max_intra), inner.clone(), inner.clone());

        if let Some(outer) = ranges.get(i + 1) {
            let inter = edges - intra;
            let max_inter = nodes * (outer.end - outer.start);
            add_random_edges(&mut graph, rng, inter.min(max_inter), inner, outer.clone());
        }
    }
    Ok(graph)
}

fn add_random_edges<R: Rng + ?Sized>(
    graph: &mut AdjacencyList,
    rng: &mut R,
    count: u64,
    from: Range<u64>,
    to: Range<u64>,
) {
    if from.is_empty() || to.is_empty() {
        return;
    }
    let mut added = 0;
    while added < count {
        let u = rng.gen_range(from.clone());
        let v = rng.gen_range(to.clone());
        if graph.add_edge(u, v) {
            added += 1;
        }
    }
}

/// Places `b` next to `a`, renumbering `b`'s nodes after `a`'s highest id.
pub fn disjoint_union(a: &AdjacencyList, b: &AdjacencyList) -> AdjacencyList {
    let mut graph = a.clone();
    let shift = a.nodes().into_iter().max().map(|max| max + 1).unwrap_or(0);
    for node in b.nodes() {
        graph.add_node(node + shift);
        for neighbor in b.neighbors(node) {
            graph.add_edge(node + shift, neighbor + shift);
        }
    }
    graph
}
