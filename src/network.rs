//! Concurrent execution: one tokio task per node.
//!
//! Nodes only talk to their neighbours through point-to-point inboxes. A
//! coordinator drives the rounds and provides both barriers by waiting for
//! one report from every active node before starting the next phase.
//!
//! Every inbox is a single FIFO channel carrying both neighbour messages and
//! coordinator commands. A node finishes its sends before it reports, and the
//! coordinator only issues the next command after all reports are in, so a
//! node always sees this round's candidates before its `Resolve`, and this
//! round's commits before the next `Propose`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coloring::{check_coloring, Coloring};
use crate::config::SimulationConfig;
use crate::error::{ColoringError, Result};
use crate::graph::{Color, Graph, NodeId, NodeState};
use crate::protocol::Resolution;
use crate::scheduler::rng_from_seed;
use crate::trace::{NodeSnapshot, TraceEvent, TracePoint, TraceSink, Tracer};

// Message types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    // Coordinator commands
    Propose { round: u64 },
    Resolve { round: u64 },

    // Neighbour traffic
    Candidate { from: usize, color: Color },
    Committed { from: usize, color: Color },
}

/// What a node tells the coordinator after finishing a phase.
#[derive(Debug)]
pub enum Report {
    Proposed {
        slot: usize,
        snapshot: NodeSnapshot,
        notified: usize,
    },
    Resolved {
        slot: usize,
        snapshot: NodeSnapshot,
        resolution: Resolution,
    },
    Failed {
        slot: usize,
        error: ColoringError,
    },
}

// Network transport
pub struct NetworkTransport {
    inbox: mpsc::Receiver<Message>,
    neighbors: HashMap<usize, mpsc::Sender<Message>>,
    reports: mpsc::Sender<Report>,
}

impl NetworkTransport {
    pub fn new(
        inbox: mpsc::Receiver<Message>,
        neighbors: HashMap<usize, mpsc::Sender<Message>>,
        reports: mpsc::Sender<Report>,
    ) -> Self {
        Self {
            inbox,
            neighbors,
            reports,
        }
    }

    async fn send(&self, peer: usize, msg: Message) -> Result<()> {
        let tx = self
            .neighbors
            .get(&peer)
            .ok_or_else(|| ColoringError::runtime(format!("no link to neighbor slot {}", peer)))?;
        tx.send(msg)
            .await
            .map_err(|_| ColoringError::runtime(format!("inbox of slot {} is closed", peer)))
    }

    async fn recv(&mut self) -> Option<Message> {
        self.inbox.recv().await
    }

    async fn report(&self, report: Report) -> Result<()> {
        self.reports
            .send(report)
            .await
            .map_err(|_| ColoringError::runtime("coordinator stopped listening"))
    }
}

/// A node running as its own task. Owns its protocol state outright.
pub struct ColoringNode {
    slot: usize,
    id: NodeId,
    state: NodeState,
    uncolored_neighbors: HashSet<usize>,
    transport: NetworkTransport,
    shutdown: mpsc::Receiver<()>,
    rng: StdRng,
}

impl ColoringNode {
    pub fn new(
        slot: usize,
        id: NodeId,
        state: NodeState,
        transport: NetworkTransport,
        shutdown: mpsc::Receiver<()>,
        rng: StdRng,
    ) -> Self {
        let uncolored_neighbors = transport.neighbors.keys().copied().collect();
        Self {
            slot,
            id,
            state,
            uncolored_neighbors,
            transport,
            shutdown,
            rng,
        }
    }

    /// Processes messages until shut down, then hands back the final state.
    pub async fn run(mut self) -> NodeState {
        loop {
            select! {
                biased;
                Some(msg) = self.transport.recv() => {
                    let handled = match msg {
                        Message::Propose { round } => {
                            log::trace!("node {} proposing in round {}", self.id, round);
                            self.handle_propose().await
                        }
                        Message::Resolve { round } => {
                            log::trace!("node {} resolving in round {}", self.id, round);
                            self.handle_resolve().await
                        }
                        Message::Candidate { from, color } => {
                            self.handle_candidate(from, color);
                            Ok(())
                        }
                        Message::Committed { from, color } => {
                            self.handle_committed(from, color);
                            Ok(())
                        }
                    };
                    if let Err(error) = handled {
                        // Best effort; if the coordinator is gone there is nobody to tell.
                        let _ = self.transport.report(Report::Failed { slot: self.slot, error }).await;
                    }
                }
                _ = self.shutdown.recv() => {
                    break;
                }
            }
        }
        self.state
    }

    async fn handle_propose(&mut self) -> Result<()> {
        let candidate = match self.state.propose(self.id, &mut self.rng) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Err(ColoringError::invariant(format!("colored node {} asked to propose", self.id))),
            Err(e) => return Err(e),
        };

        let mut notified = 0;
        for &peer in &self.uncolored_neighbors {
            self.transport
                .send(
                    peer,
                    Message::Candidate {
                        from: self.slot,
                        color: candidate,
                    },
                )
                .await?;
            notified += 1;
        }

        self.transport
            .report(Report::Proposed {
                slot: self.slot,
                snapshot: NodeSnapshot::capture(self.id, &self.state),
                notified,
            })
            .await
    }

    async fn handle_resolve(&mut self) -> Result<()> {
        let resolution = self.state.settle(self.id)?;

        if let Resolution::Colored(color) = resolution {
            for &peer in self.transport.neighbors.keys() {
                self.transport
                    .send(
                        peer,
                        Message::Committed {
                            from: self.slot,
                            color,
                        },
                    )
                    .await?;
            }
        }

        self.transport
            .report(Report::Resolved {
                slot: self.slot,
                snapshot: NodeSnapshot::capture(self.id, &self.state),
                resolution,
            })
            .await
    }

    fn handle_candidate(&mut self, from: usize, color: Color) {
        if self.state.is_colored() {
            log::trace!("node {} ignoring candidate {} from slot {}", self.id, color, from);
            return;
        }
        self.state.received_candidates.push(color);
    }

    fn handle_committed(&mut self, from: usize, color: Color) {
        self.state.remove_available(color);
        self.uncolored_neighbors.remove(&from);
    }
}

struct Deployment {
    inboxes: Vec<mpsc::Sender<Message>>,
    shutdowns: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<NodeState>>,
    reports: mpsc::Receiver<Report>,
}

impl Deployment {
    async fn command(&self, slots: &[usize], msg: Message) -> Result<()> {
        for &slot in slots {
            self.inboxes[slot]
                .send(msg.clone())
                .await
                .map_err(|_| ColoringError::runtime(format!("node task for slot {} has stopped", slot)))?;
        }
        Ok(())
    }

    async fn next_report(&mut self) -> Result<Report> {
        self.reports
            .recv()
            .await
            .ok_or_else(|| ColoringError::runtime("all node tasks stopped reporting"))
    }

    async fn shutdown(self) -> Result<Vec<NodeState>> {
        for tx in &self.shutdowns {
            let _ = tx.send(()).await;
        }
        let mut states = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let state = handle
                .await
                .map_err(|e| ColoringError::runtime(format!("node task failed: {}", e)))?;
            states.push(state);
        }
        Ok(states)
    }
}

fn deploy(graph: &Graph, palette: &[Color], config: &SimulationConfig, tracer: &mut Tracer<'_>) -> Deployment {
    let n = graph.node_count();
    let capacity = 2 * graph.max_degree() + 4;
    let (report_tx, report_rx) = mpsc::channel(n.max(1));
    let mut master = rng_from_seed(config.seed);

    let (inboxes, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| mpsc::channel(capacity)).unzip();
    let mut shutdowns = Vec::with_capacity(n);
    let mut handles = Vec::with_capacity(n);

    for (slot, inbox) in receivers.into_iter().enumerate() {
        let id = graph.id_of(slot);
        let mut state = NodeState::default();
        state.initialize(palette);
        tracer.emit(TracePoint::Initialize, || TraceEvent::Initialized {
            node: NodeSnapshot::capture(id, &state),
        });

        let neighbors = graph
            .neighbor_slots(slot)
            .iter()
            .map(|&peer| (peer, inboxes[peer].clone()))
            .collect();
        let transport = NetworkTransport::new(inbox, neighbors, report_tx.clone());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let rng = StdRng::seed_from_u64(master.gen());

        let node = ColoringNode::new(slot, id, state, transport, shutdown_rx, rng);
        handles.push(tokio::spawn(node.run()));
        shutdowns.push(shutdown_tx);
    }

    Deployment {
        inboxes,
        shutdowns,
        handles,
        reports: report_rx,
    }
}

/// Colours `graph` with one task per node. Must be called inside a tokio runtime.
pub async fn color_graph_concurrent(
    mut graph: Graph,
    config: &SimulationConfig,
    sink: &mut dyn TraceSink,
) -> Result<Coloring> {
    config.validate()?;
    let palette = graph.palette();
    let mut tracer = Tracer::new(config.trace, sink);
    let mut deployment = deploy(&graph, &palette, config, &mut tracer);

    log::info!(
        "Deployed {} node tasks for {} edges with {} colors",
        graph.node_count(),
        graph.edge_count(),
        palette.len()
    );

    let mut active: Vec<usize> = (0..graph.node_count()).collect();
    let mut round = 0u64;

    while !active.is_empty() {
        if let Some(limit) = config.max_rounds {
            if round >= limit {
                return Err(ColoringError::RoundLimitExceeded {
                    limit,
                    uncolored: active.len(),
                });
            }
        }
        round += 1;

        // Phase 1: propose + announce, then barrier
        deployment.command(&active, Message::Propose { round }).await?;
        for _ in 0..active.len() {
            match deployment.next_report().await? {
                Report::Proposed {
                    snapshot, notified, ..
                } => {
                    let candidate = snapshot.candidate.unwrap_or_default();
                    let node = snapshot.id;
                    tracer.emit(TracePoint::Propose, || TraceEvent::Proposed { round, node: snapshot });
                    tracer.emit(TracePoint::Announce, || TraceEvent::Announced {
                        round,
                        node,
                        candidate,
                        notified,
                    });
                }
                Report::Failed { slot, error } => {
                    log::error!("Node in slot {} failed in round {}: {}", slot, round, error);
                    return Err(error);
                }
                Report::Resolved { slot, .. } => {
                    return Err(ColoringError::invariant(format!(
                        "slot {} resolved during the propose phase of round {}",
                        slot, round
                    )))
                }
            }
        }

        // Phase 2: resolve, then barrier
        deployment.command(&active, Message::Resolve { round }).await?;
        let mut colored = HashSet::new();
        for _ in 0..active.len() {
            match deployment.next_report().await? {
                Report::Resolved {
                    slot,
                    snapshot,
                    resolution,
                } => {
                    let committed = matches!(resolution, Resolution::Colored(_));
                    if committed {
                        colored.insert(slot);
                    }
                    tracer.emit(TracePoint::Resolve, || TraceEvent::Resolved {
                        round,
                        node: snapshot,
                        committed,
                    });
                }
                Report::Failed { slot, error } => {
                    log::error!("Node in slot {} failed in round {}: {}", slot, round, error);
                    return Err(error);
                }
                Report::Proposed { slot, .. } => {
                    return Err(ColoringError::invariant(format!(
                        "slot {} proposed during the resolve phase of round {}",
                        slot, round
                    )))
                }
            }
        }

        active.retain(|slot| !colored.contains(slot));
        let uncolored = active.len();
        tracer.emit(TracePoint::Round, || TraceEvent::RoundCompleted {
            round,
            newly_colored: colored.len(),
            uncolored,
        });
        log::debug!("Round {}: {} colored, {} uncolored", round, colored.len(), uncolored);
    }

    let states = deployment.shutdown().await?;
    graph.replace_states(states);

    let coloring = Coloring::from_graph(&graph, round)?;
    let verdict = check_coloring(&graph, &coloring);
    tracer.emit(TracePoint::Verify, || TraceEvent::Verified {
        valid: verdict.is_ok(),
        rounds: round,
    });
    verdict?;

    log::info!(
        "Colored {} nodes in {} rounds using {} of {} colors",
        coloring.len(),
        coloring.rounds,
        coloring.distinct_colors(),
        coloring.palette_size
    );
    Ok(coloring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjacencyList;
    use crate::trace::{MemorySink, NoopSink, TraceConfig};

    fn complete(k: u64) -> Graph {
        let mut list = AdjacencyList::with_nodes(k);
        for u in 0..k {
            for v in (u + 1)..k {
                list.add_edge(u, v);
            }
        }
        Graph::from_source(&list).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_complete_graph_uses_every_color() {
        let config = SimulationConfig::default().with_seed(17);
        let graph = complete(8);
        let coloring = color_graph_concurrent(graph.clone(), &config, &mut NoopSink)
            .await
            .unwrap();

        assert_eq!(coloring.len(), 8);
        assert_eq!(coloring.palette_size, 8);
        assert_eq!(coloring.distinct_colors(), 8);
        assert!(crate::coloring::verify(&graph, &coloring));
    }

    #[tokio::test]
    async fn test_concurrent_edgeless_graph_one_round() {
        let graph = Graph::from_source(&AdjacencyList::with_nodes(5)).unwrap();
        let coloring = color_graph_concurrent(graph, &SimulationConfig::default(), &mut NoopSink)
            .await
            .unwrap();
        assert_eq!(coloring.rounds, 1);
        assert!(coloring.colors.values().all(|&c| c == 0));
    }

    #[tokio::test]
    async fn test_concurrent_empty_graph() {
        let graph = Graph::from_source(&AdjacencyList::new()).unwrap();
        let coloring = color_graph_concurrent(graph, &SimulationConfig::default(), &mut NoopSink)
            .await
            .unwrap();
        assert!(coloring.is_empty());
        assert_eq!(coloring.rounds, 0);
    }

    #[tokio::test]
    async fn test_concurrent_trace_counts() {
        let mut sink = MemorySink::new();
        let config = SimulationConfig::default()
            .with_seed(2)
            .with_trace(TraceConfig::all());
        let coloring = color_graph_concurrent(complete(4), &config, &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.count(TracePoint::Initialize), 4);
        assert_eq!(sink.count(TracePoint::Round) as u64, coloring.rounds);
        assert_eq!(sink.count(TracePoint::Propose), sink.count(TracePoint::Resolve));
        assert_eq!(sink.count(TracePoint::Verify), 1);
    }

    #[tokio::test]
    async fn test_node_discards_on_matching_candidate() {
        let (inbox_tx, inbox_rx) = mpsc::channel(8);
        let (peer_tx, mut peer_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut state = NodeState::default();
        state.initialize(&[0]);
        let neighbors = HashMap::from([(1usize, peer_tx)]);
        let transport = NetworkTransport::new(inbox_rx, neighbors, report_tx);
        let node = ColoringNode::new(0, 100, state, transport, shutdown_rx, StdRng::seed_from_u64(1));
        let handle = tokio::spawn(node.run());

        inbox_tx.send(Message::Propose { round: 1 }).await.unwrap();
        assert_eq!(
            peer_rx.recv().await.unwrap(),
            Message::Candidate { from: 0, color: 0 }
        );
        assert!(matches!(report_rx.recv().await.unwrap(), Report::Proposed { notified: 1, .. }));

        inbox_tx.send(Message::Candidate { from: 1, color: 0 }).await.unwrap();
        inbox_tx.send(Message::Resolve { round: 1 }).await.unwrap();
        match report_rx.recv().await.unwrap() {
            Report::Resolved { resolution, .. } => assert_eq!(resolution, Resolution::Discarded(0)),
            other => panic!("unexpected report {:?}", other),
        }

        shutdown_tx.send(()).await.unwrap();
        let state = handle.await.unwrap();
        assert_eq!(state.final_color, None);
        assert!(state.received_candidates.is_empty());
    }

    #[tokio::test]
    async fn test_commit_from_neighbor_shrinks_palette() {
        let (inbox_tx, inbox_rx) = mpsc::channel(8);
        let (peer_tx, mut peer_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut state = NodeState::default();
        state.initialize(&[0, 1]);
        let neighbors = HashMap::from([(1usize, peer_tx)]);
        let transport = NetworkTransport::new(inbox_rx, neighbors, report_tx);
        let node = ColoringNode::new(0, 100, state, transport, shutdown_rx, StdRng::seed_from_u64(4));
        let handle = tokio::spawn(node.run());

        inbox_tx.send(Message::Committed { from: 1, color: 1 }).await.unwrap();
        inbox_tx.send(Message::Propose { round: 2 }).await.unwrap();
        match report_rx.recv().await.unwrap() {
            Report::Proposed { snapshot, notified, .. } => {
                assert_eq!(snapshot.available_colors, vec![0]);
                assert_eq!(snapshot.candidate, Some(0));
                // The only neighbour is coloured, so nobody is told.
                assert_eq!(notified, 0);
            }
            other => panic!("unexpected report {:?}", other),
        }
        assert!(peer_rx.try_recv().is_err());

        inbox_tx.send(Message::Resolve { round: 2 }).await.unwrap();
        assert!(matches!(
            report_rx.recv().await.unwrap(),
            Report::Resolved { resolution: Resolution::Colored(0), .. }
        ));
        assert_eq!(
            peer_rx.recv().await.unwrap(),
            Message::Committed { from: 0, color: 0 }
        );

        shutdown_tx.send(()).await.unwrap();
        assert_eq!(handle.await.unwrap().final_color, Some(0));
    }

    #[tokio::test]
    async fn test_exhausted_palette_reports_fatal_failure() {
        let (inbox_tx, inbox_rx) = mpsc::channel(8);
        let (peer_tx, mut peer_rx) = mpsc::channel(8);
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut state = NodeState::default();
        state.initialize(&[]);
        let neighbors = HashMap::from([(1usize, peer_tx)]);
        let transport = NetworkTransport::new(inbox_rx, neighbors, report_tx);
        let node = ColoringNode::new(0, 7, state, transport, shutdown_rx, StdRng::seed_from_u64(9));
        let handle = tokio::spawn(node.run());

        inbox_tx.send(Message::Propose { round: 1 }).await.unwrap();
        match report_rx.recv().await.unwrap() {
            Report::Failed { slot, error } => {
                assert_eq!(slot, 0);
                assert!(error.is_fatal_invariant());
                assert!(error.to_string().contains("node 7"));
            }
            other => panic!("unexpected report {:?}", other),
        }
        // Nothing was announced.
        assert!(peer_rx.try_recv().is_err());

        shutdown_tx.send(()).await.unwrap();
        assert_eq!(handle.await.unwrap().candidate, None);
    }

    #[tokio::test]
    async fn test_concurrent_rejects_zero_round_cap() {
        let config = SimulationConfig {
            max_rounds: Some(0),
            ..SimulationConfig::default()
        };
        let err = color_graph_concurrent(complete(3), &config, &mut NoopSink)
            .await
            .unwrap_err();
        assert!(matches!(err, ColoringError::Config(_)));
    }
}
