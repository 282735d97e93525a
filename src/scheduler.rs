use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::coloring::{check_coloring, Coloring};
use crate::config::SimulationConfig;
use crate::error::{ColoringError, Result};
use crate::graph::Graph;
use crate::protocol::{self, Resolution};
use crate::trace::{NodeSnapshot, TraceEvent, TracePoint, TraceSink, Tracer};

/// Outcome of one synchronous round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u64,
    pub proposed: usize,
    pub discarded: usize,
    pub newly_colored: usize,
    pub uncolored: usize,
}

/// Seeded RNG when a seed is given, OS entropy otherwise.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Single-threaded round scheduler.
///
/// Each phase runs over every node before the next phase starts, so the loop
/// boundaries are the barriers.
pub struct Simulation<'a> {
    graph: Graph,
    round: u64,
    max_rounds: Option<u64>,
    rng: StdRng,
    tracer: Tracer<'a>,
}

impl<'a> Simulation<'a> {
    /// Initializes every node with the full palette `[0, max_degree]`.
    ///
    /// Fails with `ColoringError::Config` if the config is invalid.
    pub fn new(mut graph: Graph, config: &SimulationConfig, sink: &'a mut dyn TraceSink) -> Result<Self> {
        config.validate()?;
        let palette = graph.palette();
        let mut tracer = Tracer::new(config.trace, sink);

        for slot in 0..graph.node_count() {
            protocol::initialize(&mut graph, slot, &palette);
            tracer.emit(TracePoint::Initialize, || TraceEvent::Initialized {
                node: NodeSnapshot::capture(graph.id_of(slot), graph.state(slot)),
            });
        }

        log::info!(
            "Starting coloring of {} nodes / {} edges with {} colors",
            graph.node_count(),
            graph.edge_count(),
            palette.len()
        );

        Ok(Self {
            graph,
            round: 0,
            max_rounds: config.max_rounds,
            rng: rng_from_seed(config.seed),
            tracer,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of rounds completed so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn uncolored(&self) -> usize {
        self.graph.uncolored_count()
    }

    pub fn is_complete(&self) -> bool {
        self.uncolored() == 0
    }

    /// Runs one propose+announce phase followed by one resolve phase.
    pub fn run_round(&mut self) -> Result<RoundSummary> {
        self.round += 1;
        let round = self.round;
        let mut summary = RoundSummary {
            round,
            ..RoundSummary::default()
        };

        // Phase 1: propose + announce
        for slot in 0..self.graph.node_count() {
            if protocol::propose(&mut self.graph, slot, &mut self.rng)?.is_none() {
                continue;
            }
            summary.proposed += 1;
            let graph = &self.graph;
            self.tracer.emit(TracePoint::Propose, || TraceEvent::Proposed {
                round,
                node: NodeSnapshot::capture(graph.id_of(slot), graph.state(slot)),
            });

            let notified = protocol::announce(&mut self.graph, slot);
            let graph = &self.graph;
            self.tracer.emit(TracePoint::Announce, || TraceEvent::Announced {
                round,
                node: graph.id_of(slot),
                candidate: graph.state(slot).candidate.unwrap_or_default(),
                notified,
            });
        }

        // Phase 2: resolve
        for slot in 0..self.graph.node_count() {
            let committed = match protocol::resolve(&mut self.graph, slot)? {
                Resolution::Inert => continue,
                Resolution::Colored(_) => {
                    summary.newly_colored += 1;
                    true
                }
                Resolution::Discarded(_) => {
                    summary.discarded += 1;
                    false
                }
            };
            let graph = &self.graph;
            self.tracer.emit(TracePoint::Resolve, || TraceEvent::Resolved {
                round,
                node: NodeSnapshot::capture(graph.id_of(slot), graph.state(slot)),
                committed,
            });
        }

        summary.uncolored = self.graph.uncolored_count();
        self.tracer.emit(TracePoint::Round, || TraceEvent::RoundCompleted {
            round,
            newly_colored: summary.newly_colored,
            uncolored: summary.uncolored,
        });
        log::debug!(
            "Round {}: {} proposed, {} colored, {} discarded, {} uncolored",
            round,
            summary.proposed,
            summary.newly_colored,
            summary.discarded,
            summary.uncolored
        );
        Ok(summary)
    }

    /// Runs rounds until every node is coloured, then verifies the result.
    pub fn run(mut self) -> Result<Coloring> {
        while !self.is_complete() {
            if let Some(limit) = self.max_rounds {
                if self.round >= limit {
                    return Err(ColoringError::RoundLimitExceeded {
                        limit,
                        uncolored: self.uncolored(),
                    });
                }
            }
            self.run_round()?;
        }
        self.finish()
    }

    fn finish(mut self) -> Result<Coloring> {
        let coloring = Coloring::from_graph(&self.graph, self.round)?;
        let verdict = check_coloring(&self.graph, &coloring);
        let rounds = self.round;
        self.tracer.emit(TracePoint::Verify, || TraceEvent::Verified {
            valid: verdict.is_ok(),
            rounds,
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
}
