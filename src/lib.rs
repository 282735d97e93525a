//! Simulation of a synchronous, randomized distributed vertex colouring.
//!
//! Every node only talks to its direct neighbours. Each round a node proposes
//! a random colour from the ones it still has available, tells its uncoloured
//! neighbours, and keeps the colour only if no neighbour proposed the same
//! one. Winners are removed from their neighbours' available sets. With
//! `max_degree + 1` colours no uncoloured node can run out.
//!
//! ```no_run
//! use distributed_coloring::{color_graph, generators, verify, Graph};
//!
//! let source = generators::cycle(10);
//! let coloring = color_graph(&source)?;
//! assert!(verify(&Graph::from_source(&source)?, &coloring));
//! # Ok::<(), distributed_coloring::ColoringError>(())
//! ```

pub mod coloring;
pub mod config;
pub mod dimacs;
pub mod error;
pub mod generators;
pub mod graph;
pub mod network;
pub mod protocol;
pub mod scheduler;
pub mod trace;

pub use coloring::{check_coloring, verify, Coloring};
pub use config::{ExecutionMode, SimulationConfig};
pub use error::{ColoringError, Result};
pub use graph::{AdjacencyList, Color, Graph, GraphSource, NodeId, NodeState};
pub use network::color_graph_concurrent;
pub use protocol::Resolution;
pub use scheduler::{rng_from_seed, RoundSummary, Simulation};
pub use trace::{
    JsonLinesSink, LogSink, MemorySink, NodeSnapshot, NoopSink, TraceConfig, TraceEvent, TracePoint, TraceSink,
};

/// Colours a graph with default settings and no tracing.
pub fn color_graph<S: GraphSource + ?Sized>(source: &S) -> Result<Coloring> {
    color_graph_with(source, &SimulationConfig::default(), &mut NoopSink)
}

/// Colours a graph with an explicit configuration and trace sink.
///
/// Input is validated before any node is initialized. In concurrent mode a
/// private current-thread runtime drives the node tasks, so this must not be
/// called from inside another tokio runtime; use [`color_graph_concurrent`]
/// there instead.
pub fn color_graph_with<S: GraphSource + ?Sized>(
    source: &S,
    config: &SimulationConfig,
    sink: &mut dyn TraceSink,
) -> Result<Coloring> {
    config.validate()?;
    let graph = Graph::from_source(source)?;

    match config.mode {
        ExecutionMode::Sequential => Simulation::new(graph, config, sink)?.run(),
        ExecutionMode::Concurrent => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(ColoringError::Io)?;
            runtime.block_on(color_graph_concurrent(graph, config, sink))
        }
    }
}
