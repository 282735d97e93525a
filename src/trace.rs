use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::graph::{Color, NodeId, NodeState};

/// Which observation points produce trace events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub initialize: bool,
    pub propose: bool,
    pub announce: bool,
    pub resolve: bool,
    pub round: bool,
    pub verify: bool,
}

impl TraceConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            initialize: true,
            propose: true,
            announce: true,
            resolve: true,
            round: true,
            verify: true,
        }
    }

    pub fn is_enabled(&self, point: TracePoint) -> bool {
        match point {
            TracePoint::Initialize => self.initialize,
            TracePoint::Propose => self.propose,
            TracePoint::Announce => self.announce,
            TracePoint::Resolve => self.resolve,
            TracePoint::Round => self.round,
            TracePoint::Verify => self.verify,
        }
    }

    pub fn any(&self) -> bool {
        self.initialize || self.propose || self.announce || self.resolve || self.round || self.verify
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracePoint {
    Initialize,
    Propose,
    Announce,
    Resolve,
    Round,
    Verify,
}

/// State of one node at an observation point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub available_colors: Vec<Color>,
    pub candidate: Option<Color>,
    pub received_candidates: Vec<Color>,
    pub final_color: Option<Color>,
}

impl NodeSnapshot {
    pub fn capture(id: NodeId, state: &NodeState) -> Self {
        Self {
            id,
            available_colors: state.available_colors.clone(),
            candidate: state.candidate,
            received_candidates: state.received_candidates.clone(),
            final_color: state.final_color,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Initialized {
        node: NodeSnapshot,
    },
    Proposed {
        round: u64,
        node: NodeSnapshot,
    },
    Announced {
        round: u64,
        node: NodeId,
        candidate: Color,
        notified: usize,
    },
    Resolved {
        round: u64,
        node: NodeSnapshot,
        committed: bool,
    },
    RoundCompleted {
        round: u64,
        newly_colored: usize,
        uncolored: usize,
    },
    Verified {
        valid: bool,
        rounds: u64,
    },
}

impl TraceEvent {
    pub fn point(&self) -> TracePoint {
        match self {
            TraceEvent::Initialized { .. } => TracePoint::Initialize,
            TraceEvent::Proposed { .. } => TracePoint::Propose,
            TraceEvent::Announced { .. } => TracePoint::Announce,
            TraceEvent::Resolved { .. } => TracePoint::Resolve,
            TraceEvent::RoundCompleted { .. } => TracePoint::Round,
            TraceEvent::Verified { .. } => TracePoint::Verify,
        }
    }
}

/// Passive observer of a run. Has no influence on the outcome.
pub trait TraceSink {
    fn record(&mut self, event: &TraceEvent);
}

pub struct NoopSink;

impl TraceSink for NoopSink {
    fn record(&mut self, _event: &TraceEvent) {}
}

/// Forwards events to the `log` facade.
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::Initialized { node } => {
                log::trace!("node {} initialized with colors {:?}", node.id, node.available_colors)
            }
            TraceEvent::Proposed { round, node } => {
                log::debug!("round {}: node {} selected candidate {:?}", round, node.id, node.candidate)
            }
            TraceEvent::Announced {
                round,
                node,
                candidate,
                notified,
            } => log::trace!(
                "round {}: node {} announced {} to {} neighbors",
                round,
                node,
                candidate,
                notified
            ),
            TraceEvent::Resolved {
                round,
                node,
                committed: true,
            } => log::debug!(
                "round {}: node {} permanently colored with {:?}",
                round,
                node.id,
                node.final_color
            ),
            TraceEvent::Resolved { round, node, .. } => {
                log::debug!("round {}: node {} discarded its candidate", round, node.id)
            }
            TraceEvent::RoundCompleted {
                round,
                newly_colored,
                uncolored,
            } => log::info!(
                "round {} complete: {} colored, {} uncolored",
                round,
                newly_colored,
                uncolored
            ),
            TraceEvent::Verified { valid, rounds } => {
                log::info!("coloring valid: {} after {} rounds", valid, rounds)
            }
        }
    }
}

/// Writes one JSON object per event.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for JsonLinesSink<W> {
    fn record(&mut self, event: &TraceEvent) {
        if self.failed {
            return;
        }
        let written = serde_json::to_writer(&mut self.writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        // A broken trace stream must not stop the run.
        if let Err(e) = written {
            log::warn!("trace output disabled after write failure: {}", e);
            self.failed = true;
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct MemorySink {
    pub events: Vec<TraceEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, point: TracePoint) -> usize {
        self.events.iter().filter(|e| e.point() == point).count()
    }
}

impl TraceSink for MemorySink {
    fn record(&mut self, event: &TraceEvent) {
        self.events.push(event.clone());
    }
}

/// Couples a config with a sink and only builds events that are enabled.
pub struct Tracer<'a> {
    config: TraceConfig,
    sink: &'a mut dyn TraceSink,
}

impl<'a> Tracer<'a> {
    pub fn new(config: TraceConfig, sink: &'a mut dyn TraceSink) -> Self {
        Self { config, sink }
    }

    pub fn emit<F>(&mut self, point: TracePoint, build: F)
    where
        F: FnOnce() -> TraceEvent,
    {
        if self.config.is_enabled(point) {
            let event = build();
            self.sink.record(&event);
        }
    }
}
