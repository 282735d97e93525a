//! DIMACS `.col` graph source.
//!
//! ```text
//! c comment
//! p edge 3 3
//! e 1 2
//! e 2 3
//! e 1 3
//! ```
//!
//! Vertices are 1-indexed in the file and become node ids `0..N`.

use std::fs;
use std::path::Path;

use crate::error::{ColoringError, Result};
use crate::graph::AdjacencyList;

/// Largest vertex count accepted from a problem line.
pub const MAX_VERTICES: u64 = 1 << 24;

fn parse_error(line_num: usize, message: impl Into<String>) -> ColoringError {
    ColoringError::malformed(format!("DIMACS line {}: {}", line_num, message.into()))
}

fn parse_count(token: &str, line_num: usize, what: &str) -> Result<u64> {
    token
        .parse::<u64>()
        .map_err(|_| parse_error(line_num, format!("invalid {} '{}'", what, token)))
}

pub fn parse_dimacs_file<P: AsRef<Path>>(path: P) -> Result<AdjacencyList> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        ColoringError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open DIMACS file '{}': {}", path.display(), e),
        ))
    })?;
    parse_dimacs_str(&contents)
}

pub fn parse_dimacs_str(contents: &str) -> Result<AdjacencyList> {
    let mut graph: Option<AdjacencyList> = None;
    let mut num_vertices = 0;
    let mut num_edges_declared = 0;

    for (index, raw) in contents.lines().enumerate() {
        let line_num = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "p" => {
                if graph.is_some() {
                    return Err(parse_error(line_num, "second problem line"));
                }
                if parts.len() < 4 || parts[1] != "edge" {
                    return Err(parse_error(
                        line_num,
                        format!("expected 'p edge N M', got '{}'", line),
                    ));
                }
                num_vertices = parse_count(parts[2], line_num, "vertex count")?;
                if num_vertices > MAX_VERTICES {
                    return Err(parse_error(
                        line_num,
                        format!("vertex count {} exceeds the limit of {}", num_vertices, MAX_VERTICES),
                    ));
                }
                num_edges_declared = parse_count(parts[3], line_num, "edge count")?;
                graph = Some(AdjacencyList::with_nodes(num_vertices));
            }
            "e" => {
                let graph = graph
                    .as_mut()
                    .ok_or_else(|| parse_error(line_num, "edge before problem line"))?;
                if parts.len() < 3 {
                    return Err(parse_error(line_num, format!("expected 'e U V', got '{}'", line)));
                }
                let u = parse_count(parts[1], line_num, "vertex id")?;
                let v = parse_count(parts[2], line_num, "vertex id")?;
                for vertex in [u, v] {
                    if vertex == 0 || vertex > num_vertices {
                        return Err(parse_error(
                            line_num,
                            format!("vertex {} out of range [1, {}]", vertex, num_vertices),
                        ));
                    }
                }

                if u == v {
                    log::warn!("Skipping self-loop on vertex {} at line {}", u, line_num);
                } else if !graph.add_edge(u - 1, v - 1) {
                    log::debug!("Ignoring repeated edge ({}, {}) at line {}", u, v, line_num);
                }
            }
            other => {
                log::debug!("Ignoring unknown DIMACS line type '{}' at line {}", other, line_num);
            }
        }
    }

    let graph = graph.ok_or_else(|| ColoringError::malformed("no 'p edge N M' line in DIMACS input"))?;
    if graph.edge_count() as u64 != num_edges_declared {
        log::warn!(
            "DIMACS input declared {} edges but contains {} distinct edges",
            num_edges_declared,
            graph.edge_count()
        );
    }
    Ok(graph)
}
