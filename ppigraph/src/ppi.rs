//! Loading of tab delimited edge lists and assembly of
//! weighted protein-protein interaction graphs.
//!
//! The edge list format is the one used by PathLinker-style
//! interactomes: a header line (skipped), then one
//! `tail<TAB>head<TAB>weight` row per interaction. Older data
//! sets omit the weight column, in which case every edge gets
//! a weight of 1.

use calm_io::stdoutln;
use csv::ReaderBuilder;
use petgraph::dot::{Config, Dot};
use petgraph::graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoNodeReferences};
use petgraph::{Directed, EdgeType, Graph, Undirected};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::{scale_fit, MARGIN_LR};

/// Error type for reading in a DSV.
#[derive(Error, Debug)]
pub enum ReadDsvError {
    #[error("Problem reading from path.")]
    FromPath { source: csv::Error },
    #[error("Problem with StringRecord: {source}")]
    StringRecordParseError { source: csv::Error },
}

/// A protein is identified by its accession string.
pub type Protein = String;
/// Edge weights are non-negative integers.
pub type Weight = u64;

/// A row in the DSV. Exactly three columns in the order
/// tail, head, weight; the weight column may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// The tail protein of the interaction.
    pub tail: Protein,
    /// The head protein of the interaction.
    pub head: Protein,
    /// The confidence weight of the interaction.
    pub weight: Weight,
}

impl Row {
    pub fn new(tail: impl Into<Protein>, head: impl Into<Protein>, weight: Weight) -> Self {
        Self {
            tail: tail.into(),
            head: head.into(),
            weight,
        }
    }
}

/// Read an edge list from a DSV at `input`.
///
/// The first line is treated as a header and skipped, whatever
/// it contains (PathLinker files start with `#tail`, so we
/// cannot match on column names). Duplicate rows are kept.
pub fn read_dsv(input: &Path, delimiter: u8) -> Result<Vec<Row>, ReadDsvError> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(input)
        .map_err(|s| ReadDsvError::FromPath { source: s })?;

    let mut edges = Vec::new();

    for result in rdr.deserialize() {
        let (tail, head, weight): (String, String, Option<Weight>) =
            result.map_err(|s| ReadDsvError::StringRecordParseError { source: s })?;
        edges.push(Row {
            tail,
            head,
            weight: weight.unwrap_or(1),
        });
    }
    Ok(edges)
}

/// A weighted interaction graph over proteins. Generic over the
/// edge type so the same loader serves the directed and the
/// undirected analyses.
pub struct PpiGraph<Ty: EdgeType = Directed>(pub Graph<Protein, Weight, Ty>);

/// The directed flavour of the network.
pub type DirectedPpiGraph = PpiGraph<Directed>;
/// The undirected flavour of the network.
pub type UndirectedPpiGraph = PpiGraph<Undirected>;

/// Node and edge counts for a `PpiGraph`.
pub struct PpiStats {
    pub no_nodes: usize,
    pub no_edges: usize,
}

impl<Ty: EdgeType> PpiGraph<Ty> {
    /// Build a graph from an edge list.
    pub fn from_rows(rows: &[Row]) -> Self {
        // create a unique vector of nodes
        let tails: Vec<&Protein> = rows.iter().map(|e| &e.tail).collect();
        let heads: Vec<&Protein> = rows.iter().map(|e| &e.head).collect();

        // collect into nodes, sort, dedup
        let mut nodes: Vec<&Protein> = tails.into_iter().chain(heads).collect();
        nodes.sort();
        nodes.dedup();

        let mut graph: Graph<Protein, Weight, Ty> = Graph::default();
        // we also need to make a lookup of the nodes and their indices
        let mut node_index_map = HashMap::new();

        // add the nodes, and make the map
        for node in nodes {
            let node = node.clone();
            let node_index = graph.add_node(node.clone());
            node_index_map.insert(node, node_index);
        }

        // add the edges; duplicates in the input become
        // parallel edges, as in the input file.
        for Row { tail, head, weight } in rows {
            let tail_index = node_index_map[tail];
            let head_index = node_index_map[head];
            graph.add_edge(tail_index, head_index, *weight);
        }

        PpiGraph(graph)
    }

    /// Read a DSV and assemble the graph in one go.
    pub fn from_dsv(input: &Path, delimiter: u8) -> Result<Self, ReadDsvError> {
        let rows = read_dsv(input, delimiter)?;
        Ok(Self::from_rows(&rows))
    }

    /// Look up the node index of a protein by name.
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.0
            .node_references()
            .find(|(_, n)| n.as_str() == name)
            .map(|(i, _)| i)
    }

    /// The weight of the edge running from `from` to `to`.
    ///
    /// Respects the directedness of the graph: on a directed
    /// graph only the (from, to) orientation is consulted. When
    /// duplicate input rows left parallel edges between the
    /// pair, the cheapest one wins, which is the edge any
    /// shortest-path relaxation would have taken.
    pub fn edge_weight(&self, from: NodeIndex, to: NodeIndex) -> Option<Weight> {
        self.0
            .edges_connecting(from, to)
            .map(|e| *e.weight())
            .min()
    }

    /// Node and edge counts.
    pub fn stats(&self) -> PpiStats {
        PpiStats {
            no_nodes: self.0.node_count(),
            no_edges: self.0.edge_count(),
        }
    }

    /// Plot the network as a circular layout in SVG format.
    ///
    /// Nodes are placed evenly on a circle of the given
    /// diameter; edges are drawn between their endpoints with
    /// strokes scaled by edge weight.
    pub fn plot(&self, diameter: f64) {
        let graph = &self.0;
        // this will store the positions of the nodes in cartesian space.
        let mut pos = HashMap::new();

        let node_number = graph.node_count();
        let angle = (2.0 * std::f64::consts::PI) / node_number.max(1) as f64;
        let mut nodes = String::new();

        for (i, (node, protein)) in graph.node_references().enumerate() {
            let angle_i = angle * i as f64;
            let x = diameter * angle_i.cos();
            let y = diameter * angle_i.sin();
            pos.insert(node, (x, y));

            nodes += &format!(
                "<circle cx=\"{x}\" cy=\"{y}\" r=\"6\" fill=\"green\"><title>{protein}</title></circle>\n"
            );
        }

        // in order to scale the thickness of the lines
        // we need the min/max of the edge weights.
        let weights: Vec<Weight> = graph.edge_references().map(|e| *e.weight()).collect();
        let w_min = weights.iter().min().copied().unwrap_or(0) as f64;
        let w_max = weights.iter().max().copied().unwrap_or(1) as f64;

        let mut edges = String::new();
        for edge in graph.edge_references() {
            let from = edge.source();
            let to = edge.target();
            let weight = *edge.weight();

            let stroke = if w_max > w_min {
                scale_fit(weight as f64, w_min, w_max) * 3.0
            } else {
                1.0
            };

            let (x1, y1) = pos[&from];
            // self interactions collapse onto a single point.
            let (x2, y2) = *pos.get(&to).unwrap_or(&pos[&from]);
            let edge_title = format!(
                "{} -> {} ({})",
                graph[from], graph[to], weight
            );

            edges += &format!(
                "<line x1=\"{x1}\" y1=\"{y1}\" x2=\"{x2}\" y2=\"{y2}\" stroke=\"black\" stroke-width=\"{stroke}\"><title>{edge_title}</title></line>\n"
            );
        }

        let viewbox_param1 = -diameter - MARGIN_LR;
        let viewbox_param2 = (diameter * 2.0) + (MARGIN_LR * 2.0);

        let svg = format!(
            r#"<svg version="1.1"
    viewBox="{viewbox_param1},{viewbox_param1},{viewbox_param2},{viewbox_param2}" width="{diameter}" height="{diameter}"
    xmlns="http://www.w3.org/2000/svg">
    <g>
    {edges}
    </g>
    <g>
    {nodes}
    </g>
</svg>
        "#
        );
        let _ = stdoutln!("{}", svg);
    }

    /// Make a dot representation of the graph
    /// (It's not very good...)
    pub fn print_dot(&self) {
        let _ = stdoutln!("{}", Dot::with_config(&self.0, &[Config::GraphContentOnly]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Row> {
        vec![
            Row::new("Q16787", "P24043", 1),
            Row::new("P24043", "P23229", 2),
            Row::new("Q16787", "P23229", 3),
        ]
    }

    #[test]
    fn test_from_rows_dedups_nodes() {
        let graph = DirectedPpiGraph::from_rows(&rows());

        assert_eq!(graph.0.node_count(), 3, "three unique proteins expected");
        assert_eq!(graph.0.edge_count(), 3, "all rows become edges");
    }

    #[test]
    fn test_edge_weight_is_directed() {
        let graph = DirectedPpiGraph::from_rows(&rows());
        let q = graph.node_index("Q16787").unwrap();
        let p = graph.node_index("P24043").unwrap();

        assert_eq!(graph.edge_weight(q, p), Some(1));
        assert_eq!(
            graph.edge_weight(p, q),
            None,
            "reverse orientation must not resolve on a directed graph"
        );
    }

    #[test]
    fn test_edge_weight_undirected_resolves_both_ways() {
        let graph = UndirectedPpiGraph::from_rows(&rows());
        let q = graph.node_index("Q16787").unwrap();
        let p = graph.node_index("P24043").unwrap();

        assert_eq!(graph.edge_weight(q, p), Some(1));
        assert_eq!(graph.edge_weight(p, q), Some(1));
    }

    #[test]
    fn test_parallel_edges_resolve_to_the_cheapest_weight() {
        let graph = DirectedPpiGraph::from_rows(&[
            Row::new("Q16787", "P24043", 5),
            Row::new("Q16787", "P24043", 1),
        ]);
        let q = graph.node_index("Q16787").unwrap();
        let p = graph.node_index("P24043").unwrap();

        assert_eq!(
            graph.edge_weight(q, p),
            Some(1),
            "duplicate rows with different weights resolve to the minimum"
        );
    }

    #[test]
    fn test_duplicate_rows_kept_as_parallel_edges() {
        let mut duplicated = rows();
        duplicated.push(Row::new("Q16787", "P24043", 1));
        let graph = DirectedPpiGraph::from_rows(&duplicated);

        assert_eq!(graph.0.edge_count(), 4);
    }

    #[test]
    fn test_malformed_weight_is_a_fatal_parse_error() {
        let path = std::env::temp_dir().join(format!("ppigraph-bad-row-{}.tsv", std::process::id()));
        std::fs::write(&path, "#tail\thead\tweight\nQ16787\tP24043\tnot_a_number\n").unwrap();

        let result = read_dsv(&path, b'\t');
        let _ = std::fs::remove_file(&path);

        assert!(
            matches!(result, Err(ReadDsvError::StringRecordParseError { .. })),
            "a non-numeric weight must fail loudly, got {result:?}"
        );
    }

    #[test]
    fn test_missing_weight_column_defaults_to_one() {
        let path = std::env::temp_dir().join(format!("ppigraph-two-col-{}.tsv", std::process::id()));
        std::fs::write(&path, "#tail\thead\nQ16787\tP24043\n").unwrap();

        let rows = read_dsv(&path, b'\t').unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(rows, vec![Row::new("Q16787", "P24043", 1)]);
    }

    #[test]
    fn test_plot_does_not_panic_on_empty_graph() {
        let graph = DirectedPpiGraph::from_rows(&[]);
        graph.plot(500.0);
    }

    #[test]
    fn test_stats() {
        let graph = DirectedPpiGraph::from_rows(&rows());
        let stats = graph.stats();
        assert_eq!(stats.no_nodes, 3);
        assert_eq!(stats.no_edges, 3);
    }
}
