//! Bounded simple-path search between two proteins.
//!
//! Paths are drawn from an enumerator with an explicit ordering
//! guarantee: `ShortestSimplePaths` is Yen's algorithm over the
//! interaction graph and yields simple paths in non-decreasing
//! total weight order. The accumulation rule on top of it is the
//! ratchet described on [`bounded_search`].

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{EdgeType, Graph};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::ppi::{DirectedPpiGraph, PpiGraph, Protein, Weight};

/// Errors surfaced by the path search. The first two are
/// recoverable outcomes of a query, not failures of the
/// program; callers report them and move on.
#[derive(Debug, PartialEq, Eq)]
pub enum PathSearchError {
    SameProtein,
    NoPath { source: String, target: String },
    ProteinNotFound(String),
}

impl std::fmt::Display for PathSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SameProtein => write!(f, "Please use two different proteins."),
            Self::NoPath { source, target } => {
                write!(f, "No path between {source} and {target}.")
            }
            Self::ProteinNotFound(p) => {
                write!(f, "Protein {p} is not present in the network.")
            }
        }
    }
}

impl std::error::Error for PathSearchError {}

/// One accepted path between the query proteins.
///
/// Invariant: `edges.len() == path.len() - 1` and
/// `total_weight` is the sum of the edge weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    /// The proteins along the path, in traversal order.
    pub path: Vec<Protein>,
    /// Sum of the edge weights along the path.
    pub total_weight: Weight,
    /// The (from, to, weight) triples covering consecutive
    /// pairs in `path`.
    pub edges: Vec<(Protein, Protein, Weight)>,
}

/// Dijkstra restricted to a subgraph: banned nodes are never
/// visited and banned (from, to) hops are never taken. Returns
/// the cheapest path as (total weight, node sequence).
fn dijkstra_with_bans<Ty: EdgeType>(
    graph: &Graph<Protein, Weight, Ty>,
    source: NodeIndex,
    target: NodeIndex,
    banned_nodes: &HashSet<NodeIndex>,
    banned_edges: &HashSet<(NodeIndex, NodeIndex)>,
) -> Option<(Weight, Vec<NodeIndex>)> {
    let mut dist: HashMap<NodeIndex, Weight> = HashMap::new();
    let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0);
    heap.push(Reverse((0, source)));

    while let Some(Reverse((d, node))) = heap.pop() {
        if d > *dist.get(&node).unwrap_or(&Weight::MAX) {
            // stale heap entry
            continue;
        }
        if node == target {
            let mut path = vec![target];
            let mut current = target;
            while let Some(&p) = prev.get(&current) {
                path.push(p);
                current = p;
            }
            path.reverse();
            return Some((d, path));
        }
        for edge in graph.edges(node) {
            // on an undirected graph the stored source may be
            // either endpoint.
            let next = if edge.source() == node {
                edge.target()
            } else {
                edge.source()
            };
            if banned_nodes.contains(&next) || banned_edges.contains(&(node, next)) {
                continue;
            }
            let next_d = d + *edge.weight();
            if next_d < *dist.get(&next).unwrap_or(&Weight::MAX) {
                dist.insert(next, next_d);
                prev.insert(next, node);
                heap.push(Reverse((next_d, next)));
            }
        }
    }
    None
}

/// Total weight of a node sequence, re-read from the graph.
/// Parallel edges resolve to the cheapest one, the same edge
/// the Dijkstra relaxation takes.
fn path_weight<Ty: EdgeType>(graph: &Graph<Protein, Weight, Ty>, path: &[NodeIndex]) -> Weight {
    path.windows(2)
        .map(|pair| {
            graph
                .edges_connecting(pair[0], pair[1])
                .map(|e| *e.weight())
                .min()
                .expect("consecutive nodes of a yielded path share an edge")
        })
        .sum()
}

/// Yen's k-shortest simple paths as a lazy iterator.
///
/// Yields `(total_weight, node sequence)` pairs in
/// non-decreasing total weight order, one simple path at a
/// time. The caller decides when to stop pulling.
pub struct ShortestSimplePaths<'a, Ty: EdgeType> {
    graph: &'a Graph<Protein, Weight, Ty>,
    source: NodeIndex,
    target: NodeIndex,
    yielded: Vec<(Weight, Vec<NodeIndex>)>,
    candidates: BinaryHeap<Reverse<(Weight, Vec<NodeIndex>)>>,
    seen: HashSet<Vec<NodeIndex>>,
    exhausted: bool,
}

impl<'a, Ty: EdgeType> ShortestSimplePaths<'a, Ty> {
    pub fn new(graph: &'a PpiGraph<Ty>, source: NodeIndex, target: NodeIndex) -> Self {
        Self {
            graph: &graph.0,
            source,
            target,
            yielded: Vec::new(),
            candidates: BinaryHeap::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    /// Generate spur candidates off the most recently yielded
    /// path, the Yen step.
    fn push_spur_candidates(&mut self) {
        let (_, prev_path) = self.yielded.last().cloned().expect("a path was yielded");

        for i in 0..prev_path.len() - 1 {
            let spur_node = prev_path[i];
            let root = &prev_path[..=i];

            // ban the outgoing hop of every already-yielded path
            // sharing this root, so the spur must deviate here.
            let mut banned_edges = HashSet::new();
            for (_, p) in &self.yielded {
                if p.len() > i + 1 && p[..=i] == *root {
                    banned_edges.insert((p[i], p[i + 1]));
                }
            }
            // the root (minus the spur node itself) may not be
            // revisited, keeping candidates simple.
            let banned_nodes: HashSet<NodeIndex> = root[..i].iter().copied().collect();

            if let Some((_, spur_path)) = dijkstra_with_bans(
                self.graph,
                spur_node,
                self.target,
                &banned_nodes,
                &banned_edges,
            ) {
                let mut candidate: Vec<NodeIndex> = root[..i].to_vec();
                candidate.extend(spur_path);
                if self.seen.insert(candidate.clone()) {
                    let weight = path_weight(self.graph, &candidate);
                    self.candidates.push(Reverse((weight, candidate)));
                }
            }
        }
    }
}

impl<Ty: EdgeType> Iterator for ShortestSimplePaths<'_, Ty> {
    type Item = (Weight, Vec<NodeIndex>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let next_path = if self.yielded.is_empty() {
            dijkstra_with_bans(
                self.graph,
                self.source,
                self.target,
                &HashSet::new(),
                &HashSet::new(),
            )
            .inspect(|(_, p)| {
                self.seen.insert(p.clone());
            })
        } else {
            self.push_spur_candidates();
            self.candidates.pop().map(|Reverse(p)| p)
        };

        match next_path {
            Some(p) => {
                self.yielded.push(p.clone());
                Some(p)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

/// The accept/stop rule over an ordered path stream.
///
/// Accept while each new weight does not exceed the weight of
/// the previously accepted path, ratcheting the threshold to
/// each accepted weight; the first strictly-worse path ends the
/// scan. Note this is not a strict global-minimum filter: an
/// out-of-order stream such as [3, 3, 5, 4, 10] yields
/// [3, 3, 5, 4]. See [`strict_search`] for the alternative.
fn accept_bounded<I>(paths: I) -> Vec<(Weight, Vec<NodeIndex>)>
where
    I: Iterator<Item = (Weight, Vec<NodeIndex>)>,
{
    let mut temp_weight = Weight::MAX;
    let mut accepted = Vec::new();
    for (weight, path) in paths {
        if weight <= temp_weight {
            temp_weight = weight;
            accepted.push((weight, path));
        } else {
            break;
        }
    }
    accepted
}

/// Build a `PathRecord`, re-querying the graph for each
/// consecutive pair rather than trusting the enumerator's
/// bookkeeping.
fn record_from<Ty: EdgeType>(graph: &PpiGraph<Ty>, path: &[NodeIndex]) -> PathRecord {
    let edges: Vec<(Protein, Protein, Weight)> = path
        .windows(2)
        .map(|pair| {
            let weight = graph
                .edge_weight(pair[0], pair[1])
                .expect("consecutive nodes of a yielded path share an edge");
            (graph.0[pair[0]].clone(), graph.0[pair[1]].clone(), weight)
        })
        .collect();

    PathRecord {
        path: path.iter().map(|&n| graph.0[n].clone()).collect(),
        total_weight: edges.iter().map(|(_, _, w)| w).sum(),
        edges,
    }
}

fn resolve_query<Ty: EdgeType>(
    graph: &PpiGraph<Ty>,
    source: &str,
    target: &str,
) -> Result<(NodeIndex, NodeIndex), PathSearchError> {
    if source == target {
        return Err(PathSearchError::SameProtein);
    }
    let s = graph
        .node_index(source)
        .ok_or_else(|| PathSearchError::ProteinNotFound(source.to_string()))?;
    let t = graph
        .node_index(target)
        .ok_or_else(|| PathSearchError::ProteinNotFound(target.to_string()))?;
    Ok((s, t))
}

/// The bounded search: pull simple paths in non-decreasing
/// weight order and accept under the ratchet rule described on
/// [`accept_bounded`].
pub fn bounded_search<Ty: EdgeType>(
    graph: &PpiGraph<Ty>,
    source: &str,
    target: &str,
) -> Result<Vec<PathRecord>, PathSearchError> {
    let (s, t) = resolve_query(graph, source, target)?;

    let accepted = accept_bounded(ShortestSimplePaths::new(graph, s, t));
    if accepted.is_empty() {
        return Err(PathSearchError::NoPath {
            source: source.to_string(),
            target: target.to_string(),
        });
    }
    Ok(accepted
        .iter()
        .map(|(_, path)| record_from(graph, path))
        .collect())
}

/// The strict variant: only paths tied for the global minimum
/// weight are returned. Opt-in deviation from the ratchet rule
/// of [`bounded_search`].
pub fn strict_search<Ty: EdgeType>(
    graph: &PpiGraph<Ty>,
    source: &str,
    target: &str,
) -> Result<Vec<PathRecord>, PathSearchError> {
    let (s, t) = resolve_query(graph, source, target)?;

    let mut paths = ShortestSimplePaths::new(graph, s, t);
    let Some((best, first)) = paths.next() else {
        return Err(PathSearchError::NoPath {
            source: source.to_string(),
            target: target.to_string(),
        });
    };
    let mut accepted = vec![record_from(graph, &first)];
    for (weight, path) in paths {
        if weight > best {
            break;
        }
        accepted.push(record_from(graph, &path));
    }
    Ok(accepted)
}

/// The header line of the path report.
pub const PATH_REPORT_HEADER: &str = "#Path\t\t\tTotal_Weight\tEdges_Weights";

/// Write the path report: one line per accepted path with the
/// comma-joined proteins, the total weight, and the per-edge
/// weights in traversal order. The header is written even when
/// there are no records.
pub fn write_path_report<W: Write>(writer: &mut W, records: &[PathRecord]) -> io::Result<()> {
    writeln!(writer, "{}", PATH_REPORT_HEADER)?;
    for record in records {
        let path_joined = record.path.join(",");
        let edge_weights = record
            .edges
            .iter()
            .map(|(_, _, w)| w.to_string())
            .collect::<Vec<String>>()
            .join(",");
        writeln!(
            writer,
            "{}\t{}\t{}",
            path_joined, record.total_weight, edge_weights
        )?;
    }
    Ok(())
}

/// Write the path report to a file, truncating any previous run.
pub fn write_path_report_to(path: &Path, records: &[PathRecord]) -> io::Result<()> {
    let mut file = File::create(path)?;
    write_path_report(&mut file, records)
}

/// Re-parse a path report into (protein sequence, total weight)
/// pairs. The inverse of [`write_path_report`] up to string
/// formatting.
pub fn parse_path_report<R: BufRead>(reader: R) -> io::Result<Vec<(Vec<Protein>, Weight)>> {
    let mut parsed = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(path), Some(weight)) = (fields.next(), fields.next()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed report line: {line}"),
            ));
        };
        let weight: Weight = weight
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        parsed.push((path.split(',').map(String::from).collect(), weight));
    }
    Ok(parsed)
}

/// Flatten the edges of all accepted paths into one directed
/// subgraph for plotting. Paths sharing an edge re-add the same
/// triple; the last write wins.
pub fn subgraph(records: &[PathRecord]) -> DirectedPpiGraph {
    let mut graph = Graph::new();
    let mut node_index_map: HashMap<Protein, NodeIndex> = HashMap::new();

    for record in records {
        for (from, to, weight) in &record.edges {
            let f = *node_index_map
                .entry(from.clone())
                .or_insert_with(|| graph.add_node(from.clone()));
            let t = *node_index_map
                .entry(to.clone())
                .or_insert_with(|| graph.add_node(to.clone()));
            graph.update_edge(f, t, *weight);
        }
    }
    PpiGraph(graph)
}
