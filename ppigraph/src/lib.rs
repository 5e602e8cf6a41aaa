//! `ppigraph` is a crate to build and analyse
//! protein-protein interaction (PPI) networks.

/// A module to load tab delimited edge lists and
/// assemble weighted interaction graphs.
pub mod ppi;
pub use ppi::{DirectedPpiGraph, PpiGraph, Row, UndirectedPpiGraph};

/// Bounded simple-path search between two proteins,
/// plus the path report writer and subgraph builder.
pub mod paths;
pub use paths::PathRecord;

/// Degree counting, occurrence histograms and neighbour
/// listings over the raw edge list.
pub mod degree;
pub use degree::DegreeRecord;

/// A module to create and write 0/1 adjacency matrices.
pub mod adjacency;
pub use adjacency::AdjacencyMatrix;

/// Remote batch identifier mapping (UniProt accessions
/// to gene names and back).
pub mod idmap;
pub use idmap::IdMapClient;

/// The margins for the all the graph plots
/// used in this crate.
const MARGIN_LR: f64 = 20.0;

/// Scale a number between zero and 1, given a min/max.
pub fn scale_fit(x: f64, min_x: f64, max_x: f64) -> f64 {
    ((1.0 - 0.1) * ((x - min_x) / (max_x - min_x))) + 0.1
}
