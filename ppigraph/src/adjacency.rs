//! A 0/1 adjacency matrix over the raw edge list.
//!
//! The membership test is literal and directed: cell (i, j) is
//! 1 iff the exact (tail, head) tuple appears somewhere in the
//! input. Self interactions are valid entries, and a reverse
//! edge is only recorded if it is present as its own row.

use ndarray::Array2;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::ppi::{Protein, Row};

/// A square 0/1 matrix with a fixed label order.
pub struct AdjacencyMatrix {
    pub inner: Array2<u8>,
    pub labels: Vec<Protein>,
}

impl AdjacencyMatrix {
    /// Build the matrix from an edge list.
    ///
    /// When `labels` is supplied its order fixes the row/column
    /// order; otherwise labels are every protein in the edge
    /// list, sorted and deduplicated, so the order is stable
    /// across runs.
    pub fn from_edges(edges: &[Row], labels: Option<Vec<Protein>>) -> Self {
        let labels = labels.unwrap_or_else(|| {
            let mut all: Vec<Protein> = edges
                .iter()
                .flat_map(|r| [r.tail.clone(), r.head.clone()])
                .collect();
            all.sort();
            all.dedup();
            all
        });

        let pairs: HashSet<(&str, &str)> = edges
            .iter()
            .map(|r| (r.tail.as_str(), r.head.as_str()))
            .collect();

        let n = labels.len();
        let mut inner = Array2::<u8>::zeros((n, n));
        for (i, tail) in labels.iter().enumerate() {
            for (j, head) in labels.iter().enumerate() {
                if pairs.contains(&(tail.as_str(), head.as_str())) {
                    inner[[i, j]] = 1;
                }
            }
        }

        AdjacencyMatrix { inner, labels }
    }

    /// Write the matrix as a TSV: a header row of labels, then
    /// one labelled 0/1 row per protein.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "{}", self)
    }

    /// Write the matrix to a file, truncating any previous run.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;
        self.write(&mut file)
    }
}

impl fmt::Display for AdjacencyMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t{}", self.labels.join("\t"))?;
        for (i, label) in self.labels.iter().enumerate() {
            let cells = self
                .inner
                .row(i)
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<String>>()
                .join("\t");
            writeln!(f, "{}\t{}", label, cells)?;
        }
        Ok(())
    }
}
