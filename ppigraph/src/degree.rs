//! Degree statistics over the raw edge list.
//!
//! Everything here works on `&[Row]` directly rather than on an
//! assembled graph: a protein's degree is the number of rows it
//! appears in as either endpoint. Note the asymmetry around
//! self interactions: plain degree counting keeps them, the
//! neighbour listing drops them.

use calm_io::stdoutln;
use itertools::Itertools;
use rayon::prelude::*;
use std::cmp::Reverse;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::ppi::{Protein, Row};
use crate::MARGIN_LR;

/// A protein and its incident edge count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegreeRecord {
    pub protein: Protein,
    pub degree: usize,
}

/// Count the rows in which `protein` appears as either
/// endpoint. Self interactions count once.
pub fn degree_of(edges: &[Row], protein: &str) -> usize {
    edges
        .iter()
        .filter(|r| r.tail == protein || r.head == protein)
        .count()
}

/// Degree records for a caller-supplied list of proteins of
/// interest, in the order supplied.
pub fn degrees(edges: &[Row], proteins: &[Protein]) -> Vec<DegreeRecord> {
    proteins
        .par_iter()
        .map(|p| DegreeRecord {
            protein: p.clone(),
            degree: degree_of(edges, p),
        })
        .collect()
}

/// The flattened per-edge occurrence list: one entry per
/// (edge, protein-of-interest) incidence. The histogram is
/// built over these repeated names rather than over the degree
/// values, so each protein's bar is weighted by its degree.
pub fn occurrences(edges: &[Row], proteins: &[Protein]) -> Vec<Protein> {
    let mut all = Vec::new();
    for row in edges {
        for protein in proteins {
            if row.tail == *protein || row.head == *protein {
                all.push(protein.clone());
            }
        }
    }
    all
}

/// Sort degree records by degree, descending. Stable, so
/// equal-degree proteins keep their input order.
pub fn sort_by_degree(records: &mut [DegreeRecord]) {
    records.sort_by_key(|r| Reverse(r.degree));
}

/// A categorical histogram over protein name occurrences.
pub struct Histogram {
    pub labels: Vec<Protein>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Count occurrences per protein. Labels come out sorted so
    /// the plot is stable across runs.
    pub fn from_occurrences(occurrences: &[Protein]) -> Self {
        let count_map = occurrences.iter().counts();
        let mut labels: Vec<Protein> = count_map.keys().map(|p| (*p).clone()).collect();
        labels.sort();
        let counts = labels.iter().map(|l| count_map[l]).collect();
        Histogram { labels, counts }
    }

    /// Plot the histogram as an SVG bar chart on stdout.
    pub fn plot(&self, width: i32, height: i32) {
        let n = self.labels.len();
        let x_spacing = (width as f64 - (MARGIN_LR * 2.0)) / n.max(1) as f64;
        let max_count = self.counts.iter().max().copied().unwrap_or(1) as f64;
        let plot_height = height as f64 - (MARGIN_LR * 2.0);

        let mut bars = String::new();
        for (i, (label, count)) in self.labels.iter().zip(&self.counts).enumerate() {
            let bar_height = (*count as f64 / max_count) * plot_height;
            let x = (x_spacing * i as f64) + MARGIN_LR;
            let y = height as f64 - MARGIN_LR - bar_height;
            bars += &format!(
                "<rect x=\"{x}\" y=\"{y}\" width=\"{}\" height=\"{bar_height}\" fill=\"steelblue\" stroke=\"black\"><title>{label}: {count}</title></rect>\n",
                x_spacing * 0.9,
            );
        }

        let svg = format!(
            r#"<svg version="1.1"
    width="{width}" height="{height}"
    xmlns="http://www.w3.org/2000/svg">
    {bars}
</svg>
        "#
        );
        let _ = stdoutln!("{}", svg);
    }
}

/// The header line of the degree ranking report.
pub const DEGREE_REPORT_HEADER: &str = "Protein\tDegree";

/// Write the ranked degree report. The caller sorts; this
/// writes whatever order it is given.
pub fn write_degree_ranking<W: Write>(writer: &mut W, records: &[DegreeRecord]) -> io::Result<()> {
    writeln!(writer, "{}", DEGREE_REPORT_HEADER)?;
    for record in records {
        writeln!(writer, "{}\t{}", record.protein, record.degree)?;
    }
    Ok(())
}

/// Write the degree ranking to a file, truncating any previous
/// run.
pub fn write_degree_ranking_to(path: &Path, records: &[DegreeRecord]) -> io::Result<()> {
    let mut file = File::create(path)?;
    write_degree_ranking(&mut file, records)
}

/// The header line of the neighbour list report.
pub const NEIGHBOUR_REPORT_HEADER: &str = "Tail\t\tHead\tEdge_Weight";

/// Every row touching `protein`, excluding true self
/// interactions (tail == head == protein).
pub fn neighbour_edges<'a>(edges: &'a [Row], protein: &str) -> Vec<&'a Row> {
    edges
        .iter()
        .filter(|r| {
            (r.tail == protein || r.head == protein) && !(r.tail == protein && r.head == protein)
        })
        .collect()
}

/// Write the neighbour listing for one protein: one line per
/// incident edge, then a trailing `Degree = N` line.
pub fn write_neighbour_list<W: Write>(
    writer: &mut W,
    edges: &[Row],
    protein: &str,
) -> io::Result<()> {
    writeln!(writer, "{}", NEIGHBOUR_REPORT_HEADER)?;
    let neighbours = neighbour_edges(edges, protein);
    for row in &neighbours {
        writeln!(writer, "{}\t{}\t{}", row.tail, row.head, row.weight)?;
    }
    writeln!(writer, "Degree = {}", neighbours.len())?;
    Ok(())
}

/// Write the neighbour listing to a file, truncating any
/// previous run.
pub fn write_neighbour_list_to(path: &Path, edges: &[Row], protein: &str) -> io::Result<()> {
    let mut file = File::create(path)?;
    write_neighbour_list(&mut file, edges, protein)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> Vec<Row> {
        vec![
            Row::new("A", "B", 1),
            Row::new("B", "C", 2),
            Row::new("A", "A", 5),
        ]
    }

    #[test]
    fn test_degree_counts_self_loops() {
        let edges = edges();
        assert_eq!(degree_of(&edges, "A"), 2, "(A,B) and (A,A)");
        assert_eq!(degree_of(&edges, "B"), 2);
        assert_eq!(degree_of(&edges, "C"), 1);
        assert_eq!(degree_of(&edges, "Z"), 0);
    }

    #[test]
    fn test_degrees_preserve_input_order() {
        let edges = edges();
        let records = degrees(&edges, &["C".to_string(), "A".to_string()]);

        assert_eq!(records[0].protein, "C");
        assert_eq!(records[0].degree, 1);
        assert_eq!(records[1].protein, "A");
        assert_eq!(records[1].degree, 2);
    }

    #[test]
    fn test_neighbour_edges_exclude_self_loops() {
        let edges = edges();
        let neighbours = neighbour_edges(&edges, "A");

        assert_eq!(neighbours.len(), 1, "the (A,A) self interaction is skipped");
        assert_eq!(neighbours[0].head, "B");
    }

    #[test]
    fn test_neighbour_list_reports_degree() {
        let edges = edges();
        let mut out = Vec::new();
        write_neighbour_list(&mut out, &edges, "A").unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.starts_with(NEIGHBOUR_REPORT_HEADER));
        assert!(report.ends_with("Degree = 1\n"));
    }

    #[test]
    fn test_neighbour_list_header_only_for_isolated_protein() {
        let edges = edges();
        let mut out = Vec::new();
        write_neighbour_list(&mut out, &edges, "Z").unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\nDegree = 0\n", NEIGHBOUR_REPORT_HEADER)
        );
    }

    #[test]
    fn test_sort_by_degree_is_stable_descending() {
        let mut records = vec![
            DegreeRecord {
                protein: "P1".to_string(),
                degree: 1,
            },
            DegreeRecord {
                protein: "P2".to_string(),
                degree: 3,
            },
            DegreeRecord {
                protein: "P3".to_string(),
                degree: 1,
            },
        ];
        sort_by_degree(&mut records);

        assert_eq!(records[0].protein, "P2");
        // equal degrees keep input order
        assert_eq!(records[1].protein, "P1");
        assert_eq!(records[2].protein, "P3");
    }

    #[test]
    fn test_degree_report_header_written_for_empty_records() {
        let mut out = Vec::new();
        write_degree_ranking(&mut out, &[]).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n", DEGREE_REPORT_HEADER)
        );
    }

    #[test]
    fn test_histogram_counts_equal_degrees() {
        let edges = edges();
        let proteins = vec!["A".to_string(), "B".to_string()];
        let occ = occurrences(&edges, &proteins);
        let histogram = Histogram::from_occurrences(&occ);

        assert_eq!(histogram.labels, vec!["A", "B"]);
        assert_eq!(
            histogram.counts,
            vec![degree_of(&edges, "A"), degree_of(&edges, "B")]
        );
    }

    #[test]
    fn test_histogram_plot_does_not_panic_when_empty() {
        let histogram = Histogram::from_occurrences(&[]);
        histogram.plot(600, 400);
    }
}
