use anyhow::Result;
use calm_io::stdoutln;
use clap::{arg, crate_version, value_parser, ArgMatches, Command};
use ppigraph::idmap::{GENE_NAME_DB, UNIPROT_ACCESSION_DB};
use ppigraph::paths::{self, PathRecord, PathSearchError};
use ppigraph::ppi::{read_dsv, Row};
use ppigraph::{degree, AdjacencyMatrix, DirectedPpiGraph, IdMapClient, UndirectedPpiGraph};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Create the CLI in clap.
///
/// One subcommand per analysis over the loaded network, plus
/// `id-map` which needs no input file.
pub fn cli() -> Command {
    Command::new("ppigraphis")
        .bin_name("ppigraphis")
        .arg_required_else_help(true)
        .version(crate_version!())
        .subcommand(
            Command::new("network")
                .about("Load and analyse a PPI network from a tab delimited edge list.")
                .arg_required_else_help(true)
                // generic parameters
                .arg(
                    arg!(<INPUT_DSV> "An input DSV with three columns in order: tail, head, weight.")
                        // File always required
                        .required(true)
                        // and we expect it to be a PathBuf
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!([DELIMITER] "Specify the delimiter of the DSV; we assume tabs.")
                        .required(false),
                )
                .arg(
                    arg!(-p --plotnet "Render an SVG plot of the whole network.")
                        .action(clap::ArgAction::SetTrue)
                )
                .arg(
                    arg!(-u --undirected "Treat the edges as undirected.")
                        .action(clap::ArgAction::SetTrue)
                )
                .arg(
                    arg!(--dot "Print a dot representation of the network. Mainly for debugging.")
                        .action(clap::ArgAction::SetTrue)
                )
                .subcommand(
                    Command::new("shortest-paths")
                        .about("Bounded shortest simple paths between two proteins.")
                        .arg(arg!(-s --source <SOURCE> "The source protein accession.").required(true))
                        .arg(arg!(-t --target <TARGET> "The target protein accession.").required(true))
                        .arg(
                            arg!(--strict "Keep only paths tied for the global minimum weight, instead of the ratcheting accept rule.")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            arg!(-p --plotsub "Render an SVG plot of the subgraph of accepted paths.")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            arg!(-o --outdir [OUTDIR] "The directory reports are written to.")
                                .default_value("results")
                                .value_parser(value_parser!(PathBuf))
                        ),
                )
                .subcommand(
                    Command::new("degree")
                        .about("Degree ranking and occurrence histogram for proteins of interest.")
                        .arg(
                            arg!(--proteins <PROTEINS> "The proteins of interest.")
                                .required(true)
                                .num_args(1..)
                        )
                        .arg(
                            arg!(--histogram "Render an SVG histogram of the occurrence list.")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            arg!(-o --outdir [OUTDIR] "The directory reports are written to.")
                                .default_value("results")
                                .value_parser(value_parser!(PathBuf))
                        ),
                )
                .subcommand(
                    Command::new("neighbours")
                        .about("List every edge touching one protein.")
                        .arg(arg!(--protein <PROTEIN> "The protein of interest.").required(true))
                        .arg(
                            arg!(-o --outdir [OUTDIR] "The directory reports are written to.")
                                .default_value("results")
                                .value_parser(value_parser!(PathBuf))
                        ),
                )
                .subcommand(
                    Command::new("adjacency-matrix")
                        .about("Build a 0/1 adjacency matrix over the edge list.")
                        .arg(
                            arg!(--proteins [PROTEINS] "Restrict the matrix to these proteins, in this order.")
                                .num_args(1..)
                        )
                        .arg(
                            arg!(--print "Print the matrix as a TSV instead of writing the report.")
                                .action(clap::ArgAction::SetTrue)
                        )
                        .arg(
                            arg!(-o --outdir [OUTDIR] "The directory reports are written to.")
                                .default_value("results")
                                .value_parser(value_parser!(PathBuf))
                        ),
                )
            )
            .subcommand(Command::new("id-map")
                .about("Map identifiers in batch via the UniProt id mapping service.")
                .arg(
                    arg!(<IDS> "The identifiers to map.")
                        .required(true)
                        .num_args(1..)
                )
                .arg(
                    arg!(--from [FROM] "The source database.")
                        .default_value(UNIPROT_ACCESSION_DB)
                )
                .arg(
                    arg!(--to [TO] "The destination database.")
                        .default_value(GENE_NAME_DB)
                )
                .arg(
                    arg!(--maxwait [MAXWAIT] "The polling deadline in seconds.")
                        .default_value("60")
                        .value_parser(value_parser!(u64))
                )
            )
}

/// Run the path search on the right graph flavour.
fn run_search(
    rows: &[Row],
    undirected: bool,
    source: &str,
    target: &str,
    strict: bool,
) -> Result<Vec<PathRecord>, PathSearchError> {
    if undirected {
        let graph = UndirectedPpiGraph::from_rows(rows);
        if strict {
            paths::strict_search(&graph, source, target)
        } else {
            paths::bounded_search(&graph, source, target)
        }
    } else {
        let graph = DirectedPpiGraph::from_rows(rows);
        if strict {
            paths::strict_search(&graph, source, target)
        } else {
            paths::bounded_search(&graph, source, target)
        }
    }
}

/// Process all of the matches from the CLI.
pub fn process_matches(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("network", sub_matches)) => {
            // parse all of the command line args here.
            // globals
            let input = sub_matches
                .get_one::<PathBuf>("INPUT_DSV")
                .expect("required");
            let delimiter = match sub_matches.get_one::<String>("DELIMITER") {
                Some(d) => d.bytes().next().unwrap_or(b'\t'),
                None => b'\t',
            };
            let network_plot = *sub_matches
                .get_one::<bool>("plotnet")
                .expect("defaulted by clap.");
            let undirected = *sub_matches
                .get_one::<bool>("undirected")
                .expect("defaulted by clap.");
            let dot = *sub_matches
                .get_one::<bool>("dot")
                .expect("defaulted by clap.");

            // everything goes through the edge list; the graph
            // itself is only assembled where an analysis needs it.
            let rows = read_dsv(input, delimiter)?;

            match sub_matches.subcommand() {
                // user just called network
                None => {
                    if network_plot {
                        if undirected {
                            UndirectedPpiGraph::from_rows(&rows).plot(600.0);
                        } else {
                            DirectedPpiGraph::from_rows(&rows).plot(600.0);
                        }
                    } else if dot {
                        DirectedPpiGraph::from_rows(&rows).print_dot();
                    } else {
                        // default subcommand output
                        let stats = DirectedPpiGraph::from_rows(&rows).stats();
                        let _ = stdoutln!("#_nodes\t#_edges");
                        let _ = stdoutln!("{}\t{}", stats.no_nodes, stats.no_edges);
                    }
                }
                // user called shortest-paths
                Some(("shortest-paths", sp_matches)) => {
                    let source = sp_matches
                        .get_one::<String>("source")
                        .expect("required");
                    let target = sp_matches
                        .get_one::<String>("target")
                        .expect("required");
                    let strict = *sp_matches
                        .get_one::<bool>("strict")
                        .expect("defaulted by clap.");
                    let plot_sub = *sp_matches
                        .get_one::<bool>("plotsub")
                        .expect("defaulted by clap.");
                    let outdir = sp_matches
                        .get_one::<PathBuf>("outdir")
                        .expect("defaulted by clap.");

                    let records = match run_search(&rows, undirected, source, target, strict) {
                        Ok(records) => records,
                        // recoverable outcomes of the query; say
                        // so and write nothing.
                        Err(e @ (PathSearchError::SameProtein | PathSearchError::NoPath { .. })) => {
                            eprintln!("{}", e);
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    };

                    fs::create_dir_all(outdir)?;
                    let report = outdir.join("ShortestPaths.txt");
                    paths::write_path_report_to(&report, &records)?;
                    eprintln!(
                        "Wrote {} path(s) to {}.",
                        records.len(),
                        report.display()
                    );

                    if plot_sub {
                        paths::subgraph(&records).plot(600.0);
                    }
                }
                // user called degree
                Some(("degree", d_matches)) => {
                    let proteins: Vec<String> = d_matches
                        .get_many::<String>("proteins")
                        .expect("required")
                        .cloned()
                        .collect();
                    let histogram = *d_matches
                        .get_one::<bool>("histogram")
                        .expect("defaulted by clap.");
                    let outdir = d_matches
                        .get_one::<PathBuf>("outdir")
                        .expect("defaulted by clap.");

                    let mut records = degree::degrees(&rows, &proteins);
                    degree::sort_by_degree(&mut records);

                    fs::create_dir_all(outdir)?;
                    let report = outdir.join("DegreeRanking.txt");
                    degree::write_degree_ranking_to(&report, &records)?;
                    eprintln!(
                        "Wrote {} degree record(s) to {}.",
                        records.len(),
                        report.display()
                    );

                    if histogram {
                        let occurrences = degree::occurrences(&rows, &proteins);
                        degree::Histogram::from_occurrences(&occurrences).plot(600, 400);
                    }
                }
                // user called neighbours
                Some(("neighbours", n_matches)) => {
                    let protein = n_matches
                        .get_one::<String>("protein")
                        .expect("required");
                    let outdir = n_matches
                        .get_one::<PathBuf>("outdir")
                        .expect("defaulted by clap.");

                    fs::create_dir_all(outdir)?;
                    let report = outdir.join("NeighbourList.txt");
                    degree::write_neighbour_list_to(&report, &rows, protein)?;
                    eprintln!("Wrote neighbour list to {}.", report.display());
                }
                // user called adjacency-matrix
                Some(("adjacency-matrix", am_matches)) => {
                    let proteins: Option<Vec<String>> = am_matches
                        .get_many::<String>("proteins")
                        .map(|ps| ps.cloned().collect());
                    let print = *am_matches
                        .get_one::<bool>("print")
                        .expect("defaulted by clap.");
                    let outdir = am_matches
                        .get_one::<PathBuf>("outdir")
                        .expect("defaulted by clap.");

                    let matrix = AdjacencyMatrix::from_edges(&rows, proteins);

                    if print {
                        let _ = stdoutln!("{}", matrix);
                    } else {
                        fs::create_dir_all(outdir)?;
                        let report = outdir.join("AdjacencyMatrix.txt");
                        matrix.write_to(&report)?;
                        eprintln!(
                            "Wrote a {0} x {0} matrix to {1}.",
                            matrix.labels.len(),
                            report.display()
                        );
                    }
                }
                _ => unreachable!("Should never reach here."),
            }
        }
        Some(("id-map", im_matches)) => {
            let ids: Vec<String> = im_matches
                .get_many::<String>("IDS")
                .expect("required")
                .cloned()
                .collect();
            let from_db = im_matches
                .get_one::<String>("from")
                .expect("defaulted by clap.");
            let to_db = im_matches
                .get_one::<String>("to")
                .expect("defaulted by clap.");
            let max_wait = *im_matches
                .get_one::<u64>("maxwait")
                .expect("defaulted by clap.");

            let client = IdMapClient::new().max_wait(Duration::from_secs(max_wait));
            let mapped = client.map_ids(from_db, to_db, &ids)?;

            let _ = stdoutln!("from\tto");
            for (from, to) in mapped {
                let _ = stdoutln!("{}\t{}", from, to);
            }
        }
        _ => unreachable!("Should never reach here."),
    }

    Ok(())
}
