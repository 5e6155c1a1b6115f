// Copyright (c) Anza Technology, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Command-line front end of Flint.
//!
//! The latency table is read from a file if one is given (on the command
//! line or in the config file) and fetched from cloudping otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{Context, bail};
use flint::config::{Config, resolve_all};
use flint::distance::{DistanceTable, RegionFamily, cloudping};
use flint::protocol::AnyProtocol;
use flint::report::Evaluation;
use flint::search::{Configuration, Contender, SearchParams, reoptimize, search_configurations};
use flint::{Objective, ProtocolKind, Region, export, logging};
use log::{info, warn};
use serde::Serialize;

/// Latency estimation and placement search for quorum-based replication protocols.
#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file to use.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Latency table to load instead of fetching it from cloudping.
    #[arg(long, short)]
    latency_file: Option<PathBuf>,
    /// Objective of the leader and fast quorum optimizers.
    #[arg(long, value_enum)]
    objective: Option<ObjectiveArg>,
    /// Also print the optimizers' debug output.
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Prints the latency table.
    Table,
    /// Compares all protocols for one placement.
    Show {
        /// Replica regions (comma separated, full names or identifiers).
        #[arg(long, value_delimiter = ',')]
        replicas: Vec<String>,
        /// Client regions (comma separated, full names or identifiers).
        #[arg(long, value_delimiter = ',')]
        clients: Vec<String>,
        /// Protocol to show in detail.
        #[arg(long, value_enum, default_value_t = ProtocolArg::SwiftPaxos)]
        protocol: ProtocolArg,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Searches placements where one protocol beats another by at least 10%.
    Search {
        /// Number of replicas.
        #[arg(long)]
        replicas: Option<usize>,
        /// Total number of clients (at least 2).
        #[arg(long)]
        clients: Option<usize>,
        /// Protocol that should win.
        #[arg(long, value_enum)]
        first: Option<ProtocolArg>,
        /// Protocol to beat.
        #[arg(long, value_enum)]
        second: Option<ProtocolArg>,
        /// Measure the first protocol's fast-path (`true`) or slow-path (`false`) latency.
        #[arg(long)]
        first_fast: Option<bool>,
        /// Measure the second protocol's fast-path (`true`) or slow-path (`false`) latency.
        #[arg(long)]
        second_fast: Option<bool>,
        /// Require at least one replica in this family.
        #[arg(long, value_enum)]
        family: Option<FamilyArg>,
        /// Candidate regions (comma separated). Defaults to all regions.
        #[arg(long, value_delimiter = ',')]
        pool: Vec<String>,
        /// Print at most this many placements.
        #[arg(long)]
        limit: Option<usize>,
        /// Write all placements to this CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Writes deployment files for one placement.
    Export {
        /// Replica regions (comma separated, full names or identifiers).
        #[arg(long, value_delimiter = ',')]
        replicas: Vec<String>,
        /// Client regions (comma separated, full names or identifiers).
        #[arg(long, value_delimiter = ',')]
        clients: Vec<String>,
        /// Directory to write the files to.
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ObjectiveArg {
    Worst,
    Best,
}

impl From<ObjectiveArg> for Objective {
    fn from(arg: ObjectiveArg) -> Self {
        match arg {
            ObjectiveArg::Worst => Self::MinimizeWorstCase,
            ObjectiveArg::Best => Self::MinimizeBestCase,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProtocolArg {
    SwiftPaxos,
    Paxos,
    N2Paxos,
    Curp,
}

impl From<ProtocolArg> for ProtocolKind {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::SwiftPaxos => Self::SwiftPaxos,
            ProtocolArg::Paxos => Self::Paxos,
            ProtocolArg::N2Paxos => Self::N2Paxos,
            ProtocolArg::Curp => Self::Curp,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FamilyArg {
    Us,
    Europe,
    Asia,
}

impl From<FamilyArg> for RegionFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Us => Self::Us,
            FamilyArg::Europe => Self::Europe,
            FamilyArg::Asia => Self::Asia,
        }
    }
}

/// One line of the CSV output.
#[derive(Serialize)]
struct CsvRow<'a> {
    score: i64,
    replicas: String,
    clients: String,
    first: &'a str,
    second: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    // enable fancy `color_eyre` error messages
    color_eyre::install()?;

    let args = Args::parse();
    if args.verbose {
        logging::enable_logforth_verbose();
    } else {
        logging::enable_logforth();
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).context("Can not load config")?,
        None => Config::default(),
    };
    if let Some(path) = args.latency_file {
        config.latency_file = Some(path);
    }
    if let Some(objective) = args.objective {
        config.objective = objective.into();
    }

    let table = Arc::new(load_table(&config).await?);
    config
        .resolve_regions(&table)
        .context("Config refers to a region missing from the latency table")?;

    match args.command {
        Command::Table => print!("{table}"),
        Command::Show {
            replicas,
            clients,
            protocol,
            json,
        } => {
            let (replicas, clients) = placement(&table, &config, replicas, clients)?;
            let evaluation = Evaluation::new(table, &replicas, &clients, config.objective);
            let report = evaluation.report(protocol.into());
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
        Command::Search {
            replicas,
            clients,
            first,
            second,
            first_fast,
            second_fast,
            family,
            pool,
            limit,
            csv,
            json,
        } => {
            let search = &mut config.search;
            search.replicas = replicas.unwrap_or(search.replicas);
            search.clients = clients.unwrap_or(search.clients);
            search.first = first.map_or(search.first, Into::into);
            search.second = second.map_or(search.second, Into::into);
            search.first_fast = first_fast.unwrap_or(search.first_fast);
            search.second_fast = second_fast.unwrap_or(search.second_fast);
            search.required_family = family.map(Into::into).or(search.required_family);
            if !pool.is_empty() {
                search.pool = pool;
                resolve_all(&table, &mut search.pool)?;
            }

            let configs = run_search(&table, &config);
            if let Some(path) = csv {
                write_csv(&path, &configs, &config)
                    .with_context(|| format!("Can not write {}", path.display()))?;
                info!("wrote {} placements to {}", configs.len(), path.display());
            }
            let shown = &configs[..limit.unwrap_or(configs.len()).min(configs.len())];
            if json {
                println!("{}", serde_json::to_string_pretty(shown)?);
            } else {
                for c in shown {
                    println!(
                        "{:6.2}%  replicas: {}  clients: {}",
                        c.score as f64 / 100.0,
                        c.replicas.join(", "),
                        c.clients.join(", ")
                    );
                }
            }
        }
        Command::Export {
            replicas,
            clients,
            dir,
        } => {
            let (replicas, clients) = placement(&table, &config, replicas, clients)?;
            export::write_all(&dir, table, &replicas, &clients, config.objective)
                .with_context(|| format!("Can not export to {}", dir.display()))?;
        }
    }

    Ok(())
}

async fn load_table(config: &Config) -> Result<DistanceTable> {
    if let Some(path) = &config.latency_file {
        return DistanceTable::from_file(path)
            .with_context(|| format!("Can not load latency table {}", path.display()));
    }
    info!("fetching latency table from {}", cloudping::CLOUDPING_URL);
    match cloudping::fetch(cloudping::CLOUDPING_URL).await {
        Ok(table) => Ok(table),
        Err(err) => {
            warn!("use --latency-file to work offline");
            Err(err).context("Can not fetch latency table")
        }
    }
}

/// Picks replicas and clients from the command line, falling back to the config.
fn placement(
    table: &DistanceTable,
    config: &Config,
    mut replicas: Vec<Region>,
    mut clients: Vec<Region>,
) -> Result<(Vec<Region>, Vec<Region>)> {
    if replicas.is_empty() {
        replicas.clone_from(&config.replicas);
    } else {
        resolve_all(table, &mut replicas)?;
    }
    if clients.is_empty() {
        clients.clone_from(&config.clients);
    } else {
        resolve_all(table, &mut clients)?;
    }
    if replicas.is_empty() || clients.is_empty() {
        bail!("need at least one replica and one client");
    }
    Ok((replicas, clients))
}

fn run_search(table: &Arc<DistanceTable>, config: &Config) -> Vec<Configuration> {
    let search = &config.search;
    let pool = if search.pool.is_empty() {
        table.regions().to_vec()
    } else {
        search.pool.clone()
    };
    let params = SearchParams {
        replicas: search.replicas,
        clients: search.clients,
    };
    info!(
        "searching for {} beating {} by at least 10%",
        search.first, search.second
    );

    let first = Contender::new(
        search.first.instantiate(Vec::new(), table.clone()),
        search.first_fast,
        reoptimize::<AnyProtocol>(config.objective),
    );
    let second = Contender::new(
        search.second.instantiate(Vec::new(), table.clone()),
        search.second_fast,
        reoptimize::<AnyProtocol>(config.objective),
    );
    let family = search.required_family;
    let required = |region: &str| family.is_none_or(|f| table.in_family(region, f));
    search_configurations(&pool, params, &first, &second, required)
}

fn write_csv(path: &Path, configs: &[Configuration], config: &Config) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let first = config.search.first.to_string();
    let second = config.search.second.to_string();
    for c in configs {
        writer.serialize(CsvRow {
            score: c.score,
            replicas: c.replicas.join(";"),
            clients: c.clients.join(";"),
            first: &first,
            second: &second,
        })?;
    }
    writer.flush()?;
    Ok(())
}
