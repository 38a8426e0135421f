//! sstable-scan: print the rows of a table.
//!
//! ```text
//! $ sstable-scan --file table.sst --order_by value --order_fn NUMDSC --limit 10
//! key;value
//! b;22
//! a;1
//! ```
//!
//! The first line holds the column names, every following line one row, all
//! fields joined by `;`. Unfinished tables are scanned up to the end of the
//! file after a warning.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use log::LevelFilter;
use sstfile::scan::{Column, OrderFn, Scan};
use sstfile::{ReaderOptions, SSTableReader};

fn build_cli() -> Command {
    Command::new("sstable-scan")
        .about("Print the rows of a table")
        .arg(
            Arg::new("file")
                .long("file")
                .short('f')
                .value_name("file")
                .required(true)
                .help("input table file"),
        )
        .arg(Arg::new("limit").long("limit").value_name("num").value_parser(clap::value_parser!(usize)).help("limit"))
        .arg(Arg::new("offset").long("offset").value_name("num").value_parser(clap::value_parser!(usize)).help("offset"))
        .arg(Arg::new("order_by").long("order_by").value_name("column").help("order by (key or value)"))
        .arg(
            Arg::new("order_fn")
                .long("order_fn")
                .value_name("fn")
                .default_value("STRASC")
                .help("one of: STRASC, STRDSC, NUMASC, NUMDSC"),
        )
        .arg(
            Arg::new("loglevel")
                .long("loglevel")
                .value_name("level")
                .default_value("INFO")
                .help("one of: EMERGENCY, ALERT, CRITICAL, ERROR, WARNING, NOTICE, INFO, DEBUG, TRACE"),
        )
}

/// Map a syslog-style level name onto a log filter.
fn parse_level(name: &str) -> Result<LevelFilter> {
    let level = match name.to_ascii_uppercase().as_str() {
        "EMERGENCY" | "ALERT" | "CRITICAL" | "ERROR" => LevelFilter::Error,
        "WARNING" | "WARN" => LevelFilter::Warn,
        "NOTICE" | "INFO" => LevelFilter::Info,
        "DEBUG" => LevelFilter::Debug,
        "TRACE" => LevelFilter::Trace,
        "OFF" => LevelFilter::Off,
        _ => anyhow::bail!("invalid loglevel: {}", name),
    };
    Ok(level)
}

fn init_logging(matches: &ArgMatches) -> Result<()> {
    let level = matches.get_one::<String>("loglevel").map(String::as_str).unwrap_or("INFO");
    let level = parse_level(level)?;

    env_logger::Builder::new().filter_level(level).target(env_logger::Target::Stderr).init();
    Ok(())
}

fn build_scan(matches: &ArgMatches) -> Result<Scan> {
    let mut scan = Scan::new();

    if let Some(limit) = matches.get_one::<usize>("limit") {
        scan.set_limit(*limit);
    }

    if let Some(offset) = matches.get_one::<usize>("offset") {
        scan.set_offset(*offset);
    }

    if let Some(column) = matches.get_one::<String>("order_by") {
        let order_fn = matches.get_one::<String>("order_fn").map(String::as_str).unwrap_or("STRASC");
        scan.set_order_by(column.parse::<Column>()?, order_fn.parse::<OrderFn>()?);
    }

    Ok(scan)
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(&matches)?;

    let path = matches.get_one::<String>("file").context("--file is required")?;
    let scan = build_scan(&matches)?;

    let options = ReaderOptions { scan_unfinished: true, ..Default::default() };
    let mut reader = SSTableReader::open_with_options(path, options)
        .with_context(|| format!("failed to open table {}", path))?;

    println!("{}", scan.column_names().join(";"));

    let mut cursor = reader.get_cursor()?;
    let rows = scan
        .execute(&mut cursor, |row| println!("{}", row.join(";")))
        .with_context(|| format!("failed to scan table {}", path))?;

    log::debug!("Printed {} rows", rows);
    Ok(())
}
