//! Administration tool for a minisql data directory
//!
//! ```bash
//! minisql --data-dir ./db tables
//! minisql --data-dir ./db describe student
//! minisql --data-dir ./db dump student --columns id,name --csv
//! minisql --data-dir ./db import student students.csv --delimiter '|'
//! ```

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use tracing_subscriber::EnvFilter;

use minisql::{Database, EngineConfig, Record};

#[derive(Parser, Debug)]
#[command(name = "minisql", version, about = "Inspect and load a minisql data directory")]
struct Args {
    /// Directory holding the catalog, table and index files
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Blocks kept in the cache
    #[arg(long, value_name = "BLOCKS")]
    cache_capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tables
    Tables,

    /// List indexes
    Indexes,

    /// Show the attributes and indexes of a table
    Describe { table: String },

    /// Print the records of a table
    Dump {
        table: String,

        /// Attributes to print, in order
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Write CSV instead of a table
        #[arg(long)]
        csv: bool,
    },

    /// Insert the rows of a delimited file into a table
    Import {
        table: String,
        file: PathBuf,

        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(capacity) = args.cache_capacity {
        config.cache_capacity = capacity;
    }

    let mut db = Database::open(config)?;

    match args.command {
        Command::Tables => {
            for name in db.table_names() {
                println!("{name}");
            }
        }
        Command::Indexes => {
            let mut table = Table::new();
            table.set_titles(Row::new(vec![
                Cell::new("index"),
                Cell::new("table"),
                Cell::new("attribute"),
            ]));
            for def in db.index_defs() {
                table.add_row(Row::new(vec![
                    Cell::new(&def.index_name),
                    Cell::new(&def.table_name),
                    Cell::new(&def.attr_name),
                ]));
            }
            table.printstd();
        }
        Command::Describe { table: name } => describe(&db, &name)?,
        Command::Dump {
            table,
            columns,
            csv,
        } => {
            let records = db.select(&columns, &table, &[])?;
            let titles = if columns.is_empty() {
                db.schema(&table)?
                    .attributes()
                    .iter()
                    .map(|attr| attr.name.clone())
                    .collect()
            } else {
                columns
            };

            if csv {
                write_csv(&titles, &records)?;
            } else {
                print_table(&titles, &records);
            }
        }
        Command::Import {
            table,
            file,
            delimiter,
        } => {
            if !delimiter.is_ascii() {
                return Err(format!("delimiter must be an ASCII character, got '{delimiter}'").into());
            }
            let rows = db.load_csv(&table, &file, delimiter as u8)?;
            println!("Inserted {rows} rows into {table}");
        }
    }

    db.close()?;
    Ok(())
}

fn describe(db: &Database, name: &str) -> Result<(), Box<dyn Error>> {
    let schema = db.schema(name)?;

    let mut table = Table::new();
    table.set_titles(Row::new(vec![
        Cell::new("attribute"),
        Cell::new("type"),
        Cell::new("key"),
    ]));
    for attr in schema.attributes() {
        let key = if attr.name == schema.primary_key() {
            "PRIMARY"
        } else if attr.unique {
            "UNIQUE"
        } else {
            ""
        };
        table.add_row(Row::new(vec![
            Cell::new(&attr.name),
            Cell::new(&attr.data_type.to_string()),
            Cell::new(key),
        ]));
    }
    table.printstd();

    for def in db.index_defs() {
        if def.table_name == name {
            println!("index {} on {}", def.index_name, def.attr_name);
        }
    }
    Ok(())
}

fn print_table(titles: &[String], records: &[Record]) {
    let mut table = Table::new();
    table.set_titles(Row::new(titles.iter().map(|t| Cell::new(t)).collect()));
    for record in records {
        table.add_row(Row::new(
            record
                .values()
                .iter()
                .map(|value| Cell::new(&value.to_string()))
                .collect(),
        ));
    }
    table.printstd();
    println!("{} rows", records.len());
}

fn write_csv(titles: &[String], records: &[Record]) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(titles)?;
    for record in records {
        writer.write_record(record.values().iter().map(|value| value.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
