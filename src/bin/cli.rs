//! seencache CLI
//!
//! Operator tool for inspecting and exercising a cache directory.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use seencache::slot::format;
use seencache::wal::{WalReader, WAL_FILENAME};
use seencache::{runtime, Config, GroupOptions, SharedGroup};
use tracing_subscriber::{fmt, EnvFilter};

/// seencache CLI
#[derive(Parser, Debug)]
#[command(name = "seencache-cli")]
#[command(about = "Inspect and exercise a seencache data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./seencache_data")]
    data_dir: PathBuf,

    /// Group name
    #[arg(short, long, default_value = "default")]
    group: String,

    /// Entries per slot before rotation (used when the group is created)
    #[arg(long, default_value = "1024")]
    max_entries: usize,

    /// Number of slots (used when the group is created)
    #[arg(long, default_value = "3")]
    num_slots: usize,

    /// Rotate the active slot once it is this old (seconds)
    #[arg(long)]
    max_age_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record keys as seen now
    Insert {
        /// Keys to insert
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Check whether keys were seen recently
    Lookup {
        /// Keys to look up
        #[arg(required = true)]
        keys: Vec<String>,

        /// Only count sightings within this many seconds (default: ever)
        #[arg(short, long)]
        within_secs: Option<u64>,
    },

    /// Sync the group's slots to disk
    Flush,

    /// Describe the group's slot files and WAL
    Inspect,

    /// Read keys from stdin, print "seen" or "new" for each, then insert it
    Watch {
        /// Window in seconds for "seen"
        #[arg(short, long, default_value = "3600")]
        within_secs: u64,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,seencache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let code = match args.command {
        Commands::Inspect => inspect(&args),
        _ => run_with_group(&args),
    };

    runtime::shutdown();
    code
}

fn run_with_group(args: &Args) -> ExitCode {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .max_entries(args.max_entries)
        .num_slots(args.num_slots)
        .build();

    let registry = match runtime::init(&config) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut options = GroupOptions::new(args.max_entries, args.num_slots);
    if let Some(secs) = args.max_age_secs {
        options = options.with_max_age(Duration::from_secs(secs));
    }

    let group = match registry.get_or_create_with(&args.group, options) {
        Ok(group) => group,
        Err(e) => {
            tracing::error!("Failed to open group {}: {}", args.group, e);
            return ExitCode::FAILURE;
        }
    };

    match &args.command {
        Commands::Insert { keys } => {
            group.insert_many(keys);
            println!("inserted {}", keys.len());
            ExitCode::SUCCESS
        }
        Commands::Lookup { keys, within_secs } => lookup(&group, keys, *within_secs),
        Commands::Flush => {
            let report = group.write_to_disk();
            println!(
                "persisted {} slot(s), {} failed, wal cleared: {}",
                report.slots_persisted, report.slots_failed, report.wal_cleared
            );
            if report.slots_failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Watch { within_secs } => watch(&group, Duration::from_secs(*within_secs)),
        Commands::Inspect => inspect(args),
    }
}

/// Exit status is success if any key was found
fn lookup(group: &SharedGroup, keys: &[String], within_secs: Option<u64>) -> ExitCode {
    let mut any = false;
    for key in keys {
        let found = match within_secs {
            Some(secs) => group.lookup_within(key, Duration::from_secs(secs)),
            None => group.lookup(key, 0),
        };
        any |= found;
        println!("{}\t{}", if found { "seen" } else { "new" }, key);
    }
    if any {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn watch(group: &SharedGroup, window: Duration) -> ExitCode {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let key = match line {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if key.trim().is_empty() {
            continue;
        }

        let seen = group.lookup_within(&key, window);
        group.insert(&key);
        if writeln!(stdout, "{}\t{}", if seen { "seen" } else { "new" }, key).is_err() {
            break;
        }
    }

    ExitCode::SUCCESS
}

/// Reads files directly; does not open (and so does not recover) the group
fn inspect(args: &Args) -> ExitCode {
    let dir = args.data_dir.join(&args.group);
    if !dir.is_dir() {
        eprintln!("no group directory at {}", dir.display());
        return ExitCode::FAILURE;
    }

    for i in 0..args.num_slots {
        let path = dir.join(format!("map_{}.bin", i));
        if !path.exists() {
            println!("{}: absent", path.display());
            continue;
        }
        match format::inspect(&path) {
            Ok(summary) => println!(
                "{}: created={} last_write={} last_sync={} count={} present={}{}",
                path.display(),
                summary.header.created,
                summary.header.last_write,
                summary.header.last_sync,
                summary.header.count,
                summary.records_present,
                if summary.is_truncated() { " (truncated)" } else { "" }
            ),
            Err(e) => println!("{}: unreadable ({})", path.display(), e),
        }
    }

    let wal_path = dir.join(WAL_FILENAME);
    match WalReader::open(&wal_path) {
        Ok(Some(mut reader)) => {
            let mut records = 0u64;
            while let Ok(Some(_)) = reader.next_entry() {
                records += 1;
            }
            println!(
                "{}: {} record(s){}",
                wal_path.display(),
                records,
                if reader.hit_partial_tail() { " + partial tail" } else { "" }
            );
        }
        Ok(None) => println!("{}: absent", wal_path.display()),
        Err(e) => println!("{}: unreadable ({})", wal_path.display(), e),
    }

    ExitCode::SUCCESS
}
