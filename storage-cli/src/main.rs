//! Command-line client for a single storage instance: `open`/`put`/`get`/
//! `del`/`scan`/`status`/`tail` against a file-backed persister rooted at
//! `--data-dir`.

mod store;
mod trace;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use storage::clock::SystemClock;
use storage::persister::file::FilePersister;
use storage::stream::Stream;
use storage::txn::{Outcome, Storage};

use store::{Fields, Mutation, Undo};

#[derive(Parser)]
#[command(name = "storage-cli", about = "Command-line client for the storage engine")]
struct Cli {
    /// Directory holding this instance's log file and logging output.
    #[arg(long, default_value = "./storage-data")]
    data_dir: PathBuf,

    /// Logging level for the file appender.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a key to a JSON value (parsed from the given string).
    Put { key: String, value: String },
    /// Read a key.
    Get { key: String },
    /// Delete a key.
    Del { key: String },
    /// List every key currently stored.
    Scan,
    /// Print persister status (record count, last timestamp, size on disk).
    Status,
    /// Print every persisted record, in order.
    Tail,
}

fn open(data_dir: &PathBuf) -> anyhow::Result<Storage<Fields, Mutation, Undo>> {
    std::fs::create_dir_all(data_dir)?;
    let log_path = data_dir.join("storage.log");
    let persister: FilePersister<Mutation> = FilePersister::open(&log_path, true)?;
    let stream: Stream<Mutation> = Stream::new(Box::new(persister));
    let engine = Storage::open_master(Fields::new(), stream, Box::new(SystemClock))?;
    Ok(engine)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let _guards = trace::init_logging(log_dir.to_string_lossy().as_ref(), &cli.log_level)?;

    let engine = open(&cli.data_dir)?;

    match cli.command {
        Command::Put { key, value } => {
            let value: serde_json::Value = serde_json::from_str(&value)?;
            engine.write(|fields, ctx| {
                fields.put(ctx, key, value);
                Outcome::<(), ()>::Commit(())
            })?;
            println!("{}", "ok".green());
        }
        Command::Get { key } => match engine.read(|fields| fields.store.get(&key).cloned()) {
            Some(entry) => println!("{}", serde_json::to_string_pretty(&entry.value)?),
            None => {
                eprintln!("{}", "not found".red());
                std::process::exit(1);
            }
        },
        Command::Del { key } => {
            let deleted = engine.write(|fields, ctx| Outcome::<bool, ()>::Commit(fields.del(ctx, &key)))?;
            match deleted {
                Outcome::Commit(true) => println!("{}", "deleted".green()),
                Outcome::Commit(false) => println!("{}", "not found".yellow()),
                Outcome::Rollback(_) => unreachable!("del never rolls back"),
                Outcome::Abort(_) => unreachable!("del never aborts"),
            }
        }
        Command::Scan => {
            let keys: Vec<String> = engine.read(|fields| fields.store.iter().map(|e| e.key.clone()).collect());
            for key in keys {
                println!("{key}");
            }
        }
        Command::Status => {
            let status = engine.status();
            println!("records: {}", status.record_count);
            println!("last_us: {}", status.last_us);
            println!("bytes_on_disk: {}", status.bytes_on_disk);
        }
        Command::Tail => {
            for record in engine.replay_log()? {
                println!("{}", storage::persister::encode_line(&record)?);
            }
        }
    }

    Ok(())
}
