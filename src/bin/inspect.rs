//! bowdb Inspector
//!
//! Read-only command-line view of a bowdb database.

use std::process::ExitCode;

use bowdb::{Config, Db, Format};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// bowdb Inspector
#[derive(Parser, Debug)]
#[command(name = "bowdb-inspect")]
#[command(about = "Inspect a bowdb database without modifying it")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./bowdb_data")]
    data_dir: String,

    /// Value format the database was written with
    #[arg(short, long, value_enum, default_value_t = FormatArg::Json)]
    format: FormatArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Json,
    Binary,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Format::Json,
            FormatArg::Binary => Format::Binary,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List bucket names
    Buckets,

    /// Count the records of a bucket
    Count {
        /// Bucket name
        bucket: String,
    },

    /// Print the keys of a bucket in order
    Keys {
        /// Bucket name
        bucket: String,

        /// Stop after this many keys
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Print the raw value stored under a text key
    Get {
        /// Bucket name
        bucket: String,

        /// Record key
        key: String,
    },

    /// Engine statistics
    Stats,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> bowdb::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .read_only(true)
        .format(args.format.into())
        .build();
    let db = Db::open(config)?;
    tracing::debug!("Inspecting {} (bowdb v{})", args.data_dir, bowdb::VERSION);

    match args.command {
        Commands::Buckets => {
            let mut names = db.buckets();
            names.sort();
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Count { bucket } => {
            let mut count = 0usize;
            scan(&db, &bucket, |_| {
                count += 1;
                true
            })?;
            println!("{}", count);
        }
        Commands::Keys { bucket, limit } => {
            let mut printed = 0;
            scan(&db, &bucket, |key| {
                if printed >= limit {
                    return false;
                }
                println!("{}", display_key(key));
                printed += 1;
                true
            })?;
        }
        Commands::Get { bucket, key } => {
            let value = db.bucket(&bucket).get_bytes(key.as_str(), Vec::new())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Stats => {
            let engine = db.engine();
            println!("buckets:          {}", db.buckets().len());
            println!("sstables:         {}", engine.sstable_count());
            println!("memtable entries: {}", engine.memtable_entry_count());
            println!("memtable bytes:   {}", engine.memtable_size());
        }
    }
    db.close()
}

/// Call `visit` with each record key of `bucket` until it returns false
fn scan(db: &Db, bucket: &str, mut visit: impl FnMut(&[u8]) -> bool) -> bowdb::Result<()> {
    let id = db.bucket(bucket).id()?;
    let prefix = id.as_bytes();

    let mut cursor = db.engine().snapshot().iter();
    cursor.seek(prefix)?;
    while let Some(key) = cursor.key().filter(|k| k.starts_with(prefix)) {
        if !visit(&key[prefix.len()..]) {
            break;
        }
        cursor.next()?;
    }
    Ok(())
}

/// Text keys verbatim, generated ids in their text form, anything else as hex
fn display_key(key: &[u8]) -> String {
    if key.len() == bowdb::id::ID_SIZE && std::str::from_utf8(key).is_err() {
        let mut raw = [0u8; bowdb::id::ID_SIZE];
        raw.copy_from_slice(key);
        return bowdb::Id::from_bytes(raw).to_string();
    }
    match std::str::from_utf8(key) {
        Ok(text) => text.to_string(),
        Err(_) => key.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}
