use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use velorent::application::{EngineConfig, FormSessions, Services};
use velorent::domain::ports::Stores;
use velorent::domain::user::UserId;
use velorent::infrastructure::in_memory::{InMemorySessionStore, InMemoryStore};
use velorent::infrastructure::notifier::LogNotifier;
use velorent::interfaces::console::{Command, Console, Reply, ScriptReader, SignupForm};
use velorent::interfaces::csv::rental_writer::RentalWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command script, one `<sender-id> <message>` per line. Reads stdin if omitted.
    input: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Operator ids allowed to run admin commands.
    #[arg(long, env = "ADMIN_IDS", value_delimiter = ',')]
    admin_ids: Vec<UserId>,

    /// Make a bike available again when its rental closes.
    #[arg(long)]
    release_on_close: bool,

    /// Lifetime of an unfinished sign-up form.
    #[arg(long, default_value_t = 900)]
    session_ttl_secs: u64,
}

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use velorent::infrastructure::rocksdb::RocksDbStore;

    match db_path {
        Some(path) => {
            info!(path = %path.display(), "Opening RocksDB storage");
            Ok(Stores::shared(RocksDbStore::open(path).into_diagnostic()?))
        }
        None => Ok(Stores::shared(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Stores::shared(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing();

    let config = EngineConfig {
        release_on_close: cli.release_on_close,
    };
    let services = Services::new(open_stores(cli.db_path)?, config);
    info!(
        admins = cli.admin_ids.len(),
        release_on_close = config.release_on_close,
        "Console ready"
    );
    let ttl = Duration::from_secs(cli.session_ttl_secs);
    let forms = FormSessions::new(Arc::new(InMemorySessionStore::<SignupForm>::new()), ttl);
    let console = Console::new(
        services,
        Arc::new(LogNotifier),
        cli.admin_ids.into_iter().collect(),
        forms.clone(),
    );

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(ttl.max(Duration::from_secs(1)));
        loop {
            tick.tick().await;
            if let Err(e) = forms.purge_expired().await {
                warn!(error = %e, "Form session purge failed");
            }
        }
    });

    let source: Box<dyn BufRead> = match cli.input {
        Some(path) => Box::new(BufReader::new(File::open(path).into_diagnostic()?)),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in ScriptReader::new(source).lines() {
        let reply = match line {
            Ok(line) => match line.text.parse::<Command>() {
                Ok(command) => console.handle(line.sender, command).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        match reply {
            Ok(Some(Reply::Text(text))) => writeln!(out, "{text}").into_diagnostic()?,
            Ok(Some(Reply::Rentals(rentals))) => {
                RentalWriter::new(&mut out)
                    .write_rentals(&rentals)
                    .into_diagnostic()?;
            }
            Ok(None) => {}
            Err(e) => writeln!(out, "error: {e}").into_diagnostic()?,
        }
    }
    out.flush().into_diagnostic()?;

    Ok(())
}
