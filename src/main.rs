use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use hadith_cache::api::RecordQuery;
use hadith_cache::cache::Store;
use hadith_cache::config::{BackendKind, Config};
use hadith_cache::notify::{ChannelNotifier, Notification};
use hadith_cache::{logging, ResilientClient};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "hadith-cache")]
#[command(about = "Read hadith content with an offline cache and fallbacks")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hadith-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Content service base URL, overrides the config file
  #[arg(long)]
  url: Option<String>,

  /// Non-interactive run: in-memory cache, no background probe
  #[arg(long)]
  headless: bool,

  /// Cache backend to use
  #[arg(long, value_enum)]
  backend: Option<BackendArg>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  /// Log filter, e.g. `debug` or `hadith_cache=trace` (RUST_LOG wins)
  #[arg(long, default_value = logging::DEFAULT_FILTER)]
  log_level: String,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
  Auto,
  Sqlite,
  File,
  Memory,
}

impl From<BackendArg> for BackendKind {
  fn from(arg: BackendArg) -> Self {
    match arg {
      BackendArg::Auto => BackendKind::Auto,
      BackendArg::Sqlite => BackendKind::Sqlite,
      BackendArg::File => BackendKind::File,
      BackendArg::Memory => BackendKind::Memory,
    }
  }
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch collections and all book lists into the cache
  Warm,
  /// List collections
  Collections,
  /// List the books of a collection
  Books { collection: String },
  /// Show one page of hadiths
  Records {
    collection: String,
    #[arg(long)]
    book: Option<u32>,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = RecordQuery::DEFAULT_PER_PAGE)]
    per_page: u32,
  },
  /// Show the hadith of the day
  Daily,
  /// Free-text search (never cached)
  Search { query: Vec<String> },
  /// Probe the service now and print the health state
  Health,
  /// Run the periodic health probe until Ctrl-C
  Watch,
  /// Remove cached entries, optionally for one store
  ClearCache { store: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = load_config(&args)?;

  let log_dir = config.cache.data_dir().map(|d| d.join("logs"));
  let _guard = logging::init(log_dir.as_deref(), args.verbose, &args.log_level)?;

  let (notifier, mut notifications) = ChannelNotifier::new();
  let client = ResilientClient::from_config(&config, Arc::new(notifier))?;

  run(&client, args.command, &mut notifications).await?;
  print_notifications(&mut notifications);

  Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
  let mut config = match (&args.config, &args.url) {
    (Some(path), _) => Config::load(Some(path.as_path()))?,
    (None, Some(url)) if Config::find_config_file().is_none() => Config::with_url(url.clone()),
    (None, _) => Config::load(None)?,
  };

  // Override from the command line
  if let Some(url) = &args.url {
    config.api.url = url.clone();
  }
  if args.headless {
    config.interactive = false;
  }
  if let Some(backend) = args.backend {
    config.cache.backend = backend.into();
  }

  Ok(config)
}

async fn run(
  client: &ResilientClient,
  command: Command,
  notifications: &mut mpsc::UnboundedReceiver<Notification>,
) -> Result<()> {
  match command {
    Command::Warm => print_json(&client.warm().await),
    Command::Collections => print_json(&client.get_collections().await),
    Command::Books { collection } => print_json(&client.get_books(&collection).await),
    Command::Records {
      collection,
      book,
      page,
      per_page,
    } => {
      let query = RecordQuery::new(collection, book, page, per_page);
      print_json(&client.get_records(&query).await)
    }
    Command::Daily => print_json(&client.get_daily_record().await),
    Command::Search { query } => print_json(&client.search(&query.join(" ")).await),
    Command::Health => print_json(&client.force_health_check().await),
    Command::Watch => watch(client, notifications).await,
    Command::ClearCache { store } => {
      let store = store
        .map(|s| s.parse::<Store>().map_err(|e| eyre!(e)))
        .transpose()?;
      client.cache().clear(store);
      eprintln!(
        "Cleared {} from the {} cache",
        store.map(|s| s.to_string()).unwrap_or_else(|| "all stores".to_string()),
        client.cache().backend_name()
      );
      Ok(())
    }
  }
}

/// Print the health state after every probe until interrupted.
async fn watch(
  client: &ResilientClient,
  notifications: &mut mpsc::UnboundedReceiver<Notification>,
) -> Result<()> {
  let mut probe = client.health_probe();
  probe.start();
  if !probe.is_running() {
    return Err(eyre!("Health probing is disabled in headless mode"));
  }

  print_json(&client.health_state())?;
  let mut last = client.health_state();
  let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      Some(notification) = notifications.recv() => {
        eprintln!("[{}] {}", notification.severity, notification.message);
      }
      _ = ticker.tick() => {
        let state = client.health_state();
        if state != last {
          print_json(&state)?;
          last = state;
        }
      }
    }
  }

  probe.stop();
  Ok(())
}

fn print_notifications(notifications: &mut mpsc::UnboundedReceiver<Notification>) {
  while let Ok(notification) = notifications.try_recv() {
    eprintln!("[{}] {}", notification.severity, notification.message);
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  let out = serde_json::to_string_pretty(value)
    .map_err(|e| eyre!("Failed to serialize output: {}", e))?;
  println!("{}", out);
  Ok(())
}
