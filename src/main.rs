use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use journal_cache::cache::{CacheSource, SqliteStorage};
use journal_cache::net::{Fetcher, HttpFetcher, Request, Response};
use journal_cache::worker::{offline, PendingQueue, Registration};
use journal_cache::{logging, Config, EventOutcome, Worker, WorkerEvent};

type AppWorker = Worker<SqliteStorage, HttpFetcher>;

#[derive(Parser, Debug)]
#[command(name = "jcache")]
#[command(about = "Offline caching layer for the learning journal")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./jcache.yaml or $XDG_CONFIG_HOME/jcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the manifest for the configured version, then activate it
  Install,
  /// Activate the installed version and purge caches of other versions
  Activate,
  /// Request a path through the active worker
  Fetch {
    /// Path relative to the origin, e.g. /journal
    path: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Accept header; use text/html for a navigation request
    #[arg(long)]
    accept: Option<String>,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
    /// Print status and headers before the body
    #[arg(short, long)]
    include: bool,
  },
  /// Deliver queued reflections to the API
  Sync {
    #[arg(long)]
    tag: Option<String>,
  },
  /// Re-fetch the configured pages into the static cache
  Refresh {
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show a notification from a push payload
  Push {
    /// JSON payload: {"title": ..., "body": ..., "url": ...}
    payload: Option<String>,
  },
  /// Resolve where a notification click leads
  Click {
    /// open-journal, open-about, or none for the notification body
    #[arg(long)]
    action: Option<String>,
    #[arg(long)]
    url: Option<String>,
  },
  /// Manage the pending-reflection queue
  #[command(subcommand)]
  Queue(QueueCommand),
  /// List caches, or the URLs stored in one cache
  Caches { name: Option<String> },
  /// Show installed versions and queue length
  Status,
  /// Print the offline fallback page
  OfflinePage,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  /// Queue a reflection (JSON document)
  Add { json: String },
  List,
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log, args.verbose)?;

  let storage = Arc::new(SqliteStorage::open(&config.database_path()?)?);
  let fetcher = Arc::new(HttpFetcher::new(&config)?);
  let app = App {
    storage,
    fetcher,
    config: Arc::new(config),
  };

  app.run(args.command).await
}

struct App {
  storage: Arc<SqliteStorage>,
  fetcher: Arc<HttpFetcher>,
  config: Arc<Config>,
}

impl App {
  async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => self.install().await,
      Command::Activate => {
        let worker = self.current_worker();
        let outcome = worker.handle(WorkerEvent::Activate).await?;
        print_outcome(&outcome)
      }
      Command::Fetch {
        path,
        method,
        accept,
        data,
        include,
      } => self.fetch(&path, &method, accept, data, include).await,
      Command::Sync { tag } => {
        let tag = tag.unwrap_or_else(|| self.config.sync_tag.clone());
        self.dispatch(WorkerEvent::Sync { tag }).await
      }
      Command::Refresh { tag } => {
        let tag = tag.unwrap_or_else(|| self.config.periodic_tag.clone());
        self.dispatch(WorkerEvent::PeriodicSync { tag }).await
      }
      Command::Push { payload } => self.dispatch(WorkerEvent::Push { payload }).await,
      Command::Click { action, url } => {
        self
          .dispatch(WorkerEvent::NotificationClick { action, url })
          .await
      }
      Command::Queue(command) => self.queue(command),
      Command::Caches { name } => self.caches(name.as_deref()),
      Command::Status => self.status(),
      Command::OfflinePage => {
        print!("{}", offline::offline_document());
        Ok(())
      }
    }
  }

  fn current_worker(&self) -> AppWorker {
    Worker::current(
      Arc::clone(&self.storage),
      Arc::clone(&self.fetcher),
      Arc::clone(&self.config),
    )
  }

  /// Worker of the active version, if any version has been activated.
  fn active_worker(&self) -> Result<Option<AppWorker>> {
    let registration = Registration::load(&*self.storage)?;
    Ok(registration.active.map(|version| {
      Worker::new(
        Arc::clone(&self.storage),
        Arc::clone(&self.fetcher),
        Arc::clone(&self.config),
        &version,
      )
    }))
  }

  async fn install(&self) -> Result<()> {
    let worker = self.current_worker();
    let outcome = worker.handle(WorkerEvent::Install).await?;
    print_outcome(&outcome)?;

    if let EventOutcome::Installed(report) = &outcome {
      if report.skip_waiting {
        let activated = worker.handle(WorkerEvent::Activate).await?;
        print_outcome(&activated)?;
      }
    }

    worker.settle().await;
    Ok(())
  }

  async fn dispatch(&self, event: WorkerEvent) -> Result<()> {
    let worker = self
      .active_worker()?
      .ok_or_else(|| eyre!("No active worker. Run `jcache install` first."))?;

    let outcome = worker.handle(event).await?;
    worker.settle().await;
    print_outcome(&outcome)
  }

  async fn fetch(
    &self,
    path: &str,
    method: &str,
    accept: Option<String>,
    data: Option<String>,
    include: bool,
  ) -> Result<()> {
    let method: reqwest::Method = method
      .to_ascii_uppercase()
      .parse()
      .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
    let url = self.config.resolve(path)?;

    let mut request = match data {
      Some(body) => {
        let mut request = Request::post_json(url, body);
        request.method = method;
        request
      }
      None => Request::new(method, url),
    };
    if let Some(accept) = accept {
      request = request.with_header("accept", &accept);
    }

    let (response, source) = match self.active_worker()? {
      Some(worker) => {
        let outcome = worker.handle(WorkerEvent::Fetch(request)).await?;
        let result = match outcome {
          EventOutcome::Responded(served) => (served.response, Some(served.source)),
          EventOutcome::Passthrough(request) => (self.fetcher.fetch(&request).await?, None),
          other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
        };
        worker.settle().await;
        result
      }
      None => (self.fetcher.fetch(&request).await?, None),
    };

    print_response(&response, source, include)
  }

  fn queue(&self, command: QueueCommand) -> Result<()> {
    let queue = PendingQueue::new(&*self.storage);
    match command {
      QueueCommand::Add { json } => {
        let item: serde_json::Value =
          serde_json::from_str(&json).map_err(|e| eyre!("Invalid JSON: {}", e))?;
        let len = queue.enqueue(item)?;
        println!("queued ({} pending)", len);
      }
      QueueCommand::List => {
        for (index, item) in queue.list()?.iter().enumerate() {
          println!("{:>3}  {}", index, item);
        }
      }
      QueueCommand::Clear => {
        queue.clear()?;
        println!("queue cleared");
      }
    }
    Ok(())
  }

  fn caches(&self, name: Option<&str>) -> Result<()> {
    use journal_cache::cache::CacheStorage;

    match name {
      Some(name) => {
        for url in self.storage.keys(name)? {
          println!("{}", url);
        }
      }
      None => {
        for (name, count) in self.storage.entry_counts()? {
          println!("{:<40} {:>5} entries", name, count);
        }
      }
    }
    Ok(())
  }

  fn status(&self) -> Result<()> {
    let registration = Registration::load(&*self.storage)?;
    let pending = PendingQueue::new(&*self.storage).list()?.len();

    println!("origin:      {}", self.config.origin);
    println!("configured:  {}", self.config.version);
    println!(
      "active:      {}",
      registration.active.as_deref().unwrap_or("-")
    );
    println!(
      "waiting:     {}",
      registration.waiting.as_deref().unwrap_or("-")
    );
    if let Some(at) = registration.activated_at {
      println!("activated:   {}", at.to_rfc3339());
    }
    if let Some(worker) = self.active_worker()? {
      println!("caches:      {}", worker.names().allow_list().join(", "));
    }
    println!("pending:     {} reflection(s)", pending);
    Ok(())
  }
}

fn print_outcome(outcome: &EventOutcome) -> Result<()> {
  match outcome {
    EventOutcome::Installed(report) => println!(
      "installed {}: {} entries in {}",
      report.version, report.cached, report.cache
    ),
    EventOutcome::Activated(report) => {
      println!("activated {}", report.version);
      for name in &report.deleted {
        println!("  deleted {}", name);
      }
    }
    EventOutcome::Synced(report) => println!(
      "sync: {} attempted, {} delivered, {} retained, {} dropped",
      report.attempted, report.delivered, report.retained, report.dropped
    ),
    EventOutcome::Refreshed(report) => {
      for path in &report.refreshed {
        println!("refreshed {}", path);
      }
      for (path, reason) in &report.failed {
        println!("failed    {} ({})", path, reason);
      }
    }
    EventOutcome::Notified(notification) => {
      let json = serde_json::to_string_pretty(notification)
        .map_err(|e| eyre!("Failed to render notification: {}", e))?;
      println!("{}", json);
    }
    EventOutcome::OpenWindow { url, .. } => println!("open {}", url),
    EventOutcome::Ignored { reason } => println!("ignored: {}", reason),
    EventOutcome::Responded(served) => print_response(&served.response, Some(served.source), true)?,
    EventOutcome::Passthrough(request) => println!("passthrough {} {}", request.method, request.url),
  }
  Ok(())
}

fn print_response(response: &Response, source: Option<CacheSource>, include: bool) -> Result<()> {
  let mut stdout = std::io::stdout().lock();
  if include {
    let source = source
      .map(|s| format!("{:?}", s).to_lowercase())
      .unwrap_or_else(|| "passthrough".to_string());
    writeln!(stdout, "HTTP {} ({})", response.status, source)?;
    for (name, value) in &response.headers {
      writeln!(stdout, "{}: {}", name, value)?;
    }
    writeln!(stdout)?;
  }
  stdout.write_all(&response.body)?;
  stdout.flush()?;
  Ok(())
}
