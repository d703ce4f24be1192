mod api;
mod assets;
mod cache;
mod config;
mod error;
mod model;
mod service;
mod status;
mod store;
mod sync;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use api::ApiClient;
use cache::{CacheLayer, HttpRequest, ReqwestTransport};
use model::ReceiptField;
use service::Service;
use status::StatusReporter;
use store::Store;

#[derive(Parser, Debug)]
#[command(name = "seedledger")]
#[command(about = "Offline-first payment tracking for seed organizers")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/seedledger/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Skip the startup connectivity probe and work from local data only
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Record a payment (queued locally when the API is unreachable)
  AddPayment {
    #[arg(long)]
    suborganizer: String,
    /// ISO date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    amount: f64,
    #[arg(long)]
    purpose: String,
    #[arg(long)]
    mode: String,
    #[arg(long)]
    notes: Option<String>,
  },
  /// Register a suborganizer
  AddSuborganizer {
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    village: String,
    #[arg(long)]
    crop: String,
  },
  /// List payments, unsynced local records first
  Payments,
  /// List suborganizers
  Suborganizers,
  /// Payment totals over the merged local and remote view
  Stats,
  /// Drain the sync queue once
  Sync {
    /// Only drain one tagged queue: payment-sync or suborganizer-sync
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show connectivity and queue status
  Status,
  /// Attach a receipt image to a payment
  AttachReceipt {
    #[arg(long)]
    payment: String,
    /// Which field the image belongs to: bill or screenshot
    #[arg(long)]
    field: String,
    /// Path to the image file
    path: PathBuf,
  },
  /// Fetch an image through the offline cache, saving it locally
  FetchReceipt {
    url: String,
    #[arg(long)]
    out: Option<PathBuf>,
  },
  /// List and drop terminally failed sync items
  AckFailures,
  /// Delete all local data, including unsynced records
  Reset {
    /// Confirm; without it nothing is deleted
    #[arg(long)]
    yes: bool,
  },
  /// Keep running: probe connectivity and drain the queue when back online
  Watch {
    /// Probe interval in seconds
    #[arg(long, default_value_t = 30)]
    interval: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = init_tracing()?;

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let store = Arc::new(Store::open_default()?);
  store.initialize_schema()?;
  let status = StatusReporter::new(false);
  status.set_initialized();

  let base = Url::parse(&config.api.url)
    .map_err(|e| eyre!("invalid api url '{}': {}", config.api.url, e))?;
  let transport = Arc::new(ReqwestTransport::new()?);
  let cache = CacheLayer::new(
    Arc::clone(&store),
    transport,
    base.clone(),
    config.offline.cache_retention_days,
  );
  let client = ApiClient::new(cache.clone(), base, config::Config::get_api_token());
  let service = Service::new(store, Arc::new(client), status, config.offline.clone());

  if !args.offline {
    service.probe().await;
  }

  run(args.command, &service, &cache).await
}

async fn run(
  command: Command,
  service: &Service<ApiClient<ReqwestTransport>>,
  cache: &CacheLayer<ReqwestTransport>,
) -> Result<()> {
  match command {
    Command::AddPayment {
      suborganizer,
      date,
      amount,
      purpose,
      mode,
      notes,
    } => {
      let record = model::NewPayment {
        suborganizer_id: suborganizer,
        date: date.unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string()),
        amount,
        purpose,
        payment_mode: mode,
        bill_receipt_url: None,
        payment_screenshot_url: None,
        notes,
      };
      match service.create_payment(record).await? {
        service::Saved::Synced(p) => println!("payment {} synced", p.id),
        service::Saved::Queued(p) => println!("payment {} queued for sync", p.id),
      }
    }

    Command::AddSuborganizer {
      name,
      phone,
      village,
      crop,
    } => {
      let record = model::NewSuborganizer {
        name,
        phone,
        village,
        crop_type: crop,
      };
      match service.create_suborganizer(record).await? {
        service::Saved::Synced(s) => println!("suborganizer {} synced", s.id),
        service::Saved::Queued(s) => println!("suborganizer {} queued for sync", s.id),
      }
    }

    Command::Payments => {
      for p in service.list_payments().await? {
        println!(
          "{}  {}  {:>10.2}  {}  {}",
          p.id, p.date, p.amount, p.purpose, p.payment_mode
        );
      }
    }

    Command::Suborganizers => {
      for s in service.list_suborganizers().await? {
        println!("{}  {}  {}  {}", s.id, s.name, s.village, s.crop_type);
      }
    }

    Command::Stats => {
      let stats = service.payment_stats().await?;
      println!("payments:       {}", stats.count);
      println!("total amount:   {:.2}", stats.total_amount);
      println!("suborganizers:  {}", stats.suborganizers);
      if let Some(date) = &stats.latest_date {
        println!("latest payment: {}", date);
      }
      for (purpose, amount) in &stats.by_purpose {
        println!("  {:<16} {:.2}", purpose, amount);
      }
      for (mode, amount) in &stats.by_mode {
        println!("  {:<16} {:.2}", mode, amount);
      }
    }

    Command::Sync { tag } => {
      let report = match tag {
        Some(tag) => service.sync_tag(&tag).await?,
        None => service.sync().await?,
      };
      match report {
        Some(r) => println!(
          "replayed {}, requeued {}, failed {}",
          r.replayed, r.requeued, r.failed
        ),
        None => println!("a sync is already in progress"),
      }
    }

    Command::Status => {
      let s = service.status().current();
      let info = service.storage_info()?;
      println!("online:       {}", s.is_online);
      println!("initialized:  {}", s.is_initialized);
      println!("syncing:      {}", s.sync_in_progress);
      println!("pending:      {}", s.pending_count);
      println!("failed:       {}", s.failed_count);
      println!(
        "stored:       {} payments, {} suborganizers, {} queued, {} images",
        info.payments, info.suborganizers, info.sync_queue, info.images
      );
    }

    Command::AttachReceipt {
      payment,
      field,
      path,
    } => {
      let field = match field.as_str() {
        "bill" => ReceiptField::BillReceipt,
        "screenshot" => ReceiptField::PaymentScreenshot,
        other => return Err(eyre!("unknown receipt field '{}'", other)),
      };
      let bytes = std::fs::read(&path)?;
      match service.attach_receipt(&payment, field, &bytes).await? {
        service::Saved::Synced(url) => println!("receipt uploaded: {}", url),
        service::Saved::Queued(key) => println!("receipt {} queued for upload", key),
      }
    }

    Command::FetchReceipt { url, out } => {
      let resp = cache.fetch(HttpRequest::get(&url)).await?;
      if !resp.is_success() {
        return Err(eyre!("fetch failed with status {}", resp.status));
      }
      match out {
        Some(path) => {
          std::fs::write(&path, &resp.body)?;
          println!("saved {} bytes to {} ({:?})", resp.body.len(), path.display(), resp.source);
        }
        None => println!("{} bytes available ({:?})", resp.body.len(), resp.source),
      }
    }

    Command::AckFailures => {
      for (id, retries) in service.failed_items()? {
        println!("{}  ({} attempts)", id, retries);
      }
      let n = service.acknowledge_failures()?;
      println!("acknowledged {} failed item(s)", n);
    }

    Command::Reset { yes } => {
      if !yes {
        return Err(eyre!(
          "reset deletes all local data including unsynced records; pass --yes to confirm"
        ));
      }
      service.reset()?;
      println!("local store reset");
    }

    Command::Watch { interval } => {
      watch(service, cache, interval).await?;
    }
  }
  Ok(())
}

/// Long-running mode: pre-populate the static cache, then probe on an
/// interval and drain the queue on every offline-to-online transition.
async fn watch(
  service: &Service<ApiClient<ReqwestTransport>>,
  cache: &CacheLayer<ReqwestTransport>,
  interval: u64,
) -> Result<()> {
  cache.install().await?;
  cache.activate()?;

  let mut rx = service.status().subscribe();
  let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
  let mut was_online = service.probe().await;
  if was_online {
    service.sync().await?;
  }

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let online = service.probe().await;
        if online && !was_online {
          info!("back online, draining sync queue");
          service.sync().await?;
        }
        was_online = online;
      }
      changed = rx.changed() => {
        if changed.is_err() {
          break;
        }
        let s = rx.borrow_and_update().clone();
        println!(
          "status: online={} syncing={} pending={} failed={}",
          s.is_online, s.sync_in_progress, s.pending_count, s.failed_count
        );
      }
    }
  }
  Ok(())
}

/// File-based logging so terminal output stays clean for command results.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("could not determine data directory"))?
    .join("seedledger")
    .join("logs");
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::daily(log_dir, "seedledger.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seedledger=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(guard)
}
