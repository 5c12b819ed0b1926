//! people-daemon: headless people manager for a vault on disk.
//!
//! Runs the same indexer, cache, relationship sync and follow-up scheduler as
//! the editor integration, over the native filesystem.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use people_core::{
    NotificationScheduler, PeopleCache, PeopleIndexer, PeopleService, Person, Settings,
    SettingsStore, TracingNotifier,
};
use people_daemon::config::{default_log_filter, expand_home, settings_path};
use people_daemon::{FileWatcher, NativeStore};

#[derive(Parser, Debug)]
#[command(name = "people-daemon")]
#[command(about = "Personal CRM over a markdown vault")]
struct Args {
    /// Path to the vault directory
    #[arg(short, long, env = "PEOPLE_VAULT_PATH")]
    vault: String,

    /// Settings file (defaults to .people-manager.json in the vault)
    #[arg(short, long)]
    settings: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Watch the vault and keep relationships in sync (default)
    Run,
    /// Print how many people are indexed, upcoming and overdue
    Stats,
    /// List people with a follow-up in the next hours
    Upcoming {
        /// Window in hours (defaults to the notification lead time)
        #[arg(long)]
        hours: Option<u32>,
    },
    /// List people whose follow-up date has passed
    Overdue,
    /// Run one notification check
    Check,
    /// Write the effective settings to the settings file
    Init,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Install logging: `RUST_LOG` wins, otherwise info (debug with --verbose).
fn init_logging(verbose: bool) -> FilterHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    handle
}

/// Follow `debugMode` unless `RUST_LOG` pins the filter.
fn apply_debug_mode(handle: &FilterHandle, verbose: bool, settings: &Settings) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let directive = default_log_filter(verbose || settings.debug_mode);
    if let Err(e) = handle.reload(EnvFilter::new(directive)) {
        warn!("Failed to update log filter: {}", e);
    }
}

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

struct Daemon {
    store: Arc<NativeStore>,
    settings: SettingsStore,
    settings_path: PathBuf,
    filter: FilterHandle,
    verbose: bool,
}

impl Daemon {
    async fn run(&self) -> Result<()> {
        let mut watcher = FileWatcher::new(self.store.base_path().to_path_buf())?;
        info!("Watching {:?}", watcher.vault_path());

        let service = PeopleService::start(
            self.store.clone(),
            self.settings.clone(),
            Arc::new(TracingNotifier),
        )
        .await?;
        let mut hangup = Hangup::new()?;

        info!("Daemon running. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                Some(changes) = watcher.recv() => {
                    self.store.apply_external_batch(changes).await;
                }

                _ = hangup.recv() => {
                    self.reload_settings(&service).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        service.stop().await;
        info!("Shutting down");
        Ok(())
    }

    async fn reload_settings(&self, service: &PeopleService) {
        let settings = match self.settings.reload(&self.settings_path).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Keeping current settings: {}", e);
                return;
            }
        };
        info!("Reloaded settings from {}", self.settings_path.display());
        apply_debug_mode(&self.filter, self.verbose, &settings);

        if settings.enabled && !service.is_enabled().await {
            if let Err(e) = service.enable().await {
                warn!("Failed to enable people manager: {}", e);
            }
        } else if !settings.enabled {
            service.disable().await;
        }
    }

    /// Index the vault once for a query command.
    async fn index(&self) -> Result<(PeopleIndexer, Arc<PeopleCache>)> {
        let indexer = PeopleIndexer::new(self.store.clone(), self.settings.clone());
        let cache = Arc::new(PeopleCache::new(self.settings.clone()));
        cache.attach(indexer.events());
        indexer.start().await?;
        Ok((indexer, cache))
    }

    async fn query(&self, command: &Command) -> Result<()> {
        let (indexer, cache) = self.index().await?;
        let now = Utc::now();
        let settings = self.settings.current();

        match command {
            Command::Stats => {
                let stats = cache.stats(now);
                println!("People:   {}", stats.total);
                println!("Upcoming: {}", stats.upcoming);
                println!("Overdue:  {}", stats.overdue);
            }
            Command::Upcoming { hours } => {
                let hours = hours.unwrap_or(settings.notification_lead_time_hours);
                print_people(&cache.upcoming(hours, now), &settings);
            }
            Command::Overdue => print_people(&cache.overdue(now), &settings),
            Command::Check => {
                let scheduler = NotificationScheduler::new(
                    cache.clone(),
                    self.settings.clone(),
                    Arc::new(TracingNotifier),
                    indexer.indexing_complete(),
                );
                if !settings.enable_notifications {
                    println!("Notifications are disabled");
                } else {
                    let summary = scheduler.check_now();
                    println!("{} upcoming, {} overdue", summary.upcoming, summary.overdue);
                }
            }
            Command::Run | Command::Init => {}
        }

        indexer.stop().await;
        Ok(())
    }
}

fn print_people(people: &[Person], settings: &Settings) {
    if people.is_empty() {
        println!("Nobody");
        return;
    }
    let date_prop = &settings.props.follow_up_date_prop;
    for person in people {
        let date = person.frontmatter.get_str(date_prop).unwrap_or_default();
        println!("{:<24} {:<26} {}", person.name, date, person.path);
    }
}

fn vault_dir(raw: &str) -> Result<PathBuf> {
    let vault = expand_home(raw);
    if !Path::new(&vault).is_dir() {
        bail!("Vault directory {} does not exist", vault.display());
    }
    Ok(vault)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = init_logging(args.verbose);

    let vault = vault_dir(&args.vault)?;
    let settings_path = settings_path(&vault, args.settings.as_deref());
    let settings = SettingsStore::new(
        SettingsStore::load(&settings_path)
            .await
            .with_context(|| format!("loading {}", settings_path.display()))?,
    );
    apply_debug_mode(&filter, args.verbose, &settings.current());

    let command = args.command.unwrap_or(Command::Run);
    if command == Command::Init {
        settings.save(&settings_path).await?;
        println!("Wrote {}", settings_path.display());
        return Ok(());
    }

    info!("Vault path: {:?}", vault);
    let store = Arc::new(NativeStore::open(&vault).await?);

    let daemon = Daemon {
        store,
        settings,
        settings_path,
        filter,
        verbose: args.verbose,
    };

    match command {
        Command::Run => daemon.run().await,
        other => daemon.query(&other).await,
    }
}
