use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bidding_agent::{
    agent::{event_channel, Agent, PageEvent},
    config::AppConfig,
    feed::{PageFeed, PageSource},
    observer::PageObserver,
    page::Page,
    proposal::{ActivationOutcome, GeminiClient, InjectorState},
    relay::{self, ChromeTabLauncher, LogOnlyLauncher, TabLauncher, TabOpener},
    store::ConfigStore,
    web::{self, AppState},
};

#[derive(Parser)]
#[command(name = "bidding-agent", version, about = "Marketplace listing watcher and proposal drafter")]
struct Cli {
    /// Also write daily-rotated logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the settings UI
    Serve,
    /// Watch a listings page for new matching projects
    Watch {
        /// HTML file or http(s) URL of the listings page
        #[arg(long)]
        source: String,
        /// URL the page was served from, for resolving relative links
        #[arg(long)]
        page_url: Option<String>,
        /// Log tab-open requests instead of launching Chrome
        #[arg(long)]
        no_browser: bool,
        /// Serve the settings UI alongside; saving reloads the watcher
        #[arg(long)]
        with_ui: bool,
    },
    /// Draft a proposal for a project page and print it
    Propose {
        /// HTML file or http(s) URL of the project page
        #[arg(long)]
        source: String,
        #[arg(long)]
        page_url: Option<String>,
    },
}

fn init_tracing(log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("bidding_agent=debug".parse()?);

    let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "bidding-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_ref())?;

    info!("Starting Bidding Agent...");
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Watch {
            source,
            page_url,
            no_browser,
            with_ui,
        } => watch(config, &source, page_url, no_browser, with_ui).await,
        Command::Propose { source, page_url } => propose(config, &source, page_url).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let store = ConfigStore::connect(&config.database).await?;
    web::serve(AppState {
        store,
        config,
        agent_events: None,
    })
    .await
}

async fn watch(
    config: AppConfig,
    source: &str,
    page_url: Option<String>,
    no_browser: bool,
    with_ui: bool,
) -> Result<()> {
    let store = ConfigStore::connect(&config.database).await?;
    let watch_config = store.load().await?;
    info!(
        min_budget = watch_config.min_budget,
        max_bids = watch_config.max_bids,
        auto_open = watch_config.auto_open_enabled,
        "Agent configuration loaded"
    );

    let launcher: Arc<dyn TabLauncher> = if no_browser {
        Arc::new(LogOnlyLauncher::default())
    } else {
        Arc::new(ChromeTabLauncher::launch(&config.browser)?)
    };
    let (relay_handle, relay_service) = relay::channel();
    tokio::spawn(relay_service.run(launcher));

    let source = PageSource::parse(source);
    let page_url = page_url.or_else(|| source.page_url().map(str::to_string));
    let mut feed = PageFeed::new(source, &config.watcher)?;
    let html = feed
        .source()
        .load(feed.client())
        .await
        .context("Failed to load page source")?;
    feed.seed(&html);

    let mut agent = Agent::new(
        Page::parse(&html, page_url.as_deref()),
        watch_config,
        PageObserver::new(Some(TabOpener::new(relay_handle))),
        Arc::new(GeminiClient::new(&config.proposal)),
        &config.watcher,
        &config.proposal,
    )
    .with_store(store.clone());

    let (events, queue) = event_channel();
    tokio::spawn(feed.run(events.clone()));

    if with_ui {
        let state = AppState {
            store,
            config: config.clone(),
            agent_events: Some(events.clone()),
        };
        tokio::spawn(async move {
            if let Err(e) = web::serve(state).await {
                tracing::error!("Settings UI stopped: {}", e);
            }
        });
    }

    let shutdown = events.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(PageEvent::Shutdown);
        }
    });
    drop(events);

    agent.run(queue).await?;

    let stats = agent.stats();
    info!(
        processed = stats.cards_processed,
        matches = stats.matches.len(),
        opened = stats.open_requests,
        "Shutting down..."
    );
    Ok(())
}

async fn propose(config: AppConfig, source: &str, page_url: Option<String>) -> Result<()> {
    let store = ConfigStore::connect(&config.database).await?;
    let watch_config = store.load().await?;

    let source = PageSource::parse(source);
    let page_url = page_url.or_else(|| source.page_url().map(str::to_string));
    let html = source
        .load(&reqwest::Client::new())
        .await
        .context("Failed to load page source")?;

    let page = Page::parse(&html, page_url.as_deref());
    if !page.is_project_page() {
        warn!("Page URL does not look like a project page; looking for a bid area anyway");
    }

    let mut proposal = config.proposal.clone();
    proposal.search_timeout_secs = 0;
    let mut agent = Agent::new(
        page,
        watch_config,
        PageObserver::new(None),
        Arc::new(GeminiClient::new(&proposal)),
        &config.watcher,
        &proposal,
    )
    .force_injector();
    agent.start(Instant::now())?;

    let Some(InjectorState::Ready { input, .. }) = agent.injector_state() else {
        bail!("No bid description input found on the page");
    };

    agent.handle(PageEvent::ControlActivated).await?;
    match agent.stats().activations.last() {
        Some(ActivationOutcome::Generated) => {
            println!("{}", agent.page().value(input));
            Ok(())
        }
        Some(ActivationOutcome::MissingApiKey) => bail!("No Gemini API key configured; set one with `bidding-agent serve`"),
        Some(ActivationOutcome::Failed(message)) => bail!("Error generating proposal: {}", message),
        _ => bail!("Proposal trigger was not ready"),
    }
}
