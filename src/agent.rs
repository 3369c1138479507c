//! The single-threaded event loop driving one watched page.
//!
//! Everything that happens to the page arrives as a [`PageEvent`] on one
//! queue and is handled to completion in arrival order. After every event
//! the mutation records it produced are drained and given to the observer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ProposalConfig, WatcherConfig};
use crate::models::{ListingCard, WatchConfig};
use crate::observer::{PageObserver, ScanReport};
use crate::page::{ClickEvent, NodeId, Page};
use crate::proposal::{ActivationOutcome, InjectorState, ProposalGenerator, ProposalInjector};
use crate::store::ConfigStore;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    /// New markup appended to the page body.
    Inserted { html: String },
    /// An existing element moved back into the body. Ids of listings the
    /// agent has already retired are not valid here.
    Reinserted { node: NodeId },
    /// Timer tick for the bid-area search.
    Tick,
    /// The user clicked the proposal trigger.
    ControlActivated,
    /// Re-read the watch configuration from the store.
    ReloadConfig,
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<PageEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PageEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Running totals across the page's life.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AgentStats {
    pub cards_processed: usize,
    pub matches: Vec<ListingCard>,
    pub open_requests: usize,
    pub activations: Vec<ActivationOutcome>,
}

impl AgentStats {
    fn absorb(&mut self, report: ScanReport) {
        self.cards_processed += report.processed;
        self.open_requests += report.open_requests;
        self.matches.extend(report.matches);
    }
}

pub struct Agent {
    page: Page,
    config: WatchConfig,
    observer: PageObserver,
    proposal_config: ProposalConfig,
    injector: Option<ProposalInjector>,
    generator: Arc<dyn ProposalGenerator>,
    store: Option<ConfigStore>,
    settle_delay: Duration,
    force_injector: bool,
    started: bool,
    stats: AgentStats,
}

impl Agent {
    pub fn new(
        page: Page,
        config: WatchConfig,
        observer: PageObserver,
        generator: Arc<dyn ProposalGenerator>,
        watcher: &WatcherConfig,
        proposal: &ProposalConfig,
    ) -> Self {
        Self {
            page,
            config,
            observer,
            proposal_config: proposal.clone(),
            injector: None,
            generator,
            store: None,
            settle_delay: Duration::from_millis(watcher.settle_delay_ms),
            force_injector: false,
            started: false,
            stats: AgentStats::default(),
        }
    }

    /// Store consulted on [`PageEvent::ReloadConfig`].
    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Look for the bid area even when the page URL is unknown or not a
    /// project URL.
    pub fn force_injector(mut self) -> Self {
        self.force_injector = true;
        self
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn injector_state(&self) -> Option<InjectorState> {
        self.injector.as_ref().map(|injector| injector.state())
    }

    /// Initial card scan and, on project pages, the first look for the bid area.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let report = self.observer.initial_scan(&mut self.page, &self.config);
        self.stats.absorb(report);

        if self.force_injector || self.page.is_project_page() {
            let mut injector = ProposalInjector::start(&self.proposal_config, now);
            injector.tick(&mut self.page, &self.config, now)?;
            self.injector = Some(injector);
        }

        // Records produced before observation began are not replayed.
        self.page.take_mutations();
        Ok(())
    }

    /// Handles one event. Returns `false` once the loop should stop.
    pub async fn handle(&mut self, event: PageEvent) -> Result<bool> {
        let mut inserted = Vec::new();
        match event {
            PageEvent::Inserted { html } => {
                let body = self.body()?;
                inserted = self.page.append_html(body, &html)?;
            }
            PageEvent::Reinserted { node } => {
                let body = self.body()?;
                self.page.reinsert(node, body)?;
            }
            PageEvent::Tick => {
                if let Some(injector) = self.injector.as_mut() {
                    injector.tick(&mut self.page, &self.config, Instant::now())?;
                }
            }
            PageEvent::ControlActivated => self.activate_control().await?,
            PageEvent::ReloadConfig => self.reload_config().await,
            PageEvent::Shutdown => {
                info!("Agent shutting down");
                return Ok(false);
            }
        }

        let cards = self.flush_mutations();
        self.retire(&inserted, &cards);
        Ok(true)
    }

    /// Waits out the settle delay, starts, then handles events until
    /// `Shutdown` or until every sender is gone.
    pub async fn run(&mut self, mut events: EventReceiver) -> Result<()> {
        debug!("Waiting {:?} for the page to settle", self.settle_delay);
        time::sleep(self.settle_delay).await;
        self.start(Instant::now())?;

        let period = Duration::from_millis(self.proposal_config.search_interval_ms.max(1));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                received = events.recv() => match received {
                    Some(event) => event,
                    None => {
                        debug!("Event queue closed");
                        break;
                    }
                },
                _ = ticker.tick(), if self.searching() => PageEvent::Tick,
            };

            match self.handle(event).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => error!("Failed to handle page event: {}", e),
            }
        }
        Ok(())
    }

    fn searching(&self) -> bool {
        matches!(self.injector_state(), Some(InjectorState::Searching))
    }

    fn body(&self) -> Result<NodeId> {
        self.page.body().ok_or_else(|| AppError::ElementNotFound {
            selector: "body".to_string(),
        })
    }

    /// Hands pending records to the observer and returns the cards it handled.
    fn flush_mutations(&mut self) -> Vec<NodeId> {
        if !self.started {
            return Vec::new();
        }
        let records = self.page.take_mutations();
        if records.is_empty() {
            return Vec::new();
        }
        let mut report = self.observer.handle_mutations(&mut self.page, &records, &self.config);
        let cards = std::mem::take(&mut report.cards);
        self.stats.absorb(report);
        cards
    }

    /// Inserted listings leave the page once their cards have been handled,
    /// as older entries scroll off a live listings page. Content holding the
    /// bid area stays put.
    fn retire(&mut self, inserted: &[NodeId], cards: &[NodeId]) {
        if inserted.is_empty() || cards.is_empty() {
            return;
        }
        let protected = match self.injector_state() {
            Some(InjectorState::Searching) => return,
            Some(InjectorState::Ready { input, control }) => vec![input, control],
            _ => Vec::new(),
        };

        for &node in inserted {
            let holds_card = cards.iter().any(|card| self.page.contains(node, *card));
            let holds_bid_area = protected.iter().any(|id| self.page.contains(node, *id));
            if holds_card && !holds_bid_area {
                if let Err(e) = self.page.remove(node) {
                    warn!("Could not retire inserted listing: {}", e);
                }
            }
        }

        if self.page.needs_compaction() {
            let map = self.page.compact();
            if let Some(injector) = self.injector.as_mut() {
                injector.remap(&map);
            }
        }
    }

    async fn activate_control(&mut self) -> Result<()> {
        let Some(injector) = self.injector.as_ref() else {
            warn!("Proposal trigger activated on a page without one");
            return Ok(());
        };
        if let Some(control) = injector.control() {
            self.page.click(control)?;
        }

        let mut click = ClickEvent::new();
        let outcome = injector
            .activate(&mut self.page, &self.config, self.generator.as_ref(), &mut click)
            .await;
        self.stats.activations.push(outcome);
        Ok(())
    }

    /// Replaces the configuration snapshot with what the store holds now.
    pub async fn reload_config(&mut self) {
        let Some(store) = &self.store else {
            debug!("No settings store attached, keeping current configuration");
            return;
        };
        match store.load().await {
            Ok(config) => {
                info!("Agent configuration reloaded");
                self.config = config;
            }
            Err(e) => error!("Failed to reload configuration: {}", e),
        }
    }
}
