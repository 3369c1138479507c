//! Page sources and the polling feed that turns fresh snapshots into
//! insertion events.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, error, info, warn};

use crate::agent::{EventSender, PageEvent};
use crate::config::WatcherConfig;
use crate::observer::INITIAL_CARD_SELECTORS;
use crate::page::{Page, SelectorChain};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    File(PathBuf),
    Url(String),
}

impl PageSource {
    /// `http(s)://` locations are fetched, anything else is read from disk.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::File(PathBuf::from(raw))
        }
    }

    /// URL that relative links on the page resolve against.
    pub fn page_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::File(_) => None,
        }
    }

    pub async fn load(&self, client: &Client) -> Result<String> {
        match self {
            Self::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            Self::Url(url) => {
                let response = client.get(url).send().await?.error_for_status()?;
                Ok(response.text().await?)
            }
        }
    }
}

/// Re-reads a page source and reports listing cards not seen before.
pub struct PageFeed {
    source: PageSource,
    client: Client,
    interval: Duration,
    cards: SelectorChain,
    links: SelectorChain,
    seen: HashSet<String>,
}

impl PageFeed {
    pub fn new(source: PageSource, config: &WatcherConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(AppError::Http)?;

        Ok(Self {
            source,
            client,
            interval: Duration::from_secs(config.poll_interval_secs),
            cards: SelectorChain::new(INITIAL_CARD_SELECTORS),
            links: SelectorChain::new(&["a[href]"]),
            seen: HashSet::new(),
        })
    }

    pub fn source(&self) -> &PageSource {
        &self.source
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Records every card in `html` as already delivered.
    pub fn seed(&mut self, html: &str) {
        let fresh = self.unseen_cards(html);
        debug!("Feed seeded with {} card(s)", fresh.len());
    }

    /// Outer HTML of cards in `html` that the previous snapshot did not
    /// contain. Only the latest snapshot's fingerprints are remembered.
    pub fn unseen_cards(&mut self, html: &str) -> Vec<String> {
        let page = Page::parse(html, self.source.page_url());
        let mut current = HashSet::new();
        let mut fresh = Vec::new();

        for card in page.select_all(&self.cards) {
            let Some(markup) = page.outer_html(card) else {
                continue;
            };
            let fingerprint = page
                .query_in(card, &self.links)
                .and_then(|link| page.href(link))
                .unwrap_or_else(|| markup.clone());

            let unseen = !self.seen.contains(&fingerprint);
            if current.insert(fingerprint) && unseen {
                fresh.push(markup);
            }
        }
        self.seen = current;
        fresh
    }

    /// Polls until the agent's queue is closed.
    pub async fn run(mut self, events: EventSender) {
        info!("Polling {:?} every {:?}", self.source, self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; the snapshot it would read was
        // already seeded.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let html = match self.source.load(&self.client).await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to load page source: {}", e);
                    continue;
                }
            };

            let fresh = self.unseen_cards(&html);
            if !fresh.is_empty() {
                info!("{} new listing(s) found", fresh.len());
            }
            for html in fresh {
                if events.send(PageEvent::Inserted { html }).is_err() {
                    warn!("Agent queue closed, stopping feed");
                    return;
                }
            }
            if events.send(PageEvent::Tick).is_err() {
                return;
            }
        }
    }
}
