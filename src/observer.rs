//! Listing-card discovery.
//!
//! The observer sees batches of inserted nodes, finds the listing card in
//! each, and hands every card to the [`CardMatcher`] at most once. The
//! processed marker is written before the card is evaluated, so a card that
//! fails half way is not retried either.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::matcher::{CardMatcher, CardOutcome};
use crate::models::{ListingCard, WatchConfig};
use crate::page::{MutationRecord, NodeId, Page, SelectorChain};
use crate::relay::TabOpener;
use crate::utils::error::Result;

pub const PROCESSED_ATTR: &str = "data-agent-processed";

const CARD_SELECTORS: &[&str] = &[
    "[data-testid=\"project-card\"]",
    ".JobSearchCard-primary",
    ".project-details",
    "fl-project-card",
    ".ProjectCard",
    ".Card-primary",
    ".JobSearchCard",
];

pub const INITIAL_CARD_SELECTORS: &[&str] = &[
    "[data-testid=\"project-card\"]",
    ".JobSearchCard-primary",
    ".project-details",
    "fl-project-card",
    ".ProjectCard",
    ".Card-primary",
];

const NEW_PROJECTS_NOTICE: &[&str] = &["button[primary], .view-new-projects-btn, .ViewNewProjectsBtn"];

static NEW_PROJECTS_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)VIEW NEW PROJECTS").expect("valid notice regex"));

/// What one batch or scan did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Cards handed to the matcher, including ones whose processing failed.
    pub cards: Vec<NodeId>,
    pub processed: usize,
    pub matches: Vec<ListingCard>,
    pub open_requests: usize,
    pub notice_clicked: bool,
}

impl ScanReport {
    fn record(&mut self, outcome: CardOutcome, opened: bool) {
        self.processed += 1;
        if opened {
            self.open_requests += 1;
        }
        if outcome.matched {
            self.matches.push(outcome.listing);
        }
    }
}

pub struct PageObserver {
    cards: SelectorChain,
    initial_cards: SelectorChain,
    notice: SelectorChain,
    matcher: CardMatcher,
    opener: Option<TabOpener>,
}

impl PageObserver {
    pub fn new(opener: Option<TabOpener>) -> Self {
        Self {
            cards: SelectorChain::new(CARD_SELECTORS),
            initial_cards: SelectorChain::new(INITIAL_CARD_SELECTORS),
            notice: SelectorChain::new(NEW_PROJECTS_NOTICE),
            matcher: CardMatcher::new(),
            opener,
        }
    }

    /// Processes every card already on the page.
    pub fn initial_scan(&self, page: &mut Page, config: &WatchConfig) -> ScanReport {
        let mut report = ScanReport::default();
        if !config.watching_enabled {
            debug!("Watching disabled, skipping initial scan");
            return report;
        }

        info!("Checking existing projects on page...");
        for card in page.select_all(&self.initial_cards) {
            self.process_card(page, card, config, &mut report);
        }
        report
    }

    /// Handles one batch of mutation records. The whole batch is dropped
    /// when watching is disabled.
    pub fn handle_mutations(
        &self,
        page: &mut Page,
        records: &[MutationRecord],
        config: &WatchConfig,
    ) -> ScanReport {
        let mut report = ScanReport::default();
        if !config.watching_enabled {
            debug!("Watching disabled, ignoring {} mutation record(s)", records.len());
            return report;
        }

        for node in records.iter().flat_map(|record| record.added_nodes.iter().copied()) {
            if !page.is_element(node) {
                continue;
            }

            if !report.notice_clicked {
                report.notice_clicked = self.click_new_projects_notice(page);
            }

            if let Some(card) = page.find_within(node, &self.cards) {
                self.process_card(page, card, config, &mut report);
            }
        }
        report
    }

    fn click_new_projects_notice(&self, page: &mut Page) -> bool {
        let Some(button) = page.select_first(&self.notice) else {
            return false;
        };
        if !NEW_PROJECTS_TEXT.is_match(&page.text(button)) {
            return false;
        }

        info!("New projects alert detected. Clicking...");
        match page.click(button) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not click new projects notice: {}", e);
                false
            }
        }
    }

    fn process_card(&self, page: &mut Page, card: NodeId, config: &WatchConfig, report: &mut ScanReport) {
        if page.has_attr(card, PROCESSED_ATTR) {
            return;
        }
        report.cards.push(card);

        match self.evaluate_card(page, card, config) {
            Ok((outcome, opened)) => report.record(outcome, opened),
            Err(e) => error!("Error processing project card: {}", e),
        }
    }

    fn evaluate_card(&self, page: &mut Page, card: NodeId, config: &WatchConfig) -> Result<(CardOutcome, bool)> {
        page.set_attr(card, PROCESSED_ATTR, "true")?;
        let outcome = self.matcher.process(page, card, config)?;

        let mut opened = false;
        if outcome.matched {
            if config.auto_open_enabled {
                opened = self.request_open(&outcome.listing);
            } else {
                debug!("Auto-open is disabled. Highlighting only.");
            }
        }
        Ok((outcome, opened))
    }

    fn request_open(&self, listing: &ListingCard) -> bool {
        match &self.opener {
            Some(opener) => opener
                .open_listing(&listing.title, listing.link_url.as_deref())
                .is_some(),
            None => {
                warn!("Auto-open requested but no relay is connected");
                false
            }
        }
    }
}
