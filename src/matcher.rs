use tracing::{debug, info};

use crate::models::{ListingCard, WatchConfig, UNKNOWN_TITLE};
use crate::page::{NodeId, Page, SelectorChain};
use crate::utils::error::Result;

const TITLE_SELECTORS: &[&str] = &[
    "h3, .project-title, .JobSearchCard-primary-title-link, .Card-title, .JobSearchCard-primary-heading a",
];
const BUDGET_SELECTORS: &[&str] = &[".project-budget, .JobSearchCard-primary-price, .Card-price"];
const BID_COUNT_SELECTORS: &[&str] = &[".bid-count, .JobSearchCard-secondary-entry, .Card-bids"];
const LINK_SELECTORS: &[&str] = &[
    "a[href*=\"/projects/\"], a[href*=\"/jobs/\"], .JobSearchCard-primary-title-link, .JobSearchCard-primary-heading a",
];

const HIGHLIGHT: &[(&str, &str)] = &[
    ("border", "3px solid #0d6efd"),
    ("background-color", "#fafcff"),
    ("transition", "all 0.5s ease"),
];

/// True when the listing's budget reaches the minimum and its bid count
/// does not exceed the maximum. Both bounds are inclusive.
pub fn evaluate(listing: &ListingCard, config: &WatchConfig) -> bool {
    listing.budget() >= config.min_budget && listing.bid_count() <= config.max_bids
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOutcome {
    pub listing: ListingCard,
    pub matched: bool,
}

pub struct CardMatcher {
    title: SelectorChain,
    budget: SelectorChain,
    bid_count: SelectorChain,
    link: SelectorChain,
}

impl Default for CardMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CardMatcher {
    pub fn new() -> Self {
        Self {
            title: SelectorChain::new(TITLE_SELECTORS),
            budget: SelectorChain::new(BUDGET_SELECTORS),
            bid_count: SelectorChain::new(BID_COUNT_SELECTORS),
            link: SelectorChain::new(LINK_SELECTORS),
        }
    }

    /// Reads the listing fields off a card. Missing pieces fall back to
    /// placeholder text rather than failing.
    pub fn extract(&self, page: &Page, card: NodeId) -> ListingCard {
        let title = page
            .query_in(card, &self.title)
            .map(|el| page.text(el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let budget_text = page
            .query_in(card, &self.budget)
            .map(|el| page.text(el))
            .unwrap_or_default();
        let bid_count_text = page
            .query_in(card, &self.bid_count)
            .map(|el| page.text(el))
            .unwrap_or_default();
        let link_url = page.query_in(card, &self.link).and_then(|el| page.href(el));

        ListingCard {
            title,
            budget_text,
            bid_count_text,
            link_url,
        }
    }

    /// Extracts, evaluates and, on a match, highlights one card.
    pub fn process(&self, page: &mut Page, card: NodeId, config: &WatchConfig) -> Result<CardOutcome> {
        let listing = self.extract(page, card);
        debug!("Analyzing -> {} | {}", listing.title, listing.budget_text);

        let matched = evaluate(&listing, config);
        if matched {
            info!(
                budget = listing.budget(),
                bids = listing.bid_count(),
                "[MATCH] {}",
                listing.title
            );
            highlight(page, card)?;
        } else {
            debug!("No match for {} (budget/bid constraints)", listing.title);
        }

        Ok(CardOutcome { listing, matched })
    }
}

/// Applies the match highlight. Safe to call repeatedly.
pub fn highlight(page: &mut Page, card: NodeId) -> Result<()> {
    for (property, value) in HIGHLIGHT {
        page.set_style(card, property, value)?;
    }
    Ok(())
}
