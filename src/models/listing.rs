use serde::{Deserialize, Serialize};

use crate::parsing::{parse_bid_count, parse_budget};

pub const UNKNOWN_TITLE: &str = "Unknown Project";

/// Fields read off one listing card for a single matching pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCard {
    pub title: String,
    pub budget_text: String,
    pub bid_count_text: String,
    pub link_url: Option<String>,
}

impl ListingCard {
    pub fn budget(&self) -> u64 {
        parse_budget(&self.budget_text)
    }

    pub fn bid_count(&self) -> u64 {
        parse_bid_count(&self.bid_count_text)
    }
}
