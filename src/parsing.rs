//! Budget and bid-count extraction from listing label text.
//!
//! Both parsers are fail-open: text they cannot make sense of counts as zero,
//! so a malformed label under-reports rather than stopping the watcher.

use regex::Regex;
use std::sync::LazyLock;

// Integer runs with optional thousands separators. A decimal point splits a
// figure in two, so "$12.50" offers 12 and 50.
static AMOUNT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:,\d+)*").expect("amount regex is valid"));

/// Largest amount mentioned in `text`; ranges such as "$100 - $250" yield the
/// upper bound. Returns 0 when no amount is present.
pub fn parse_budget(text: &str) -> u64 {
    AMOUNT_REGEX
        .find_iter(text)
        .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// Every digit in `text` read as one number, so "12 bids" is 12.
/// Empty or overflowing input yields 0.
pub fn parse_bid_count(text: &str) -> u64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}
