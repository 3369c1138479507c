use scraper::Selector;

/// Ordered list of CSS selectors tried one after another.
///
/// Listing markup changes without notice, so every lookup is a fallback chain
/// where earlier entries take priority. An entry may itself be a comma-separated
/// group, in which case its matches come back in document order.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    entries: Vec<(String, Selector)>,
}

impl SelectorChain {
    /// Compiles the given selectors, dropping (and logging) any that fail to parse.
    pub fn new(selectors: &[&str]) -> Self {
        let entries = selectors
            .iter()
            .filter_map(|raw| match Selector::parse(raw) {
                Ok(selector) => Some((raw.to_string(), selector)),
                Err(e) => {
                    tracing::warn!("Skipping invalid selector '{}': {:?}", raw, e);
                    None
                }
            })
            .collect();

        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.entries.iter().map(|(_, selector)| selector)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(raw, _)| raw.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
