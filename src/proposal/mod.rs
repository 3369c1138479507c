//! Proposal drafting on project-detail pages.
//!
//! [`ProposalInjector`] looks for the bid-description input, adds a trigger
//! button next to it, and when the button is clicked replaces the input's
//! content with text from a [`ProposalGenerator`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ProposalConfig;
use crate::models::WatchConfig;
use crate::page::{ClickEvent, NodeId, Page, SelectorChain};
use crate::utils::error::{AppError, Result};

pub mod gemini;
pub mod watch;

pub use gemini::{GeminiClient, ProposalGenerator};
pub use watch::{ElementWatch, WatchPoll};

pub const CONTROL_ID: &str = "gemini-generate-btn";
pub const PLACEHOLDER_TEXT: &str = "Analyzing project and crafting proposal...";
pub const MISSING_KEY_ALERT: &str = "Please set your Gemini API Key in the settings.";

const BID_INPUT_SELECTORS: &[&str] = &[
    "textarea[name=\"description\"]",
    "#description",
    ".BidFormat-description textarea",
    "[data-testid=\"bid-description-input\"]",
    ".fl-textarea textarea",
    "textarea.FormControl",
    "textarea.fl-textarea",
];
const CONTAINER_SELECTORS: &[&str] = &[".fl-textarea, .BidFormat-description, .form-group"];
const PAGE_TITLE_SELECTORS: &[&str] = &["h1, .PageProjectDetails-title"];
const PAGE_DESCRIPTION_SELECTORS: &[&str] = &[
    ".project-description, .PageProjectDetails-description, [data-testid=\"project-description\"]",
];

const CONTROL_HTML: &str = concat!(
    r#"<button id="gemini-generate-btn" type="button" "#,
    r#"style="margin-bottom: 12px; padding: 12px 24px; background: #000; color: #FFD700; "#,
    r#"border: 2px solid #FFD700; border-radius: 8px; cursor: pointer; font-weight: 800; "#,
    r#"display: block; width: fit-content;">"#,
    "✨ Generate AI Proposal</button>"
);

#[derive(Error, Debug)]
pub enum ProposalError {
    #[error("Gemini API key is not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid API response structure: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorState {
    /// Polling for the bid-description input.
    Searching,
    /// Trigger button injected; lasts for the rest of the page's life.
    Ready { input: NodeId, control: NodeId },
    /// Search stopped because watching was switched off or it timed out.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    Generated,
    MissingApiKey,
    Failed(String),
    NotReady,
}

pub struct ProposalInjector {
    state: InjectorState,
    watch: ElementWatch,
    control: SelectorChain,
    container: SelectorChain,
    page_title: SelectorChain,
    page_description: SelectorChain,
}

impl ProposalInjector {
    pub fn start(config: &ProposalConfig, now: Instant) -> Self {
        let timeout = match config.search_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        info!("Attempting to find bid area...");

        Self {
            state: InjectorState::Searching,
            watch: ElementWatch::start(SelectorChain::new(BID_INPUT_SELECTORS), timeout, now),
            control: SelectorChain::new(&["#gemini-generate-btn"]),
            container: SelectorChain::new(CONTAINER_SELECTORS),
            page_title: SelectorChain::new(PAGE_TITLE_SELECTORS),
            page_description: SelectorChain::new(PAGE_DESCRIPTION_SELECTORS),
        }
    }

    pub fn state(&self) -> InjectorState {
        self.state
    }

    pub fn control(&self) -> Option<NodeId> {
        match self.state {
            InjectorState::Ready { control, .. } => Some(control),
            _ => None,
        }
    }

    /// Follows the bid area and trigger to their ids in a compacted page.
    pub fn remap(&mut self, map: &HashMap<NodeId, NodeId>) {
        if let InjectorState::Ready { input, control } = self.state {
            self.state = match (map.get(&input), map.get(&control)) {
                (Some(&input), Some(&control)) => InjectorState::Ready { input, control },
                _ => InjectorState::Abandoned,
            };
        }
    }

    /// One polling step while searching; a no-op in any other state.
    pub fn tick(&mut self, page: &mut Page, config: &WatchConfig, now: Instant) -> Result<InjectorState> {
        if self.state != InjectorState::Searching {
            return Ok(self.state);
        }

        if !config.watching_enabled {
            debug!("Watching disabled, abandoning bid area search");
            self.watch.cancel();
            self.state = InjectorState::Abandoned;
            return Ok(self.state);
        }

        let control = &self.control;
        match self
            .watch
            .poll_where(page, now, |page, _| page.select_first(control).is_none())
        {
            WatchPoll::Found(input) => {
                info!("Bid area found. Injecting button...");
                let control = self.inject(page, input)?;
                self.state = InjectorState::Ready { input, control };
            }
            WatchPoll::TimedOut => {
                warn!("No bid area appeared before the search timeout");
                self.state = InjectorState::Abandoned;
            }
            WatchPoll::Cancelled => self.state = InjectorState::Abandoned,
            WatchPoll::Pending => {}
        }

        Ok(self.state)
    }

    fn inject(&self, page: &mut Page, input: NodeId) -> Result<NodeId> {
        let container = page
            .closest(input, &self.container)
            .or_else(|| page.parent(input))
            .ok_or_else(|| AppError::ElementNotFound {
                selector: CONTAINER_SELECTORS.join(", "),
            })?;

        page.prepend_html(container, CONTROL_HTML)?
            .into_iter()
            .find(|id| page.is_element(*id))
            .ok_or_else(|| AppError::Internal("trigger button did not parse".to_string()))
    }

    /// Handles a click on the trigger button.
    ///
    /// On failure the input gets its previous text back and an alert is raised.
    pub async fn activate(
        &self,
        page: &mut Page,
        config: &WatchConfig,
        generator: &dyn ProposalGenerator,
        event: &mut ClickEvent,
    ) -> ActivationOutcome {
        let InjectorState::Ready { input, .. } = self.state else {
            debug!("Trigger activated before the bid area was ready");
            return ActivationOutcome::NotReady;
        };

        event.prevent_default();

        if !config.has_api_key() {
            page.alert(MISSING_KEY_ALERT);
            return ActivationOutcome::MissingApiKey;
        }

        let original_value = page.value(input);
        if let Err(e) = page.set_value(input, PLACEHOLDER_TEXT) {
            error!("Could not show placeholder: {}", e);
        }

        let prompt = build_prompt(
            &config.profile_text,
            &self.project_title(page),
            &self.project_description(page),
        );

        let result = generator.generate(&config.api_key, &prompt).await;
        match result.and_then(|text| apply_generated(page, input, &text)) {
            Ok(()) => {
                info!("Proposal generated");
                ActivationOutcome::Generated
            }
            Err(e) => {
                error!("Gemini API Error: {}", e);
                if let Err(restore) = page.set_value(input, &original_value) {
                    error!("Could not restore bid text: {}", restore);
                }
                let message = e.to_string();
                page.alert(format!("Error generating proposal: {}", message));
                ActivationOutcome::Failed(message)
            }
        }
    }

    fn project_title(&self, page: &Page) -> String {
        page.select_first(&self.page_title)
            .map(|el| page.text(el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "this project".to_string())
    }

    fn project_description(&self, page: &Page) -> String {
        page.select_first(&self.page_description)
            .map(|el| page.text(el))
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "the project details given".to_string())
    }
}

fn apply_generated(page: &mut Page, input: NodeId, text: &str) -> std::result::Result<(), ProposalError> {
    page.set_value(input, text)
        .and_then(|_| page.dispatch_input(input))
        .map_err(|e| ProposalError::MalformedResponse(e.to_string()))
}

pub fn build_prompt(profile: &str, title: &str, description: &str) -> String {
    format!(
        "You are a professional freelancer with the following profile:\n\
         {profile}\n\
         \n\
         Write a concise, winning, and tailored project proposal for the following project:\n\
         Title: {title}\n\
         Description: {description}\n\
         \n\
         Requirements:\n\
         1. Keep it professional, friendly, and HUMAN-like (avoid overly formal AI corporate speak).\n\
         2. Focus on exactly how your experience solves their specific problem.\n\
         3. Do not use placeholders like [Your Name].\n\
         4. Be direct and persuasive. Start with a strong hook about their problem.\n"
    )
}
