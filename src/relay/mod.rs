//! Tab-open relay.
//!
//! Page-side code cannot open browser tabs itself. It sends an
//! `openProject` request to the relay service, which owns a [`TabLauncher`]
//! and answers with `{success, tabId}`. Requests and replies travel over a
//! tokio mpsc channel with a oneshot per request.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod launcher;

pub use launcher::{ChromeTabLauncher, LogOnlyLauncher, TabLauncher};

const RELAY_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayMessage {
    OpenProject { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    pub tab_id: Option<u64>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The request never reached the relay or its reply was lost.
    #[error("Relay delivery failed: {0}")]
    Delivery(String),
}

struct RelayEnvelope {
    message: RelayMessage,
    respond_to: oneshot::Sender<RelayResponse>,
}

/// Sending side of the relay, cheap to clone.
#[derive(Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<RelayEnvelope>,
}

impl RelayHandle {
    pub async fn request(&self, message: RelayMessage) -> Result<RelayResponse, RelayError> {
        let (respond_to, reply) = oneshot::channel();
        self.sender
            .send(RelayEnvelope { message, respond_to })
            .await
            .map_err(|_| RelayError::Delivery("relay is not running".to_string()))?;

        reply
            .await
            .map_err(|_| RelayError::Delivery("relay dropped the request".to_string()))
    }
}

/// Privileged side of the relay.
pub struct RelayService {
    receiver: mpsc::Receiver<RelayEnvelope>,
}

/// Creates a connected handle/service pair.
pub fn channel() -> (RelayHandle, RelayService) {
    let (sender, receiver) = mpsc::channel(RELAY_QUEUE_CAPACITY);
    (RelayHandle { sender }, RelayService { receiver })
}

impl RelayService {
    /// Serves requests until every handle is dropped.
    pub async fn run(mut self, launcher: Arc<dyn TabLauncher>) {
        info!("Relay active");
        while let Some(envelope) = self.receiver.recv().await {
            let response = Self::handle(launcher.as_ref(), envelope.message).await;
            if envelope.respond_to.send(response).is_err() {
                debug!("Relay requester went away before the reply");
            }
        }
        info!("Relay stopped");
    }

    async fn handle(launcher: &dyn TabLauncher, message: RelayMessage) -> RelayResponse {
        match message {
            RelayMessage::OpenProject { url } => {
                info!("Relay: request to open project -> {}", url);
                match launcher.open_background(&url).await {
                    Ok(tab_id) => {
                        info!("Relay: tab created -> {}", tab_id);
                        RelayResponse {
                            success: true,
                            tab_id: Some(tab_id),
                        }
                    }
                    Err(e) => {
                        error!("Relay: failed to open {}: {}", url, e);
                        RelayResponse {
                            success: false,
                            tab_id: None,
                        }
                    }
                }
            }
        }
    }
}

/// Asks the relay to open matched listings. Each request is fire-and-forget:
/// the outcome is logged and never retried.
#[derive(Clone)]
pub struct TabOpener {
    relay: RelayHandle,
}

impl TabOpener {
    pub fn new(relay: RelayHandle) -> Self {
        Self { relay }
    }

    /// Returns `None` without contacting the relay when the link is missing,
    /// is a `javascript:` placeholder, or no tokio runtime is running.
    pub fn open_listing(&self, title: &str, link: Option<&str>) -> Option<JoinHandle<()>> {
        let url = match link {
            Some(url) if is_navigable(url) => url.to_string(),
            _ => {
                warn!("Match found but no link detected for {}", title);
                return None;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime to reach the relay, not opening {}", url);
            return None;
        };

        info!("Requesting relay to open -> {}", url);
        let relay = self.relay.clone();
        Some(runtime.spawn(async move {
            match relay.request(RelayMessage::OpenProject { url }).await {
                Ok(response) if response.success => {
                    info!(tab_id = ?response.tab_id, "Relay confirmed tab creation");
                }
                Ok(_) => warn!("Relay could not open the tab"),
                Err(e) => error!("Relay message failed: {}", e),
            }
        }))
    }
}

fn is_navigable(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && !url.to_ascii_lowercase().starts_with("javascript:")
}
