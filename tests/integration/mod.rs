// Integration tests for Bidding Agent
// These tests verify that all components work together correctly

pub mod api_tests;
pub mod proposal_tests;
pub mod watch_flow_tests;
pub mod web_interface_tests;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
};
use bidding_agent::{
    config::{AppConfig, BrowserConfig, DatabaseConfig, ProposalConfig, ServerConfig, WatcherConfig},
    relay::TabLauncher,
    store::ConfigStore,
    web::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

pub const SEARCH_URL: &str = "https://www.freelancer.com/search/projects";
pub const PROJECT_URL: &str = "https://www.freelancer.com/projects/rust/websocket-gateway";

pub const SEARCH_PAGE: &str = r#"<html><body>
    <div id="project-list">
        <div class="JobSearchCard-primary">
            <div class="JobSearchCard-primary-heading">
                <a class="JobSearchCard-primary-title-link" href="/projects/rust/websocket-gateway">WebSocket gateway in Rust</a>
            </div>
            <div class="JobSearchCard-primary-price">$750 - $1,500 USD</div>
            <div class="JobSearchCard-secondary-entry">11 bids</div>
        </div>
        <div class="JobSearchCard-primary">
            <div class="JobSearchCard-primary-heading">
                <a class="JobSearchCard-primary-title-link" href="/projects/design/banner">Banner design</a>
            </div>
            <div class="JobSearchCard-primary-price">$10 - $30 USD</div>
            <div class="JobSearchCard-secondary-entry">64 bids</div>
        </div>
    </div>
</body></html>"#;

pub const PROJECT_PAGE: &str = r#"<html><body>
    <h1 class="PageProjectDetails-title">WebSocket gateway in Rust</h1>
    <div class="PageProjectDetails-description">Need a tokio based gateway with auth and metrics.</div>
    <form id="bid-form">
        <div class="BidFormat-description">
            <textarea name="description">Hello, I am interested.</textarea>
        </div>
        <button type="submit">Place Bid</button>
    </form>
</body></html>"#;

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        },
        watcher: WatcherConfig {
            settle_delay_ms: 0,
            poll_interval_secs: 1,
            user_agent: "BiddingAgent-Test/1.0".to_string(),
        },
        proposal: ProposalConfig {
            api_base_url: "http://127.0.0.1:1".to_string(),
            model: "gemini-1.5-flash".to_string(),
            search_interval_ms: 10,
            search_timeout_secs: 0,
        },
        browser: BrowserConfig {
            chrome_path: None,
            headless: true,
        },
    }
}

/// In-memory settings store with the schema in place
pub async fn create_test_store() -> anyhow::Result<ConfigStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = ConfigStore::from_pool(pool);
    store.migrate().await?;
    Ok(store)
}

pub async fn create_test_app_state() -> anyhow::Result<AppState> {
    Ok(AppState {
        store: create_test_store().await?,
        config: get_test_config(),
        agent_events: None,
    })
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    app: axum::Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: Option<String>,
) -> anyhow::Result<axum::response::Response> {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }

    let request = request.body(Body::from(body.unwrap_or_default()))?;
    Ok(app.oneshot(request).await?)
}

pub async fn body_text(response: axum::response::Response) -> anyhow::Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Tab launcher that remembers what it was asked to open.
#[derive(Default, Clone)]
pub struct RecordingLauncher {
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl RecordingLauncher {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().map(|urls| urls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TabLauncher for RecordingLauncher {
    async fn open_background(&self, url: &str) -> bidding_agent::Result<u64> {
        let mut opened = self
            .opened
            .lock()
            .map_err(|e| bidding_agent::AppError::Internal(e.to_string()))?;
        opened.push(url.to_string());
        Ok(opened.len() as u64)
    }
}

/// Helper to wait for async operations
pub async fn wait_for_condition<F>(mut condition: F, timeout_seconds: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_seconds);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    false
}
