use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::BrowserConfig;
use crate::utils::error::{AppError, Result};

/// Opens a URL in a new background tab and returns the tab's id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TabLauncher: Send + Sync {
    async fn open_background(&self, url: &str) -> Result<u64>;
}

/// Opens tabs in a Chrome instance driven over the DevTools protocol.
pub struct ChromeTabLauncher {
    browser: Arc<Browser>,
    next_tab_id: AtomicU64,
}

impl ChromeTabLauncher {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .idle_browser_timeout(std::time::Duration::from_secs(24 * 60 * 60))
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        Ok(Self {
            browser: Arc::new(browser),
            next_tab_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl TabLauncher for ChromeTabLauncher {
    async fn open_background(&self, url: &str) -> Result<u64> {
        let browser = Arc::clone(&self.browser);
        let url = url.to_string();

        // headless_chrome blocks on DevTools round-trips
        tokio::task::spawn_blocking(move || -> Result<()> {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;
            tab.navigate_to(&url)
                .map_err(|e| AppError::Browser(format!("Navigation to {} failed: {}", url, e)))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Tab launch task failed: {}", e)))??;

        Ok(self.next_tab_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Records requests without opening anything; used with `--no-browser`.
#[derive(Default)]
pub struct LogOnlyLauncher {
    next_tab_id: AtomicU64,
}

#[async_trait]
impl TabLauncher for LogOnlyLauncher {
    async fn open_background(&self, url: &str) -> Result<u64> {
        let tab_id = self.next_tab_id.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(tab_id, "Would open tab -> {}", url);
        Ok(tab_id)
    }
}
