use askama::Template;
use axum::{
    extract::{rejection::JsonRejection, Form, State},
    response::{Html, Json},
};
use serde::Deserialize;

use super::{ApiResponse, AppState, HealthCheck, HealthResponse, WebError};
use crate::agent::PageEvent;
use crate::models::{WatchConfig, DEFAULT_MAX_BIDS};

pub const SAVED_MESSAGE: &str = "Configuration saved!";

#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    pub config: WatchConfig,
    pub status_message: Option<String>,
}

/// Raw form submission. Checkboxes are absent when unchecked.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsForm {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub profile_text: String,
    #[serde(default)]
    pub min_budget: String,
    #[serde(default)]
    pub max_bids: String,
    pub auto_open_enabled: Option<String>,
    pub watching_enabled: Option<String>,
}

impl SettingsForm {
    pub fn into_config(self) -> WatchConfig {
        WatchConfig {
            min_budget: parse_number(&self.min_budget).unwrap_or(0),
            max_bids: parse_number(&self.max_bids).unwrap_or(DEFAULT_MAX_BIDS),
            api_key: self.api_key.trim().to_string(),
            profile_text: self.profile_text,
            auto_open_enabled: is_checked(self.auto_open_enabled.as_deref()),
            watching_enabled: is_checked(self.watching_enabled.as_deref()),
        }
    }
}

/// Leading integer of the field, so "250 USD" reads as 250.
fn parse_number(raw: &str) -> Option<u64> {
    let digits: String = raw.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn is_checked(value: Option<&str>) -> bool {
    match value {
        Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "off" | "0"),
        None => false,
    }
}

fn render(config: WatchConfig, status_message: Option<String>) -> Result<Html<String>, WebError> {
    let page = SettingsTemplate {
        config,
        status_message,
    };
    Ok(Html(page.render()?))
}

async fn persist(state: &AppState, config: &WatchConfig) -> Result<(), WebError> {
    state.store.save(config).await?;
    tracing::info!(
        min_budget = config.min_budget,
        max_bids = config.max_bids,
        auto_open = config.auto_open_enabled,
        watching = config.watching_enabled,
        "Settings saved"
    );

    if let Some(agent) = &state.agent_events {
        if agent.send(PageEvent::ReloadConfig).is_err() {
            tracing::warn!("Agent is no longer running; settings apply on next start");
        }
    }
    Ok(())
}

pub async fn settings_page(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    let config = state.store.load().await?;
    render(config, None)
}

pub async fn save_settings(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> Result<Html<String>, WebError> {
    let config = form.into_config();
    persist(&state, &config).await?;
    render(config, Some(SAVED_MESSAGE.to_string()))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<Json<ApiResponse<WatchConfig>>, WebError> {
    let config = state.store.load().await?;
    Ok(Json(ApiResponse::success(config)))
}

pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<WatchConfig>, JsonRejection>,
) -> Result<Json<ApiResponse<WatchConfig>>, WebError> {
    let Json(config) = payload.map_err(|rejection| WebError::bad_request(rejection.body_text()))?;
    persist(&state, &config).await?;
    Ok(Json(ApiResponse::success(config)))
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(state.store.pool()).await {
        Ok(_) => HealthCheck {
            name: "database".to_string(),
            status: "healthy".to_string(),
            message: None,
        },
        Err(e) => HealthCheck {
            name: "database".to_string(),
            status: "unhealthy".to_string(),
            message: Some(e.to_string()),
        },
    };
    Json(HealthResponse::from_checks(vec![database]))
}
