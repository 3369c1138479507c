use super::*;
use axum::http::{Method, StatusCode};
use bidding_agent::{agent::event_channel, web::create_router, PageEvent, WatchConfig};
use serde_json::{json, Value};

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let response = make_request(create_router(state), Method::GET, "/health", None, None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"][0]["name"], "database");
    Ok(())
}

#[tokio::test]
async fn test_get_settings_returns_defaults() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let response = make_request(create_router(state), Method::GET, "/api/v1/settings", None, None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body["success"], true);
    assert_eq!(
        body["data"],
        json!({
            "minBudget": 0,
            "maxBids": 100,
            "apiKey": "",
            "profileText": "",
            "autoOpenEnabled": false,
            "watchingEnabled": true
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_put_settings_overwrites_store() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let store = state.store.clone();
    store.put_raw("professionalProfile", json!("Legacy profile")).await?;

    let response = make_request(
        create_router(state),
        Method::PUT,
        "/api/v1/settings",
        Some("application/json"),
        Some(json!({"minBudget": 500, "maxBids": 25, "apiKey": "k-1"}).to_string()),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = store.load().await?;
    assert_eq!(
        stored,
        WatchConfig {
            min_budget: 500,
            max_bids: 25,
            api_key: "k-1".to_string(),
            ..WatchConfig::default()
        }
    );
    // The legacy row went away with the wholesale overwrite
    assert_eq!(stored.profile_text, "");
    Ok(())
}

#[tokio::test]
async fn test_put_settings_rejects_wrong_types() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let store = state.store.clone();

    let response = make_request(
        create_router(state),
        Method::PUT,
        "/api/v1/settings",
        Some("application/json"),
        Some(json!({"minBudget": "a lot"}).to_string()),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(store.load().await?, WatchConfig::default());
    Ok(())
}

#[tokio::test]
async fn test_save_notifies_running_agent() -> anyhow::Result<()> {
    let (events, mut queue) = event_channel();
    let mut state = create_test_app_state().await?;
    state.agent_events = Some(events);

    let response = make_request(
        create_router(state),
        Method::PUT,
        "/api/v1/settings",
        Some("application/json"),
        Some(json!({"watchingEnabled": false}).to_string()),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(queue.recv().await, Some(PageEvent::ReloadConfig));
    Ok(())
}
