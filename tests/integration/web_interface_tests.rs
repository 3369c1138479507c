use super::*;
use axum::http::{header, Method, StatusCode};
use bidding_agent::web::create_router;

const FORM: &str = "application/x-www-form-urlencoded";

#[tokio::test]
async fn test_settings_page_routes() -> anyhow::Result<()> {
    for route in ["/", "/settings"] {
        let state = create_test_app_state().await?;
        let response = make_request(create_router(state), Method::GET, route, None, None).await?;

        assert_eq!(response.status(), StatusCode::OK, "Route {} should return 200 OK", route);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.contains("text/html"), "Route {} returned {}", route, content_type);

        let html = body_text(response).await?;
        assert!(html.contains(r#"name="minBudget""#));
        assert!(html.contains(r#"value="100""#));
        assert!(!html.contains("Configuration saved!"));
    }
    Ok(())
}

#[tokio::test]
async fn test_form_submission_saves_and_confirms() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let store = state.store.clone();

    let body = "apiKey=abc123&profileText=Rust+backend+engineer&minBudget=300&maxBids=40&autoOpenEnabled=on&watchingEnabled=on";
    let response = make_request(create_router(state), Method::POST, "/settings", Some(FORM), Some(body.to_string())).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await?;
    assert!(html.contains("Configuration saved!"));

    let stored = store.load().await?;
    assert_eq!(stored.api_key, "abc123");
    assert_eq!(stored.profile_text, "Rust backend engineer");
    assert_eq!(stored.min_budget, 300);
    assert_eq!(stored.max_bids, 40);
    assert!(stored.auto_open_enabled);
    assert!(stored.watching_enabled);
    Ok(())
}

#[tokio::test]
async fn test_unchecked_boxes_and_bad_numbers() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let store = state.store.clone();

    let body = "apiKey=&profileText=&minBudget=cheap&maxBids=";
    let response = make_request(create_router(state), Method::POST, "/settings", Some(FORM), Some(body.to_string())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = store.load().await?;
    assert_eq!(stored.min_budget, 0);
    assert_eq!(stored.max_bids, 100);
    assert!(!stored.auto_open_enabled);
    assert!(!stored.watching_enabled);
    Ok(())
}

#[tokio::test]
async fn test_saved_values_are_shown_on_reload() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let app = create_router(state);

    let body = "apiKey=k&profileText=Data+engineer&minBudget=1200&maxBids=8&watchingEnabled=on";
    make_request(app.clone(), Method::POST, "/settings", Some(FORM), Some(body.to_string())).await?;

    let response = make_request(app, Method::GET, "/settings", None, None).await?;
    let html = body_text(response).await?;
    assert!(html.contains(r#"value="1200""#));
    assert!(html.contains("Data engineer"));
    Ok(())
}

#[tokio::test]
async fn test_security_headers_present() -> anyhow::Result<()> {
    let state = create_test_app_state().await?;
    let response = make_request(create_router(state), Method::GET, "/settings", None, None).await?;

    let headers = response.headers();
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    Ok(())
}
