use super::*;
use bidding_agent::{
    agent::{Agent, PageEvent},
    observer::PageObserver,
    page::Page,
    proposal::{ActivationOutcome, GeminiClient, InjectorState, MISSING_KEY_ALERT, PLACEHOLDER_TEXT},
    WatchConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proposal_agent(server_uri: &str, config: WatchConfig) -> Agent {
    let mut app = get_test_config();
    app.proposal.api_base_url = server_uri.to_string();

    Agent::new(
        Page::parse(PROJECT_PAGE, Some(PROJECT_URL)),
        config,
        PageObserver::new(None),
        Arc::new(GeminiClient::new(&app.proposal)),
        &app.watcher,
        &app.proposal,
    )
}

fn configured() -> WatchConfig {
    WatchConfig {
        api_key: "test-key".to_string(),
        profile_text: "Ten years of distributed systems in Rust".to_string(),
        ..WatchConfig::default()
    }
}

fn ready_input(agent: &Agent) -> bidding_agent::page::NodeId {
    match agent.injector_state() {
        Some(InjectorState::Ready { input, .. }) => input,
        other => panic!("bid area not ready: {other:?}"),
    }
}

#[tokio::test]
async fn test_generated_proposal_fills_bid_area() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I have shipped three gateways like this."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut agent = proposal_agent(&server.uri(), configured());
    agent.start(std::time::Instant::now())?;
    let input = ready_input(&agent);

    agent.handle(PageEvent::ControlActivated).await?;

    assert_eq!(agent.page().value(input), "I have shipped three gateways like this.");
    assert_eq!(agent.page().input_events(), &[input]);
    assert_eq!(agent.stats().activations, vec![ActivationOutcome::Generated]);

    let requests = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
    assert!(prompt.contains("Ten years of distributed systems in Rust"));
    assert!(prompt.contains("Title: WebSocket gateway in Rust"));
    assert!(prompt.contains("Description: Need a tokio based gateway with auth and metrics."));
    Ok(())
}

#[tokio::test]
async fn test_api_error_restores_draft_and_alerts() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "API key not valid."}
        })))
        .mount(&server)
        .await;

    let mut agent = proposal_agent(&server.uri(), configured());
    agent.start(std::time::Instant::now())?;
    let input = ready_input(&agent);

    agent.handle(PageEvent::ControlActivated).await?;

    assert_eq!(agent.page().value(input), "Hello, I am interested.");
    assert_ne!(agent.page().value(input), PLACEHOLDER_TEXT);
    let alerts = agent.page().alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("Error generating proposal:"));
    assert!(alerts[0].contains("API key not valid."));
    Ok(())
}

#[tokio::test]
async fn test_malformed_success_body_restores_draft() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let mut agent = proposal_agent(&server.uri(), configured());
    agent.start(std::time::Instant::now())?;
    let input = ready_input(&agent);

    agent.handle(PageEvent::ControlActivated).await?;

    assert_eq!(agent.page().value(input), "Hello, I am interested.");
    assert!(agent.page().input_events().is_empty());
    assert!(matches!(agent.stats().activations[0], ActivationOutcome::Failed(_)));
    Ok(())
}

#[tokio::test]
async fn test_missing_key_makes_no_request() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut agent = proposal_agent(&server.uri(), WatchConfig::default());
    agent.start(std::time::Instant::now())?;

    agent.handle(PageEvent::ControlActivated).await?;

    assert_eq!(agent.page().alerts(), &[MISSING_KEY_ALERT.to_string()]);
    assert_eq!(agent.stats().activations, vec![ActivationOutcome::MissingApiKey]);
    Ok(())
}

#[tokio::test]
async fn test_bid_area_appearing_later_gets_trigger() -> anyhow::Result<()> {
    let mut app = get_test_config();
    app.proposal.search_timeout_secs = 60;
    let mut agent = Agent::new(
        Page::parse("<html><body><h1>Later</h1></body></html>", Some(PROJECT_URL)),
        configured(),
        PageObserver::new(None),
        Arc::new(GeminiClient::new(&app.proposal)),
        &app.watcher,
        &app.proposal,
    );
    agent.start(std::time::Instant::now())?;
    assert_eq!(agent.injector_state(), Some(InjectorState::Searching));

    agent
        .handle(PageEvent::Inserted {
            html: r#"<div class="form-group"><textarea id="description"></textarea></div>"#.to_string(),
        })
        .await?;
    agent.handle(PageEvent::Tick).await?;

    assert!(matches!(agent.injector_state(), Some(InjectorState::Ready { .. })));
    Ok(())
}

#[tokio::test]
async fn test_search_page_gets_no_trigger() -> anyhow::Result<()> {
    let app = get_test_config();
    let mut agent = Agent::new(
        Page::parse(PROJECT_PAGE, Some(SEARCH_URL)),
        configured(),
        PageObserver::new(None),
        Arc::new(GeminiClient::new(&app.proposal)),
        &app.watcher,
        &app.proposal,
    );
    agent.start(std::time::Instant::now())?;

    assert_eq!(agent.injector_state(), None);
    Ok(())
}
