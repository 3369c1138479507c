use super::*;
use bidding_agent::{
    agent::{event_channel, Agent, PageEvent},
    observer::{PageObserver, PROCESSED_ATTR},
    page::{Page, SelectorChain},
    proposal::GeminiClient,
    relay::{self, TabOpener},
    WatchConfig,
};

fn watch_config() -> WatchConfig {
    WatchConfig {
        min_budget: 500,
        max_bids: 20,
        auto_open_enabled: true,
        ..WatchConfig::default()
    }
}

fn agent_with_relay(launcher: RecordingLauncher, config: WatchConfig) -> Agent {
    let (handle, service) = relay::channel();
    tokio::spawn(service.run(Arc::new(launcher)));

    let app = get_test_config();
    Agent::new(
        Page::parse(SEARCH_PAGE, Some(SEARCH_URL)),
        config,
        PageObserver::new(Some(TabOpener::new(handle))),
        Arc::new(GeminiClient::new(&app.proposal)),
        &app.watcher,
        &app.proposal,
    )
}

#[tokio::test]
async fn test_matching_listing_opens_in_background_tab() -> anyhow::Result<()> {
    let launcher = RecordingLauncher::default();
    let mut agent = agent_with_relay(launcher.clone(), watch_config());

    let (events, queue) = event_channel();
    events.send(PageEvent::Inserted {
        html: r#"<div class="ProjectCard">
            <h3>Async job queue</h3>
            <span class="project-budget">$2,000</span>
            <span class="bid-count">3 bids</span>
            <a href="/projects/rust/async-job-queue">details</a>
        </div>"#
            .to_string(),
    })?;
    events.send(PageEvent::Shutdown)?;

    agent.run(queue).await?;

    let titles: Vec<_> = agent.stats().matches.iter().map(|m| m.title.clone()).collect();
    assert_eq!(titles, vec!["WebSocket gateway in Rust", "Async job queue"]);
    assert_eq!(agent.stats().cards_processed, 3);
    assert_eq!(agent.stats().open_requests, 2);

    assert!(
        wait_for_condition(|| launcher.opened().len() == 2, 5).await,
        "relay never opened both tabs"
    );
    assert_eq!(
        launcher.opened(),
        vec![
            "https://www.freelancer.com/projects/rust/websocket-gateway".to_string(),
            "https://www.freelancer.com/projects/rust/async-job-queue".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_highlight_applied_only_to_matches() -> anyhow::Result<()> {
    let mut agent = agent_with_relay(
        RecordingLauncher::default(),
        WatchConfig {
            auto_open_enabled: false,
            ..watch_config()
        },
    );
    agent.start(std::time::Instant::now())?;

    let page = agent.page();
    let cards = page.select_all(&SelectorChain::new(&[".JobSearchCard-primary"]));
    assert_eq!(cards.len(), 2);

    assert_eq!(page.style(cards[0], "border"), Some("3px solid #0d6efd"));
    assert_eq!(page.style(cards[1], "border"), None);
    assert!(cards.iter().all(|card| page.has_attr(*card, PROCESSED_ATTR)));
    assert_eq!(agent.stats().open_requests, 0);
    Ok(())
}

#[tokio::test]
async fn test_reinserted_card_is_not_evaluated_twice() -> anyhow::Result<()> {
    let launcher = RecordingLauncher::default();
    let mut agent = agent_with_relay(launcher.clone(), watch_config());
    agent.start(std::time::Instant::now())?;

    let card = agent
        .page()
        .select_first(&SelectorChain::new(&[".JobSearchCard-primary"]))
        .expect("card present");

    agent.handle(PageEvent::Reinserted { node: card }).await?;
    agent.handle(PageEvent::Reinserted { node: card }).await?;

    assert_eq!(agent.stats().cards_processed, 2);
    assert_eq!(agent.stats().open_requests, 1);
    Ok(())
}

#[tokio::test]
async fn test_disabled_watching_leaves_page_untouched() -> anyhow::Result<()> {
    let launcher = RecordingLauncher::default();
    let mut agent = agent_with_relay(
        launcher.clone(),
        WatchConfig {
            watching_enabled: false,
            ..watch_config()
        },
    );
    agent.start(std::time::Instant::now())?;
    agent
        .handle(PageEvent::Inserted {
            html: r#"<div class="Card-primary"><span class="Card-price">$9,000</span></div>"#.to_string(),
        })
        .await?;

    assert_eq!(agent.stats().cards_processed, 0);
    let cards = agent.page().select_all(&SelectorChain::new(&[".JobSearchCard-primary, .Card-primary"]));
    assert!(cards.iter().all(|card| !agent.page().has_attr(*card, PROCESSED_ATTR)));
    assert!(launcher.opened().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reload_applies_new_thresholds() -> anyhow::Result<()> {
    let store = create_test_store().await?;
    let mut agent = agent_with_relay(
        RecordingLauncher::default(),
        WatchConfig {
            auto_open_enabled: false,
            ..watch_config()
        },
    )
    .with_store(store.clone());
    agent.start(std::time::Instant::now())?;
    assert_eq!(agent.stats().matches.len(), 1);

    store
        .save(&WatchConfig {
            min_budget: 0,
            max_bids: 1000,
            ..WatchConfig::default()
        })
        .await?;
    agent.handle(PageEvent::ReloadConfig).await?;
    agent
        .handle(PageEvent::Inserted {
            html: r#"<div class="ProjectCard"><h3>Tiny fix</h3><span class="project-budget">$15</span></div>"#.to_string(),
        })
        .await?;

    assert_eq!(agent.stats().matches.len(), 2);
    assert_eq!(agent.stats().matches[1].title, "Tiny fix");
    Ok(())
}
