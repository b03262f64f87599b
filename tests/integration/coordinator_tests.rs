//! Full pipeline runs through the coordinator

use crate::common::{seed, wait_for};
use driftnet::config::{Config, CrawlerConfig, HealthConfig, OutputConfig, QueueConfig};
use driftnet::queue::{CrawlRequest, JobPayload};
use driftnet::{Coordinator, JobQueue, Lane};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(sources: Vec<driftnet::config::SourceSeed>, content_path: &Path) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrent_scrapes: 2,
            request_delay: 0,
            poll_interval: 10,
            navigation_timeout: 2000,
            ..CrawlerConfig::default()
        },
        health: HealthConfig {
            enabled: false,
            ..HealthConfig::default()
        },
        output: OutputConfig {
            content_path: Some(content_path.display().to_string()),
        },
        sources,
        ..Config::default()
    }
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_source_content_reaches_the_sink() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "<html><head><title>t</title><script>var x = 1;</script></head>\
                     <body><p>Hello driftnet</p></body></html>",
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .with_priority(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let content_path = dir.path().join("content.jsonl");
    let config = test_config(
        vec![
            seed("news", "text", &format!("{}/article", server.uri())),
            seed("gone", "text", &format!("{}/gone", server.uri())),
        ],
        &content_path,
    );

    let coordinator = Coordinator::new(config, false).unwrap();
    let registry = coordinator.registry().clone();
    let queue = coordinator.queue().clone();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(coordinator.run_until(async {
        let _ = stop_rx.await;
    }));

    let delivered = wait_for(Duration::from_secs(5), || async {
        queue.counts(Lane::Processing).unwrap().completed == 1
    })
    .await;
    assert!(delivered);

    let _ = stop_tx.send(());
    run.await.unwrap().unwrap();

    // The dead source was swept inactive before the first schedule
    assert!(!registry.get("gone").unwrap().active);
    assert_eq!(queue.counts(Lane::Crawl).unwrap().completed, 1);

    let lines = read_lines(&content_path);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["source_id"], "news");
    assert_eq!(lines[0]["content_type"], "text");
    assert_eq!(lines[0]["payload"]["type"], "text");
    let text = lines[0]["payload"]["data"].as_str().unwrap();
    assert!(text.contains("Hello driftnet"));
    assert!(!text.contains("var x"));
}

#[tokio::test]
async fn test_fresh_start_discards_queued_jobs() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("queue.db");

    {
        let queue = JobQueue::open(&db_path).unwrap();
        queue
            .enqueue_default(
                Lane::Crawl,
                JobPayload::Crawl(CrawlRequest {
                    source_id: "old".into(),
                    content_type: "text".into(),
                    url: "https://old.example.com/".into(),
                }),
            )
            .unwrap();
    }

    let mut config = test_config(vec![], &dir.path().join("content.jsonl"));
    config.queue = QueueConfig {
        database_path: Some(db_path.display().to_string()),
        ..QueueConfig::default()
    };

    let kept = Coordinator::new(config.clone(), false).unwrap();
    assert_eq!(kept.queue().counts(Lane::Crawl).unwrap().waiting, 1);
    drop(kept);

    let fresh = Coordinator::new(config, true).unwrap();
    assert_eq!(fresh.queue().counts(Lane::Crawl).unwrap().total(), 0);
}
