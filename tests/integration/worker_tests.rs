//! Crawl worker loop end-to-end runs

use crate::common::{seed, wait_for, FakeEngine, PageBehavior, TableProbe};
use driftnet::browser::{HttpBrowserEngine, Viewport};
use driftnet::crawler::{CrawlScheduler, ExtractedPayload, WorkerSettings};
use driftnet::health::HealthState;
use driftnet::queue::{CrawlRequest, JobPayload};
use driftnet::{CrawlWorkerLoop, EnqueueOptions, JobQueue, JobState, Lane, SourceRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn settings(concurrency: usize) -> WorkerSettings {
    WorkerSettings {
        concurrency,
        request_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        navigation_timeout: Duration::from_secs(2),
        schedule_interval: Duration::from_secs(3600),
        viewport: Viewport::default(),
        user_agents: vec!["agent-a".into(), "agent-b".into(), "agent-c".into()],
        dedupe_in_flight: true,
    }
}

fn fast_queue() -> Arc<JobQueue> {
    Arc::new(JobQueue::in_memory().with_defaults(EnqueueOptions {
        max_attempts: 3,
        initial_backoff_ms: 10,
    }))
}

fn registry_with(seeds: &[driftnet::config::SourceSeed]) -> Arc<SourceRegistry> {
    let registry = SourceRegistry::with_probe(Arc::new(TableProbe::new()));
    registry.load(seeds).unwrap();
    Arc::new(registry)
}

async fn crawl_failed(queue: &JobQueue, count: u64) -> bool {
    queue.counts(Lane::Crawl).unwrap().failed == count
}

async fn crawl_completed(queue: &JobQueue, count: u64) -> bool {
    queue.counts(Lane::Crawl).unwrap().completed == count
}

#[tokio::test]
async fn test_failing_navigation_uses_every_attempt() {
    let (engine, log) = FakeEngine::new(PageBehavior::Status(503));
    let queue = fast_queue();
    let registry = registry_with(&[seed("s1", "text", "https://s1.example.com/")]);

    let mut workers = CrawlWorkerLoop::new(settings(2), registry, Arc::clone(&queue), engine);
    workers.start().await.unwrap();

    assert!(wait_for(WAIT, || crawl_failed(&queue, 1)).await);
    workers.stop().await.unwrap();

    assert_eq!(log.navigations(), 3);
    let counts = queue.counts(Lane::Crawl).unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.unfinished(), 0);
    assert_eq!(queue.counts(Lane::Processing).unwrap().total(), 0);
}

#[tokio::test]
async fn test_image_page_yields_one_job_per_image() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    r#"<html><body>
                    <img src="/img/one.jpg" alt="first">
                    <img src="https://cdn.example.com/two.png" width="640" height="480">
                    </body></html>"#,
                )
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let queue = fast_queue();
    let gallery = format!("{}/gallery", server.uri());
    let registry = registry_with(&[seed("g", "image", &gallery)]);

    let mut workers = CrawlWorkerLoop::new(
        settings(1),
        registry,
        Arc::clone(&queue),
        Arc::new(HttpBrowserEngine::new()),
    );
    workers.start().await.unwrap();
    assert!(wait_for(WAIT, || crawl_completed(&queue, 1)).await);
    workers.stop().await.unwrap();

    assert_eq!(queue.counts(Lane::Processing).unwrap().waiting, 2);

    let mut sources = Vec::new();
    while let Some(job) = queue.dequeue(Lane::Processing).unwrap() {
        let JobPayload::Processing(content) = job.payload else {
            panic!("crawl payload on the processing lane");
        };
        assert_eq!(content.source_id, "g");
        assert_eq!(content.url.as_str(), gallery);
        match content.payload {
            ExtractedPayload::Images(images) => {
                assert_eq!(images.len(), 1);
                sources.push(images[0].src.clone());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
    sources.sort();
    assert_eq!(
        sources,
        vec![
            format!("{}/img/one.jpg", server.uri()),
            "https://cdn.example.com/two.png".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_empty_media_completes_without_processing_jobs() {
    let (engine, _log) = FakeEngine::new(PageBehavior::Value(json!([])));
    let queue = fast_queue();
    let registry = registry_with(&[seed("v", "video", "https://v.example.com/")]);

    let mut workers = CrawlWorkerLoop::new(settings(1), registry, Arc::clone(&queue), engine);
    workers.start().await.unwrap();
    assert!(wait_for(WAIT, || crawl_completed(&queue, 1)).await);
    workers.stop().await.unwrap();

    assert_eq!(queue.counts(Lane::Processing).unwrap().total(), 0);
}

#[tokio::test]
async fn test_unknown_content_type_fails_without_navigating() {
    let (engine, log) = FakeEngine::new(PageBehavior::Value(json!("text")));
    let queue = fast_queue();
    let handle = queue
        .enqueue_default(
            Lane::Crawl,
            JobPayload::Crawl(CrawlRequest {
                source_id: "x".into(),
                content_type: "audio".into(),
                url: "https://x.example.com/".into(),
            }),
        )
        .unwrap();

    let mut workers = CrawlWorkerLoop::new(settings(1), registry_with(&[]), Arc::clone(&queue), engine);
    workers.start().await.unwrap();
    assert!(wait_for(WAIT, || crawl_failed(&queue, 1)).await);
    workers.stop().await.unwrap();

    assert_eq!(log.navigations(), 0);
    let job = queue.get(handle.id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 3);
    assert!(job.last_error.unwrap().contains("audio"));
}

#[tokio::test]
async fn test_queued_jobs_for_dropped_sources_are_not_crawled() {
    let (engine, log) = FakeEngine::new(PageBehavior::Status(503));
    let queue = fast_queue();
    // The probe knows neither URL, so a sweep marks every remaining source dead
    let registry = registry_with(&[
        seed("removed", "text", "https://removed.example.com/"),
        seed("dead", "image", "https://dead.example.com/"),
    ]);

    let scheduled = CrawlScheduler::new(
        Arc::clone(&registry),
        Arc::clone(&queue),
        Duration::from_secs(3600),
    )
    .tick()
    .await
    .unwrap();
    assert_eq!(scheduled.enqueued, 2);

    registry.remove_source("removed").unwrap();
    registry.validate_sweep().await;
    assert!(registry.active_sources().is_empty());

    let mut workers = CrawlWorkerLoop::new(settings(2), registry, Arc::clone(&queue), engine);
    workers.start().await.unwrap();
    assert!(wait_for(WAIT, || crawl_completed(&queue, 2)).await);
    workers.stop().await.unwrap();

    assert_eq!(log.navigations(), 0);
    let counts = queue.counts(Lane::Crawl).unwrap();
    assert_eq!(counts.failed, 0);
    assert_eq!(counts.unfinished(), 0);
    assert_eq!(queue.counts(Lane::Processing).unwrap().total(), 0);
}

#[tokio::test]
async fn test_identities_rotate_across_navigations() {
    let (engine, log) = FakeEngine::new(PageBehavior::Value(json!("page text")));
    let queue = fast_queue();
    let registry = registry_with(&[
        seed("a", "text", "https://a.example.com/"),
        seed("b", "text", "https://b.example.com/"),
        seed("c", "text", "https://c.example.com/"),
    ]);

    let mut workers = CrawlWorkerLoop::new(settings(1), registry, Arc::clone(&queue), engine);
    workers.start().await.unwrap();
    assert!(wait_for(WAIT, || crawl_completed(&queue, 3)).await);
    workers.stop().await.unwrap();

    assert_eq!(log.user_agents(), vec!["agent-a", "agent-b", "agent-c"]);
    assert_eq!(queue.counts(Lane::Processing).unwrap().waiting, 3);
}

#[tokio::test]
async fn test_stop_lets_in_flight_job_finish() {
    let (engine, log) = FakeEngine::new(PageBehavior::Slow(
        Duration::from_millis(300),
        json!("slow page"),
    ));
    let queue = fast_queue();
    let registry = registry_with(&[seed("slow", "text", "https://slow.example.com/")]);
    let health = Arc::new(HealthState::new());

    let mut workers = CrawlWorkerLoop::new(settings(3), registry, Arc::clone(&queue), engine)
        .with_health(Arc::clone(&health));
    workers.start().await.unwrap();
    assert!(workers.is_running());
    assert_eq!(health.live_workers(), 3);

    assert!(wait_for(WAIT, || async { log.navigations() == 1 }).await);
    workers.stop().await.unwrap();

    assert!(!workers.is_running());
    assert_eq!(health.live_workers(), 0);

    let counts = queue.counts(Lane::Crawl).unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.active, 0);
    assert_eq!(queue.counts(Lane::Processing).unwrap().waiting, 1);

    assert_eq!(log.open_contexts(), 0);
    assert!(log.session_closed.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_before_start_is_a_no_op() {
    let (engine, log) = FakeEngine::new(PageBehavior::Value(json!("x")));
    let mut workers = CrawlWorkerLoop::new(settings(1), registry_with(&[]), fast_queue(), engine);

    workers.stop().await.unwrap();
    assert_eq!(log.launches.load(std::sync::atomic::Ordering::SeqCst), 0);
}
