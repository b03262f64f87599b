//! Source registry behaviour against fake and real probes

use crate::common::{seed, TableProbe};
use chrono::{Duration as ChronoDuration, Utc};
use driftnet::source::{HttpProbe, SourcePatch};
use driftnet::SourceRegistry;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_sweep_activates_reachable_source() {
    let probe = Arc::new(TableProbe::new());
    probe.set("https://alive.example.com/", 200);

    let registry = SourceRegistry::with_probe(probe.clone());
    let mut never_validated = seed("s1", "text", "https://alive.example.com/");
    never_validated.active = Some(false);
    registry.load(&[never_validated]).unwrap();

    let now = Utc::now();
    let report = registry.validate_sweep_at(now).await;
    assert_eq!(report.probed, 1);
    assert_eq!(report.alive, 1);

    let source = registry.get("s1").unwrap();
    assert!(source.active);
    assert_eq!(source.last_validated, Some(now));
    assert!(source.last_error.is_none());
}

#[tokio::test]
async fn test_failed_probe_deactivates_and_keeps_timestamp() {
    let probe = Arc::new(TableProbe::new());
    probe.set("https://flaky.example.com/", 200);

    let registry = SourceRegistry::with_probe(probe.clone());
    let mut flaky = seed("s1", "image", "https://flaky.example.com/");
    flaky.validation_interval = Some(60);
    registry.load(&[flaky]).unwrap();

    let first = Utc::now();
    registry.validate_sweep_at(first).await;

    probe.set("https://flaky.example.com/", 503);
    let later = first + ChronoDuration::seconds(61);
    let report = registry.validate_sweep_at(later).await;
    assert_eq!(report.dead, 1);
    assert_eq!(report.deactivated, 1);

    let source = registry.get("s1").unwrap();
    assert!(!source.active);
    assert_eq!(source.last_validated, Some(first));
    assert!(source.last_error.unwrap().contains("503"));
    assert!(registry.active_sources().is_empty());
}

#[tokio::test]
async fn test_source_not_due_keeps_flag() {
    let probe = Arc::new(TableProbe::new());
    probe.set("https://a.example.com/", 200);

    let registry = SourceRegistry::with_probe(probe.clone());
    let mut source = seed("a", "text", "https://a.example.com/");
    source.validation_interval = Some(3600);
    registry.load(&[source]).unwrap();

    let now = Utc::now();
    registry.validate_sweep_at(now).await;
    assert_eq!(probe.calls(), 1);

    // The source goes down, but the next sweep is well inside its interval
    probe.set("https://a.example.com/", 500);
    let report = registry
        .validate_sweep_at(now + ChronoDuration::seconds(30))
        .await;
    assert_eq!(report.probed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(probe.calls(), 1);
    assert!(registry.get("a").unwrap().active);
}

#[tokio::test]
async fn test_removed_source_is_never_active() {
    let probe = Arc::new(TableProbe::new());
    probe.set("https://a.example.com/", 200);
    probe.set("https://b.example.com/", 200);

    let registry = SourceRegistry::with_probe(probe.clone());
    registry
        .load(&[
            seed("a", "text", "https://a.example.com/"),
            seed("b", "video", "https://b.example.com/"),
        ])
        .unwrap();
    registry.validate_sweep().await;
    assert_eq!(registry.active_sources().len(), 2);

    let removed = registry.remove_source("a").unwrap();
    assert_eq!(removed.id, "a");

    let active: Vec<String> = registry
        .active_sources()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(active, vec!["b".to_string()]);
    assert!(registry.remove_source("a").is_none());
}

#[tokio::test]
async fn test_add_and_update_revalidate_url() {
    let probe = Arc::new(TableProbe::new());
    probe.set("https://new.example.com/", 200);

    let registry = SourceRegistry::with_probe(probe.clone());
    assert!(registry
        .add_source(&seed("n", "image", "https://new.example.com/"))
        .await
        .unwrap());
    assert!(registry.get("n").unwrap().active);

    // The new URL is unreachable, so the patch is discarded
    let patch = SourcePatch {
        url: Some(Url::parse("https://moved.example.com/").unwrap()),
        ..Default::default()
    };
    assert!(!registry.update_source("n", &patch).await.unwrap());
    let source = registry.get("n").unwrap();
    assert_eq!(source.url.as_str(), "https://new.example.com/");
    assert!(source.active);

    probe.set("https://moved.example.com/", 200);
    assert!(registry.update_source("n", &patch).await.unwrap());
    assert_eq!(
        registry.get("n").unwrap().url.as_str(),
        "https://moved.example.com/"
    );
}

#[tokio::test]
async fn test_http_probe_sweep() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let probe = HttpProbe::new(Duration::from_secs(2), "driftnet-test/1.0").unwrap();
    let registry = SourceRegistry::with_probe(Arc::new(probe));
    registry
        .load(&[
            seed("up", "text", &format!("{}/up", server.uri())),
            seed("down", "text", &format!("{}/down", server.uri())),
        ])
        .unwrap();

    let report = registry.validate_sweep().await;
    assert_eq!(report.alive, 1);
    assert_eq!(report.dead, 1);
    assert!(registry.get("up").unwrap().active);
    assert!(!registry.get("down").unwrap().active);
}
