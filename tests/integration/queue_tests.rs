//! Job queue behaviour over the SQLite store

use chrono::{Duration as ChronoDuration, Utc};
use driftnet::queue::{CrawlRequest, JobPayload};
use driftnet::{EnqueueOptions, FailOutcome, JobQueue, JobState, Lane};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn crawl(source_id: &str) -> JobPayload {
    JobPayload::Crawl(CrawlRequest {
        source_id: source_id.to_string(),
        content_type: "text".to_string(),
        url: format!("https://{}.example.com/", source_id),
    })
}

#[test]
fn test_retry_schedule_ends_in_failure() {
    let dir = TempDir::new().unwrap();
    let queue = JobQueue::open(&dir.path().join("queue.db")).unwrap();
    let options = EnqueueOptions {
        max_attempts: 3,
        initial_backoff_ms: 5000,
    };

    let start = Utc::now();
    let handle = queue
        .enqueue_at(Lane::Crawl, crawl("s1"), options, start)
        .unwrap();

    let mut now = start;
    let mut dequeues = 0;
    let mut delays = Vec::new();
    loop {
        // Nothing becomes eligible before its backoff has passed
        assert!(queue
            .dequeue_at(Lane::Crawl, now - ChronoDuration::milliseconds(1))
            .unwrap()
            .is_none());

        let job = queue.dequeue_at(Lane::Crawl, now).unwrap().unwrap();
        assert_eq!(job.id, handle.id);
        dequeues += 1;

        match queue.fail_at(job.id, "navigation timed out", now).unwrap() {
            FailOutcome::Retrying {
                delay,
                available_at,
                ..
            } => {
                delays.push(delay.as_secs());
                now = available_at;
            }
            FailOutcome::Exhausted { attempt, error } => {
                assert_eq!(attempt, 3);
                assert_eq!(error, "navigation timed out");
                break;
            }
        }
    }

    assert_eq!(dequeues, 3);
    assert_eq!(delays, vec![10, 20]);

    let job = queue.get(handle.id).unwrap().unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempt, 3);
    assert!(queue
        .dequeue_at(Lane::Crawl, now + ChronoDuration::days(1))
        .unwrap()
        .is_none());
}

#[test]
fn test_jobs_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");

    let handle = {
        let queue = JobQueue::open(&path).unwrap();
        queue.enqueue_default(Lane::Crawl, crawl("s1")).unwrap()
    };

    let queue = JobQueue::open(&path).unwrap();
    let job = queue.dequeue(Lane::Crawl).unwrap().unwrap();
    assert_eq!(job.id, handle.id);
    assert_eq!(job.payload, crawl("s1"));
}

#[test]
fn test_interrupted_job_is_reclaimed_with_its_attempts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("queue.db");
    let options = EnqueueOptions {
        max_attempts: 3,
        initial_backoff_ms: 0,
    };

    let id = {
        let queue = JobQueue::open(&path).unwrap();
        queue.enqueue(Lane::Crawl, crawl("s1"), options).unwrap();
        let job = queue.dequeue(Lane::Crawl).unwrap().unwrap();
        queue.fail(job.id, "first failure").unwrap();
        let job = queue.dequeue(Lane::Crawl).unwrap().unwrap();
        assert_eq!(job.attempt, 1);
        // Process dies with the job still active
        job.id
    };

    let queue = JobQueue::open(&path).unwrap();
    assert!(queue.dequeue(Lane::Crawl).unwrap().is_none());
    assert_eq!(queue.reclaim_active().unwrap(), 1);

    let job = queue.dequeue(Lane::Crawl).unwrap().unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.attempt, 1);
}

#[test]
fn test_lanes_are_independent() {
    let queue = JobQueue::in_memory();
    queue.enqueue_default(Lane::Crawl, crawl("s1")).unwrap();

    assert!(queue.dequeue(Lane::Processing).unwrap().is_none());
    assert_eq!(queue.counts(Lane::Crawl).unwrap().waiting, 1);
    assert_eq!(queue.counts(Lane::Processing).unwrap().total(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_claims_each_job_once() {
    let dir = TempDir::new().unwrap();
    let queue = Arc::new(JobQueue::open(&dir.path().join("queue.db")).unwrap());

    for i in 0..50 {
        queue
            .enqueue_default(Lane::Crawl, crawl(&format!("s{}", i)))
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        tasks.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = queue.dequeue(Lane::Crawl).unwrap() {
                claimed.push(job.id);
                queue.complete(job.id).unwrap();
                tokio::task::yield_now().await;
            }
            claimed
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for task in tasks {
        for id in task.await.unwrap() {
            total += 1;
            assert!(seen.insert(id), "job {} claimed twice", id);
        }
    }

    assert_eq!(total, 50);
    assert_eq!(queue.counts(Lane::Crawl).unwrap().completed, 50);
}

#[test]
fn test_prune_keeps_recent_and_unfinished_jobs() {
    let queue = JobQueue::in_memory();
    let old = Utc::now() - ChronoDuration::days(10);

    queue
        .enqueue_at(Lane::Crawl, crawl("old"), EnqueueOptions::default(), old)
        .unwrap();
    let job = queue.dequeue_at(Lane::Crawl, old).unwrap().unwrap();
    queue.complete_at(job.id, old).unwrap();

    queue.enqueue_default(Lane::Crawl, crawl("fresh")).unwrap();

    let removed = queue
        .prune_terminal(Utc::now() - ChronoDuration::days(7))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(queue.get(job.id).unwrap().is_none());
    assert_eq!(queue.counts(Lane::Crawl).unwrap().waiting, 1);
}
