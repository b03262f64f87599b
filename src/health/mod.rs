//! Liveness of the long-running tasks
//!
//! Each task holds an [`AliveGuard`] for as long as its loop runs. The guard
//! flips the task's flag back when dropped, so a task that returns or panics
//! shows up as dead without any cooperation from it.

mod server;

pub use server::{router, serve, AppState};

use axum::http::StatusCode;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Scheduler,
    Validator,
    /// One unit of the crawl worker pool
    Worker,
    Consumer,
}

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded | HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Shared liveness flags
#[derive(Debug)]
pub struct HealthState {
    scheduler: AtomicBool,
    validator: AtomicBool,
    consumer: AtomicBool,
    live_workers: AtomicUsize,
    expected_workers: AtomicUsize,
    started_at: Instant,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            scheduler: AtomicBool::new(false),
            validator: AtomicBool::new(false),
            consumer: AtomicBool::new(false),
            live_workers: AtomicUsize::new(0),
            expected_workers: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// Sets the pool size the worker count is compared against
    pub fn set_expected_workers(&self, count: usize) {
        self.expected_workers.store(count, Ordering::SeqCst);
    }

    /// Marks `component` alive until the returned guard drops
    pub fn guard(self: &Arc<Self>, component: Component) -> AliveGuard {
        self.set(component, true);
        AliveGuard {
            state: Arc::clone(self),
            component,
        }
    }

    fn set(&self, component: Component, alive: bool) {
        match component {
            Component::Scheduler => self.scheduler.store(alive, Ordering::SeqCst),
            Component::Validator => self.validator.store(alive, Ordering::SeqCst),
            Component::Consumer => self.consumer.store(alive, Ordering::SeqCst),
            Component::Worker => {
                if alive {
                    self.live_workers.fetch_add(1, Ordering::SeqCst);
                } else {
                    let _ = self.live_workers.fetch_update(
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                        |n| Some(n.saturating_sub(1)),
                    );
                }
            }
        }
    }

    pub fn is_alive(&self, component: Component) -> bool {
        match component {
            Component::Scheduler => self.scheduler.load(Ordering::SeqCst),
            Component::Validator => self.validator.load(Ordering::SeqCst),
            Component::Consumer => self.consumer.load(Ordering::SeqCst),
            Component::Worker => self.live_workers() > 0,
        }
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let scheduler = self.is_alive(Component::Scheduler);
        let validator = self.is_alive(Component::Validator);
        let consumer = self.is_alive(Component::Consumer);
        let live = self.live_workers();
        let expected = self.expected_workers.load(Ordering::SeqCst);

        let all_alive = scheduler && validator && consumer && expected > 0 && live >= expected;
        let any_alive = scheduler || validator || consumer || live > 0;

        let status = if all_alive {
            HealthStatus::Healthy
        } else if any_alive {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthSnapshot {
            status,
            uptime_secs: self.started_at.elapsed().as_secs(),
            scheduler,
            validator,
            consumer,
            workers: WorkerHealth { live, expected },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerHealth {
    pub live: usize,
    pub expected: usize,
}

/// Point-in-time view of every component
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub scheduler: bool,
    pub validator: bool,
    pub consumer: bool,
    pub workers: WorkerHealth,
}

/// Keeps a component marked alive while held
#[derive(Debug)]
pub struct AliveGuard {
    state: Arc<HealthState>,
    component: Component,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.state.set(self.component, false);
    }
}
