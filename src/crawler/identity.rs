//! User-agent rotation

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fallback identity when no user agents are configured
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Hands out user-agent strings round-robin across all workers
#[derive(Debug)]
pub struct IdentityRotator {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl IdentityRotator {
    pub fn new(agents: Vec<String>) -> Self {
        let agents: Vec<String> = agents
            .into_iter()
            .map(|agent| agent.trim().to_string())
            .filter(|agent| !agent.is_empty())
            .collect();

        let agents = if agents.is_empty() {
            vec![DEFAULT_USER_AGENT.to_string()]
        } else {
            agents
        };

        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_identity(&self) -> &str {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        &self.agents[index]
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
