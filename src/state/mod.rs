//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobState`: Tracks the lifecycle of a queued job (waiting, active, completed, failed)
//! - `Lane`: Identifies which backlog a job belongs to (crawl or processing)

mod job_state;
mod lane;

// Re-export main types
pub use job_state::JobState;
pub use lane::Lane;
