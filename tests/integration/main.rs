//! Integration tests for Driftnet
//!
//! Fake probes and browser engines stand in for the network where a test
//! needs exact control; wiremock serves real HTTP everywhere else.

mod common;
mod coordinator_tests;
mod queue_tests;
mod registry_tests;
mod worker_tests;
