// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the controller bootstrap.
//!
//! These tests run the real bootstrap against a recording manager and a
//! scripted federated client builder, so no Kubernetes cluster is needed.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_all_optional_capabilities_off
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: end-to-end bootstrap runs for representative option sets
//! - **Failure tests**: each fatal error class and what reaches the manager before it

mod failure_tests;
mod mock_manager;
mod scenario_tests;

pub use mock_manager::*;
