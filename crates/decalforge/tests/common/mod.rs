//! Shared test utilities for decalforge integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temp directories and a SQLite store
//! - `TestServer`, a minimal HTTP/1.1 server for provider and fetch tests
//! - Fake stage implementations that count their calls

pub mod fakes;
pub mod harness;
pub mod http;

pub use fakes::*;
pub use harness::TestHarness;
pub use http::{Route, TestServer};
