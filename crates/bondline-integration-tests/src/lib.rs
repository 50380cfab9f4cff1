//! Integration test crate for the Bondline accounting engine.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the engine across the legacy/cumulative boundary and through
//! snapshot claims, using several workspace crates together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p bondline-integration-tests
//! ```
