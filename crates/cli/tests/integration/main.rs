//! CLI integration tests.

mod audit_tests;
mod build_tests;
mod common;
