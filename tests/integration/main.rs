//! Integration tests for guardrail

mod config_test;
mod feed_test;
mod lifecycle_test;
