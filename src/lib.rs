//! guardrail: risk-controlled execution and position lifecycle engine
//!
//! This library provides the core components for:
//! - Market data ingestion with streaming or polling per exchange capability
//! - Pre-trade risk admission, position sizing and loss-streak cooldown
//! - Order execution with stop loss, staged take profit and trailing stops
//! - A fixed-interval trading bot wiring signals through risk into execution
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod exchange;
pub mod execution;
pub mod feed;
pub mod orchestrator;
pub mod risk;
pub mod signal;
pub mod telemetry;
