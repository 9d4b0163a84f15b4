//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Exchange order round trip
    OrderSubmission,
    /// Signal source analysis
    SignalGeneration,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Orders accepted by the exchange
    OrdersSubmitted,
    /// Orders refused by the exchange or the engine guard
    OrdersFailed,
    /// Trades refused by admission control
    TradesRejected,
    /// Full or partial position exits
    PositionsClosed,
    /// Market data fetch/watch failures
    FeedErrors,
    /// Observer callback failures
    ObserverErrors,
    /// Decision loop iterations that failed
    IterationErrors,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current capital
    Capital,
    /// Realized P&L today
    DailyPnl,
    /// Realized P&L since start
    TotalPnl,
    /// Open position count
    OpenPositions,
    /// Total notional exposure
    TotalExposure,
    /// Losing closes in a row
    ConsecutiveLosses,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::OrderSubmission => "guardrail_order_submission_latency_ms",
        LatencyMetric::SignalGeneration => "guardrail_signal_generation_latency_ms",
    };

    ::metrics::histogram!(metric_name).record(duration.as_secs_f64() * 1_000.0);
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    let metric_name = match metric {
        CounterMetric::OrdersSubmitted => "guardrail_orders_submitted_total",
        CounterMetric::OrdersFailed => "guardrail_orders_failed_total",
        CounterMetric::TradesRejected => "guardrail_trades_rejected_total",
        CounterMetric::PositionsClosed => "guardrail_positions_closed_total",
        CounterMetric::FeedErrors => "guardrail_feed_errors_total",
        CounterMetric::ObserverErrors => "guardrail_observer_errors_total",
        CounterMetric::IterationErrors => "guardrail_iteration_errors_total",
    };

    ::metrics::counter!(metric_name).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let metric_name = match metric {
        GaugeMetric::Capital => "guardrail_capital",
        GaugeMetric::DailyPnl => "guardrail_daily_pnl",
        GaugeMetric::TotalPnl => "guardrail_total_pnl",
        GaugeMetric::OpenPositions => "guardrail_open_positions",
        GaugeMetric::TotalExposure => "guardrail_total_exposure",
        GaugeMetric::ConsecutiveLosses => "guardrail_consecutive_losses",
    };

    ::metrics::gauge!(metric_name).set(value);
}
